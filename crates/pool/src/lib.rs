// Copyright 2025 Irreducible Inc.

//! Fixed-size worker pool with tagged completion groups.
//!
//! Units of work are independent closures executed on a bounded-queue
//! worker pool. A *group* is a named set of units with a declared size and
//! a finalizer: the finalizer runs exactly once, strictly after the last
//! unit of the group has finished, and never concurrently with any unit of
//! the same group. Groups make "persist this artifact once all of its
//! parallel pieces are encoded" expressible without a global barrier —
//! unrelated groups keep making progress while one group finalizes.
//!
//! Unit failures never tear down the pool; they are captured and surfaced
//! from [`ThreadPool::wait`].

pub mod error;

pub use error::{Error, WorkError};

use std::{
	collections::{HashMap, VecDeque},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Condvar, Mutex, MutexGuard,
	},
	thread::JoinHandle,
};

use obf_utils::bail;

type Work = Box<dyn FnOnce() -> Result<(), WorkError> + Send + 'static>;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A fixed-size worker pool with tagged completion groups.
pub struct ThreadPool {
	shared: Arc<Shared>,
	workers: Vec<JoinHandle<()>>,
}

struct Shared {
	queue: Mutex<Queue>,
	not_empty: Condvar,
	not_full: Condvar,
	drained: Condvar,
	capacity: usize,
	groups: Mutex<HashMap<String, Arc<Group>>>,
	failures: Mutex<Vec<Error>>,
}

struct Queue {
	items: VecDeque<Item>,
	running: usize,
	shutdown: bool,
}

struct Item {
	group: Option<Arc<Group>>,
	work: Work,
}

struct Group {
	tag: String,
	expected: usize,
	submitted: AtomicUsize,
	completed: AtomicUsize,
	finalize: Mutex<Option<Work>>,
}

impl std::fmt::Debug for ThreadPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ThreadPool")
			.field("workers", &self.workers.len())
			.finish_non_exhaustive()
	}
}

impl ThreadPool {
	/// Spawns `num_threads` workers with the default queue capacity.
	pub fn new(num_threads: usize) -> Result<Self, Error> {
		Self::with_queue_capacity(num_threads, DEFAULT_QUEUE_CAPACITY)
	}

	/// Spawns `num_threads` workers behind a bounded queue of `capacity`
	/// pending units. `submit` blocks while the queue is full.
	pub fn with_queue_capacity(num_threads: usize, capacity: usize) -> Result<Self, Error> {
		if num_threads == 0 {
			bail!(Error::ZeroWorkers);
		}
		if capacity == 0 {
			bail!(Error::ZeroCapacity);
		}

		let shared = Arc::new(Shared {
			queue: Mutex::new(Queue {
				items: VecDeque::new(),
				running: 0,
				shutdown: false,
			}),
			not_empty: Condvar::new(),
			not_full: Condvar::new(),
			drained: Condvar::new(),
			capacity,
			groups: Mutex::new(HashMap::new()),
			failures: Mutex::new(Vec::new()),
		});

		let mut workers = Vec::with_capacity(num_threads);
		for i in 0..num_threads {
			let shared = Arc::clone(&shared);
			let worker_shared = Arc::clone(&shared);
			let spawned = std::thread::Builder::new()
				.name(format!("obf-worker-{i}"))
				.spawn(move || worker_loop(&worker_shared));
			match spawned {
				Ok(handle) => workers.push(handle),
				Err(source) => {
					let mut pool = Self { shared, workers };
					pool.release_workers();
					bail!(source);
				}
			}
		}

		Ok(Self { shared, workers })
	}

	/// Enqueues an untagged unit of work. Blocks while the queue is full.
	pub fn submit<F>(&self, work: F) -> Result<(), Error>
	where
		F: FnOnce() -> Result<(), WorkError> + Send + 'static,
	{
		self.shared.enqueue_bounded(Item {
			group: None,
			work: Box::new(work),
		})
	}

	/// Declares a group of `expected` units under `tag`.
	///
	/// `finalize` runs exactly once, on some worker, strictly after the
	/// `expected`-th unit submitted under `tag` has finished. A group of
	/// zero units finalizes immediately.
	pub fn register_group<F>(&self, tag: &str, expected: usize, finalize: F) -> Result<(), Error>
	where
		F: FnOnce() -> Result<(), WorkError> + Send + 'static,
	{
		if expected == 0 {
			return self.shared.enqueue_bounded(Item {
				group: None,
				work: Box::new(finalize),
			});
		}

		let mut groups = lock(&self.shared.groups);
		if groups.contains_key(tag) {
			bail!(Error::GroupAlreadyRegistered { tag: tag.to_string() });
		}
		groups.insert(
			tag.to_string(),
			Arc::new(Group {
				tag: tag.to_string(),
				expected,
				submitted: AtomicUsize::new(0),
				completed: AtomicUsize::new(0),
				finalize: Mutex::new(Some(Box::new(finalize))),
			}),
		);
		Ok(())
	}

	/// Enqueues a unit counted against `tag`'s completion counter.
	pub fn submit_tagged<F>(&self, tag: &str, work: F) -> Result<(), Error>
	where
		F: FnOnce() -> Result<(), WorkError> + Send + 'static,
	{
		let group = lock(&self.shared.groups)
			.get(tag)
			.cloned()
			.ok_or_else(|| Error::UnknownGroup { tag: tag.to_string() })?;

		let submitted = group.submitted.fetch_add(1, Ordering::AcqRel) + 1;
		if submitted > group.expected {
			bail!(Error::ExcessSubmissions {
				tag: tag.to_string(),
				expected: group.expected,
			});
		}

		self.shared.enqueue_bounded(Item {
			group: Some(group),
			work: Box::new(work),
		})
	}

	/// Blocks until every submitted unit and every group finalizer has
	/// completed, then reports the first captured failure, if any.
	pub fn wait(&self) -> Result<(), Error> {
		let mut queue = lock(&self.shared.queue);
		while !(queue.items.is_empty() && queue.running == 0) {
			queue = self
				.shared
				.drained
				.wait(queue)
				.expect("pool mutex poisoned");
		}
		drop(queue);

		let mut failures = lock(&self.shared.failures);
		if failures.is_empty() {
			return Ok(());
		}
		let first = failures.remove(0);
		for failure in failures.drain(..) {
			tracing::error!(error = %failure, "additional work failure");
		}
		Err(first)
	}

	/// Waits as [`Self::wait`], then joins the workers. Subsequent
	/// `submit`/`submit_tagged`/`register_group` calls fail.
	pub fn shutdown(&mut self) -> Result<(), Error> {
		let result = self.wait();
		self.release_workers();
		result
	}

	fn release_workers(&mut self) {
		{
			let mut queue = lock(&self.shared.queue);
			queue.shutdown = true;
		}
		self.shared.not_empty.notify_all();
		self.shared.not_full.notify_all();
		for handle in self.workers.drain(..) {
			let _ = handle.join();
		}
	}
}

impl Drop for ThreadPool {
	fn drop(&mut self) {
		let _ = self.shutdown();
	}
}

impl Shared {
	fn enqueue_bounded(&self, item: Item) -> Result<(), Error> {
		let mut queue = lock(&self.queue);
		loop {
			if queue.shutdown {
				bail!(Error::ShutDown);
			}
			if queue.items.len() < self.capacity {
				break;
			}
			queue = self.not_full.wait(queue).expect("pool mutex poisoned");
		}
		queue.items.push_back(item);
		drop(queue);
		self.not_empty.notify_one();
		Ok(())
	}

	// Finalizers are enqueued from worker threads; they must never block on
	// the capacity bound, or a full queue would deadlock the pool.
	fn enqueue_unbounded(&self, item: Item) {
		let mut queue = lock(&self.queue);
		if queue.shutdown {
			return;
		}
		queue.items.push_back(item);
		drop(queue);
		self.not_empty.notify_one();
	}

	fn complete(&self, group: &Arc<Group>) {
		let completed = group.completed.fetch_add(1, Ordering::AcqRel) + 1;
		if completed < group.expected {
			return;
		}
		// The `expected`-th completion: every sibling unit has finished, so
		// the finalizer cannot observe a partially written buffer.
		let finalize = lock(&group.finalize).take();
		lock(&self.groups).remove(&group.tag);
		if let Some(work) = finalize {
			tracing::debug!(tag = %group.tag, "group complete, scheduling finalizer");
			self.enqueue_unbounded(Item { group: None, work });
		}
	}
}

fn worker_loop(shared: &Shared) {
	loop {
		let item = {
			let mut queue = lock(&shared.queue);
			loop {
				if let Some(item) = queue.items.pop_front() {
					queue.running += 1;
					break item;
				}
				if queue.shutdown {
					return;
				}
				queue = shared.not_empty.wait(queue).expect("pool mutex poisoned");
			}
		};
		shared.not_full.notify_one();

		let tag = item.group.as_ref().map(|group| group.tag.clone());
		if let Err(source) = (item.work)() {
			tracing::error!(?tag, error = %source, "work unit failed");
			lock(&shared.failures).push(Error::WorkFailed { tag, source });
		}
		// A failed unit still counts toward its group: the finalizer fires
		// (and reports its own failure) instead of wait() hanging forever.
		if let Some(group) = &item.group {
			shared.complete(group);
		}

		let mut queue = lock(&shared.queue);
		queue.running -= 1;
		if queue.items.is_empty() && queue.running == 0 {
			shared.drained.notify_all();
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().expect("pool mutex poisoned")
}

#[cfg(test)]
mod tests {
	use std::{
		sync::atomic::{AtomicIsize, AtomicUsize, Ordering},
		time::Duration,
	};

	use assert_matches::assert_matches;
	use rand::{rngs::StdRng, Rng, SeedableRng};

	use super::*;

	#[test]
	fn test_finalizer_fires_exactly_once_after_all_units() {
		let mut rng = StdRng::seed_from_u64(0);
		let k = 32;

		let mut pool = ThreadPool::new(4).unwrap();
		let completions = Arc::new(AtomicUsize::new(0));
		let fired = Arc::new(AtomicUsize::new(0));
		let seen_at_fire = Arc::new(AtomicUsize::new(usize::MAX));

		{
			let completions = Arc::clone(&completions);
			let fired = Arc::clone(&fired);
			let seen_at_fire = Arc::clone(&seen_at_fire);
			pool.register_group("vec", k, move || {
				seen_at_fire.store(completions.load(Ordering::SeqCst), Ordering::SeqCst);
				fired.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}

		for _ in 0..k {
			let delay = Duration::from_micros(rng.gen_range(0..500));
			let completions = Arc::clone(&completions);
			pool.submit_tagged("vec", move || {
				std::thread::sleep(delay);
				completions.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}

		pool.shutdown().unwrap();
		assert_eq!(fired.load(Ordering::SeqCst), 1);
		assert_eq!(seen_at_fire.load(Ordering::SeqCst), k);
	}

	#[test]
	fn test_finalizer_never_overlaps_group_units() {
		let mut pool = ThreadPool::new(4).unwrap();
		let in_flight = Arc::new(AtomicIsize::new(0));
		let in_flight_at_fire = Arc::new(AtomicIsize::new(isize::MIN));

		{
			let in_flight = Arc::clone(&in_flight);
			let in_flight_at_fire = Arc::clone(&in_flight_at_fire);
			pool.register_group("layer", 16, move || {
				in_flight_at_fire.store(in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}

		for _ in 0..16 {
			let in_flight = Arc::clone(&in_flight);
			pool.submit_tagged("layer", move || {
				in_flight.fetch_add(1, Ordering::SeqCst);
				std::thread::sleep(Duration::from_micros(200));
				in_flight.fetch_sub(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}

		pool.shutdown().unwrap();
		assert_eq!(in_flight_at_fire.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_groups_finalize_independently() {
		let mut pool = ThreadPool::new(2).unwrap();
		let fired = Arc::new(AtomicUsize::new(0));

		for tag in ["s_enc", "t_enc"] {
			let fired = Arc::clone(&fired);
			pool.register_group(tag, 4, move || {
				fired.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
			for _ in 0..4 {
				pool.submit_tagged(tag, || Ok(())).unwrap();
			}
		}

		pool.shutdown().unwrap();
		assert_eq!(fired.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn test_empty_group_finalizes() {
		let mut pool = ThreadPool::new(1).unwrap();
		let fired = Arc::new(AtomicUsize::new(0));
		{
			let fired = Arc::clone(&fired);
			pool.register_group("empty", 0, move || {
				fired.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}
		pool.shutdown().unwrap();
		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_work_failure_is_surfaced_from_wait() {
		let pool = ThreadPool::new(2).unwrap();
		pool.submit(|| Err("encode failed".into())).unwrap();
		assert_matches!(pool.wait(), Err(Error::WorkFailed { tag: None, .. }));
		// Failures are drained once reported.
		assert_matches!(pool.wait(), Ok(()));
	}

	#[test]
	fn test_duplicate_group_is_rejected() {
		let pool = ThreadPool::new(1).unwrap();
		pool.register_group("dup", 1, || Ok(())).unwrap();
		assert_matches!(
			pool.register_group("dup", 1, || Ok(())),
			Err(Error::GroupAlreadyRegistered { .. })
		);
		pool.submit_tagged("dup", || Ok(())).unwrap();
	}

	#[test]
	fn test_unknown_tag_is_rejected() {
		let pool = ThreadPool::new(1).unwrap();
		assert_matches!(
			pool.submit_tagged("nope", || Ok(())),
			Err(Error::UnknownGroup { .. })
		);
	}

	#[test]
	fn test_excess_submissions_are_rejected() {
		let pool = ThreadPool::new(1).unwrap();
		let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();

		pool.register_group("one", 1, || Ok(())).unwrap();
		// Hold the declared unit open so the group is still live when the
		// excess submission arrives.
		pool.submit_tagged("one", move || {
			let _ = gate_rx.recv();
			Ok(())
		})
		.unwrap();
		assert_matches!(
			pool.submit_tagged("one", || Ok(())),
			Err(Error::ExcessSubmissions { expected: 1, .. })
		);
		gate_tx.send(()).unwrap();
		pool.wait().unwrap();
	}

	#[test]
	fn test_bounded_queue_backpressure_completes() {
		let mut pool = ThreadPool::with_queue_capacity(2, 2).unwrap();
		let done = Arc::new(AtomicUsize::new(0));
		for _ in 0..64 {
			let done = Arc::clone(&done);
			pool.submit(move || {
				done.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap();
		}
		pool.shutdown().unwrap();
		assert_eq!(done.load(Ordering::SeqCst), 64);
	}

	#[test]
	fn test_submit_after_shutdown_fails() {
		let mut pool = ThreadPool::new(1).unwrap();
		pool.shutdown().unwrap();
		assert_matches!(pool.submit(|| Ok(())), Err(Error::ShutDown));
		assert_matches!(
			pool.submit_tagged("any", || Ok(())),
			Err(Error::UnknownGroup { .. })
		);
	}

	#[test]
	fn test_zero_workers_rejected() {
		assert_matches!(ThreadPool::new(0), Err(Error::ZeroWorkers));
	}
}
