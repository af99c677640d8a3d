// Copyright 2025 Irreducible Inc.

//! Encoding orchestration.
//!
//! [`Obfuscator`] drives a scheme to produce the persisted artifacts of
//! one obfuscation instance. Every element encode is an independent unit
//! on the tagged worker pool; each unit writes its result into a private
//! write-once cell of a shared pre-sized buffer, so units of one artifact
//! never contend, and the group finalizer serializes the completed buffer
//! once the last sibling finishes. Scheduling calls return immediately —
//! [`Obfuscator::wait`] is the only synchronization barrier, and callers
//! must not read the directory before it returns.

use std::{
	sync::{Arc, OnceLock},
	time::Instant,
};

use num_bigint::BigUint;
use obf_mmap::{EncodingOf, Mmap};
use obf_pool::{ThreadPool, WorkError};
use obf_utils::ensure;
use tracing::{debug, instrument};

use crate::{
	error::Error,
	storage::{ArtifactDir, LayerHeader},
};

pub struct Obfuscator<M: Mmap> {
	mmap: Arc<M>,
	pool: ThreadPool,
	storage: ArtifactDir,
}

impl<M: Mmap> Obfuscator<M> {
	pub fn new(mmap: M, storage: ArtifactDir, num_threads: usize) -> Result<Self, Error> {
		Ok(Self {
			mmap: Arc::new(mmap),
			pool: ThreadPool::new(num_threads)?,
			storage,
		})
	}

	pub fn mmap(&self) -> &M {
		&self.mmap
	}

	/// Schedules the encoding of one boundary vector under the index set
	/// of grading position `index_position`, persisted as artifact `name`.
	///
	/// `columns` holds one plaintext column per scheme slot; position `i`
	/// of column `j` is the slot-`j` plaintext of vector element `i`.
	#[instrument(skip_all, name = "obfuscator::encode_vector", level = "debug")]
	pub fn encode_vector(
		&self,
		name: &str,
		index_position: usize,
		columns: &[Vec<BigUint>],
	) -> Result<(), Error> {
		let length = column_length(columns, self.mmap.num_slots())?;
		let index_set = self.mmap.index_set_for(index_position)?;

		let cells = new_cell_buffer::<EncodingOf<M>>(length);
		let started = Instant::now();

		{
			let storage = self.storage.clone();
			let cells = Arc::clone(&cells);
			let artifact = name.to_string();
			self.pool.register_group(name, length, move || {
				let vector = collect_cells(&cells)?;
				storage.save_encodings(&artifact, &vector)?;
				debug!(
					artifact = %artifact,
					length,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"boundary vector persisted"
				);
				Ok(())
			})?;
		}

		for position in 0..length {
			let slots = slots_at(columns, position);
			let mmap = Arc::clone(&self.mmap);
			let index_set = index_set.clone();
			let cells = Arc::clone(&cells);
			self.pool.submit_tagged(name, move || {
				let encoding = mmap.encode(&slots, &index_set)?;
				set_cell(&cells, position, encoding)
			})?;
		}
		Ok(())
	}

	/// Schedules the encoding of one branching-program layer: the zero-
	/// and one-branch matrices as `2·nrows·ncols` independent element
	/// encodes at grading position `layer_index`, persisted as one layer
	/// record when the last element finishes.
	///
	/// Matrices are row-major; `input_wire` is the input bit the layer
	/// reads at evaluation time.
	#[instrument(skip_all, name = "obfuscator::encode_layer", level = "debug", fields(layer = layer_index))]
	pub fn encode_layer(
		&self,
		layer_index: usize,
		nrows: usize,
		ncols: usize,
		input_wire: usize,
		zero_columns: &[Vec<BigUint>],
		one_columns: &[Vec<BigUint>],
	) -> Result<(), Error> {
		ensure!(
			nrows > 0 && ncols > 0,
			Error::BadLayerDimensions {
				layer: layer_index,
				nrows,
				ncols,
			}
		);
		let count = nrows * ncols;
		for columns in [zero_columns, one_columns] {
			let actual = column_length(columns, self.mmap.num_slots())?;
			ensure!(
				actual == count,
				Error::MatrixCellCountMismatch {
					layer: layer_index,
					expected: count,
					actual,
				}
			);
		}
		let index_set = self.mmap.index_set_for(layer_index)?;
		let tag = layer_index.to_string();

		let zero_cells = new_cell_buffer::<EncodingOf<M>>(count);
		let one_cells = new_cell_buffer::<EncodingOf<M>>(count);
		let started = Instant::now();

		{
			let storage = self.storage.clone();
			let zero_cells = Arc::clone(&zero_cells);
			let one_cells = Arc::clone(&one_cells);
			self.pool.register_group(&tag, 2 * count, move || {
				let zero = collect_cells(&zero_cells)?;
				let one = collect_cells(&one_cells)?;
				let header = LayerHeader {
					nrows,
					ncols,
					input_wire,
				};
				storage.save_layer(layer_index, header, &zero, &one)?;
				debug!(
					layer = layer_index,
					nrows,
					ncols,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"layer persisted"
				);
				Ok(())
			})?;
		}

		for (columns, cells) in [(zero_columns, &zero_cells), (one_columns, &one_cells)] {
			for position in 0..count {
				let slots = slots_at(columns, position);
				let mmap = Arc::clone(&self.mmap);
				let index_set = index_set.clone();
				let cells = Arc::clone(cells);
				self.pool.submit_tagged(&tag, move || {
					let encoding = mmap.encode(&slots, &index_set)?;
					set_cell(&cells, position, encoding)
				})?;
			}
		}
		Ok(())
	}

	/// Blocks until every scheduled encode and every persistence finalizer
	/// has completed, surfacing the first captured failure.
	pub fn wait(&self) -> Result<(), Error> {
		Ok(self.pool.wait()?)
	}
}

fn column_length(columns: &[Vec<BigUint>], num_slots: usize) -> Result<usize, Error> {
	ensure!(
		columns.len() == num_slots,
		Error::ColumnCountMismatch {
			expected: num_slots,
			actual: columns.len(),
		}
	);
	let length = columns[0].len();
	for (column, values) in columns.iter().enumerate() {
		ensure!(
			values.len() == length,
			Error::RaggedColumns {
				column,
				expected: length,
				actual: values.len(),
			}
		);
	}
	Ok(length)
}

fn slots_at(columns: &[Vec<BigUint>], position: usize) -> Vec<BigUint> {
	columns.iter().map(|column| column[position].clone()).collect()
}

fn new_cell_buffer<E>(len: usize) -> Arc<Vec<OnceLock<E>>> {
	Arc::new((0..len).map(|_| OnceLock::new()).collect())
}

// The write-once cells are what make concurrent units race-free: each unit
// owns exactly one index, and a second write to the same index is reported
// instead of silently clobbering a sibling's output.
fn set_cell<E>(cells: &[OnceLock<E>], position: usize, encoding: E) -> Result<(), WorkError> {
	cells[position]
		.set(encoding)
		.map_err(|_| format!("output cell {position} written twice").into())
}

fn collect_cells<E: Clone>(cells: &[OnceLock<E>]) -> Result<Vec<E>, WorkError> {
	cells
		.iter()
		.enumerate()
		.map(|(position, cell)| {
			cell.get()
				.cloned()
				.ok_or_else(|| format!("output cell {position} was never written").into())
		})
		.collect()
}
