// Copyright 2025 Irreducible Inc.

//! Boundary surface consumed by the host binding layer.
//!
//! [`setup`] creates one obfuscation instance: the encode scheduler, the
//! scheme handle, and the persisted public parameters. The returned
//! [`Instance`] dispatches the orchestration calls over the two scheme
//! variants; evaluation is a pair of free functions (re-exported at the
//! crate root) that reload everything fresh from the artifact directory.

use std::path::PathBuf;

use num_bigint::BigUint;
use obf_mmap::{IntegerMmap, Mmap, MmapKind, PolynomialMmap};
use obf_utils::ensure;
use rand::Rng;
use tracing::{info, instrument};

use crate::{
	error::Error,
	obfuscator::Obfuscator,
	storage::{ArtifactDir, SIZE_NAME},
};

/// Arguments accepted by [`setup`].
#[derive(Debug, Clone)]
pub struct SetupConfig {
	pub security_param: usize,
	/// Multilinearity degree the scheme must support (the longest product
	/// taken at evaluation time).
	pub degree: usize,
	/// Boundary-vector length, or zero when the instance has no bookend
	/// vectors.
	pub boundary_size: usize,
	/// Number of grading positions.
	pub num_index_slots: usize,
	/// Artifact directory for this instance.
	pub dir: PathBuf,
	pub kind: MmapKind,
	/// Worker count of the encode scheduler.
	pub num_threads: usize,
	/// Thread count for element-granularity algebra; zero uses all cores.
	pub num_cores: usize,
}

/// Handle on one obfuscation instance under construction.
pub enum Instance {
	Integer(Obfuscator<IntegerMmap>),
	Polynomial(Obfuscator<PolynomialMmap>),
}

/// Initializes an obfuscation instance.
///
/// Validates the configuration, creates the scheduler and the scheme,
/// persists the public parameter record (plus the boundary-vector length
/// when one is declared), and returns the instance handle together with
/// the scheme's per-slot plaintext moduli.
#[instrument(skip_all, name = "setup", level = "debug")]
pub fn setup(config: SetupConfig, rng: impl Rng + Send) -> Result<(Instance, Vec<BigUint>), Error> {
	ensure!(config.degree > 0, Error::ZeroDegree);
	ensure!(config.num_index_slots > 0, Error::ZeroIndexSlots);

	let storage = ArtifactDir::create(&config.dir)?;
	if config.boundary_size > 0 {
		storage.save_scalar(SIZE_NAME, &BigUint::from(config.boundary_size))?;
	}

	info!(
		kind = ?config.kind,
		threads = config.num_threads,
		cores = config.num_cores,
		"setting up obfuscation instance"
	);
	let algebra = rayon::ThreadPoolBuilder::new()
		.num_threads(config.num_cores)
		.build()?;

	match config.kind {
		MmapKind::Integer => {
			let mmap = algebra.install(|| {
				IntegerMmap::setup(
					config.security_param,
					config.degree,
					config.num_index_slots,
					rng,
				)
			})?;
			finish(mmap, storage, config.num_threads, Instance::Integer)
		}
		MmapKind::Polynomial => {
			let mmap = algebra.install(|| {
				PolynomialMmap::setup(
					config.security_param,
					config.degree,
					config.num_index_slots,
					rng,
				)
			})?;
			finish(mmap, storage, config.num_threads, Instance::Polynomial)
		}
	}
}

fn finish<M: Mmap>(
	mmap: M,
	storage: ArtifactDir,
	num_threads: usize,
	wrap: impl FnOnce(Obfuscator<M>) -> Instance,
) -> Result<(Instance, Vec<BigUint>), Error> {
	storage.save_params(mmap.params())?;
	let moduli = mmap.plaintext_moduli().to_vec();
	let obfuscator = Obfuscator::new(mmap, storage, num_threads)?;
	Ok((wrap(obfuscator), moduli))
}

impl Instance {
	/// Plaintext slots each encoding carries.
	pub fn num_slots(&self) -> usize {
		match self {
			Self::Integer(obf) => obf.mmap().num_slots(),
			Self::Polynomial(obf) => obf.mmap().num_slots(),
		}
	}

	/// See [`Obfuscator::encode_vector`].
	pub fn encode_vector(
		&self,
		name: &str,
		index_position: usize,
		columns: &[Vec<BigUint>],
	) -> Result<(), Error> {
		match self {
			Self::Integer(obf) => obf.encode_vector(name, index_position, columns),
			Self::Polynomial(obf) => obf.encode_vector(name, index_position, columns),
		}
	}

	/// See [`Obfuscator::encode_layer`].
	pub fn encode_layer(
		&self,
		layer_index: usize,
		nrows: usize,
		ncols: usize,
		input_wire: usize,
		zero_columns: &[Vec<BigUint>],
		one_columns: &[Vec<BigUint>],
	) -> Result<(), Error> {
		match self {
			Self::Integer(obf) => obf.encode_layer(
				layer_index,
				nrows,
				ncols,
				input_wire,
				zero_columns,
				one_columns,
			),
			Self::Polynomial(obf) => obf.encode_layer(
				layer_index,
				nrows,
				ncols,
				input_wire,
				zero_columns,
				one_columns,
			),
		}
	}

	/// Blocks until every scheduled encode and persistence finalizer has
	/// completed. Must return before the artifact directory is read.
	pub fn wait(&self) -> Result<(), Error> {
		match self {
			Self::Integer(obf) => obf.wait(),
			Self::Polynomial(obf) => obf.wait(),
		}
	}
}

/// Reports the process peak resident set size in kilobytes.
pub fn max_mem_usage() -> u64 {
	let peak_rss_kb = obf_utils::mem::peak_rss_kb();
	info!(peak_rss_kb, "peak memory usage");
	peak_rss_kb
}
