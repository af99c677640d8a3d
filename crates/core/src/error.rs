// Copyright 2025 Irreducible Inc.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("multilinearity degree must be positive")]
	ZeroDegree,
	#[error("index-slot count must be positive")]
	ZeroIndexSlots,
	#[error("branching program length must be positive")]
	EmptyProgram,
	#[error("expected one plaintext column per slot ({expected} slots), got {actual}")]
	ColumnCountMismatch { expected: usize, actual: usize },
	#[error("plaintext columns must all have length {expected}, column {column} has {actual}")]
	RaggedColumns {
		column: usize,
		expected: usize,
		actual: usize,
	},
	#[error("layer {layer} dimensions must be positive, got {nrows}x{ncols}")]
	BadLayerDimensions {
		layer: usize,
		nrows: usize,
		ncols: usize,
	},
	#[error("layer {layer} matrices need {expected} plaintexts per column, got {actual}")]
	MatrixCellCountMismatch {
		layer: usize,
		expected: usize,
		actual: usize,
	},
	#[error("layer {layer} reads input bit {wire}, but the input has {len} characters")]
	InputWireOutOfRange {
		layer: usize,
		wire: usize,
		len: usize,
	},
	#[error("input bit {wire} must be '0' or '1', got {found:?}")]
	NonBinaryInput { wire: usize, found: char },
	#[error("layer {layer} is {nrows}x{ncols}, but the running product has {ncols_prev} columns")]
	LayerShapeMismatch {
		layer: usize,
		nrows: usize,
		ncols: usize,
		ncols_prev: usize,
	},
	#[error("boundary-vector length must be positive")]
	ZeroBoundarySize,
	#[error("final matrix has {len} cells, the zero test reads cell 1")]
	FinalMatrixTooSmall { len: usize },
	#[error("scalar in {path} does not fit in a machine word")]
	ScalarOutOfRange { path: PathBuf },
	#[error("failed to {op} {path}: {source}")]
	Io {
		op: &'static str,
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("artifact {path} is malformed: {source}")]
	Corrupt {
		path: PathBuf,
		source: obf_utils::serialization::Error,
	},
	#[error("artifact {path} has {extra} trailing bytes")]
	TrailingBytes { path: PathBuf, extra: usize },
	#[error("scheme: {0}")]
	Scheme(#[from] obf_mmap::Error),
	#[error("scheduler: {0}")]
	Pool(#[from] obf_pool::Error),
	#[error("failed to build algebra thread pool: {0}")]
	Algebra(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
	/// Whether the failure is a per-evaluation invalid input, recoverable
	/// by the caller, as opposed to a fatal configuration, storage, or
	/// scheme failure.
	pub fn is_invalid_input(&self) -> bool {
		matches!(
			self,
			Self::InputWireOutOfRange { .. } | Self::NonBinaryInput { .. }
		)
	}
}
