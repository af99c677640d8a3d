// Copyright 2025 Irreducible Inc.

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("security parameter must be at least 2")]
	SecurityParamTooSmall,
	#[error("multilinearity degree must be positive")]
	ZeroDegree,
	#[error("index-set count must be positive")]
	ZeroIndexCount,
	#[error("grading position {position} out of range for {len} index sets")]
	IndexOutOfRange { position: usize, len: usize },
	#[error("index set has {actual} positions, scheme instance has {expected}")]
	IndexSetLenMismatch { expected: usize, actual: usize },
	#[error("expected one plaintext per slot ({expected} slots), got {actual}")]
	SlotCountMismatch { expected: usize, actual: usize },
	#[error("failed to sample a {bits}-bit prime")]
	PrimeSampling { bits: u64 },
	#[error("{0}")]
	Serialization(#[from] obf_utils::serialization::Error),
}
