// Copyright 2025 Irreducible Inc.

/// Failure reported by a single unit of work.
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("worker count must be positive")]
	ZeroWorkers,
	#[error("queue capacity must be positive")]
	ZeroCapacity,
	#[error("failed to spawn worker thread: {0}")]
	Spawn(#[from] std::io::Error),
	#[error("pool is shut down")]
	ShutDown,
	#[error("group \"{tag}\" is already registered")]
	GroupAlreadyRegistered { tag: String },
	#[error("no group registered under tag \"{tag}\"")]
	UnknownGroup { tag: String },
	#[error("group \"{tag}\" declared {expected} units, received more")]
	ExcessSubmissions { tag: String, expected: usize },
	#[error("work unit under tag {tag:?} failed: {source}")]
	WorkFailed {
		tag: Option<String>,
		source: WorkError,
	},
}
