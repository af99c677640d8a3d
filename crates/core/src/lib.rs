// Copyright 2025 Irreducible Inc.

//! Construction and evaluation engine for matrix-branching-program
//! obfuscation over a graded-encoding scheme.
//!
//! Construction drives the scheme through the [`obfuscator`] module:
//! every element encode runs as an independent unit on a tagged worker
//! pool, and each artifact (a boundary vector or a branching-program
//! layer) is persisted by a group finalizer exactly once, after its last
//! element finishes. Evaluation ([`evaluate`], [`sz_evaluate`]) reloads
//! the persisted artifacts, reduces the selected matrix chain in the
//! scheme's algebra, and applies the zero test; the output bit is `0`
//! exactly when the tested value is the scheme's zero element.
//!
//! The scheme itself is opaque: see [`obf_mmap`] for the capability
//! traits and the two concrete variants.

pub mod api;
pub mod error;
pub mod evaluate;
pub mod obfuscator;
pub mod storage;

pub use api::{max_mem_usage, setup, Instance, SetupConfig};
pub use error::Error;
pub use evaluate::{evaluate, sz_evaluate};
