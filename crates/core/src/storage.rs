// Copyright 2025 Irreducible Inc.

//! Directory artifact set.
//!
//! One directory per obfuscation instance holds every persisted artifact:
//! an optional `size` scalar (the boundary-vector length), the `s_enc`/
//! `t_enc` bookend vectors, per-layer `<layer>.nrows`, `<layer>.ncols`,
//! `<layer>.input`, `<layer>.zero`, `<layer>.one` files, and one `params`
//! record. The file names are a compatibility contract with the external
//! compiler that produces the branching program.
//!
//! Records are assembled in an in-memory buffer and written in one shot,
//! so the on-disk layout is independent of worker count and completion
//! order. Vector files are flat concatenations with no length header; the
//! reader supplies the element count from the companion dimension scalars.

use std::{fs, path::PathBuf};

use num_bigint::BigUint;
use obf_utils::{
	bail, ensure,
	serialization::{DeserializeBytes, SerializeBytes},
};

use crate::error::Error;

pub const SIZE_NAME: &str = "size";
pub const PARAMS_NAME: &str = "params";
pub const S_VECTOR_NAME: &str = "s_enc";
pub const T_VECTOR_NAME: &str = "t_enc";

/// Name of a per-layer artifact file, e.g. `3.nrows`.
pub fn layer_file(layer: usize, field: &str) -> String {
	format!("{layer}.{field}")
}

/// The scalar metadata persisted alongside a layer's two matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerHeader {
	pub nrows: usize,
	pub ncols: usize,
	pub input_wire: usize,
}

/// Handle on one obfuscation instance's artifact directory.
///
/// Provides no locking: construction must be drained (via the pool's
/// `wait`) before any evaluation reads the directory.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
	dir: PathBuf,
}

impl ArtifactDir {
	/// Creates the directory (and parents) if needed.
	pub fn create(dir: impl Into<PathBuf>) -> Result<Self, Error> {
		let dir = dir.into();
		fs::create_dir_all(&dir).map_err(|source| Error::Io {
			op: "create",
			path: dir.clone(),
			source,
		})?;
		Ok(Self { dir })
	}

	/// Opens an existing directory for evaluation.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
		let dir = dir.into();
		if !dir.is_dir() {
			bail!(Error::Io {
				op: "open",
				path: dir,
				source: std::io::Error::from(std::io::ErrorKind::NotFound),
			});
		}
		Ok(Self { dir })
	}

	pub fn path(&self, name: &str) -> PathBuf {
		self.dir.join(name)
	}

	pub fn save_scalar(&self, name: &str, value: &BigUint) -> Result<(), Error> {
		let mut buf = Vec::new();
		value
			.serialize(&mut buf)
			.map_err(|source| self.corrupt(name, source))?;
		self.write(name, &buf)
	}

	pub fn load_scalar(&self, name: &str) -> Result<BigUint, Error> {
		let bytes = self.read(name)?;
		let mut rest = bytes.as_slice();
		let value =
			BigUint::deserialize(&mut rest).map_err(|source| self.corrupt(name, source))?;
		self.ensure_consumed(name, rest)?;
		Ok(value)
	}

	/// Loads a scalar that must fit in a machine word (a dimension or an
	/// input-wire index).
	pub fn load_dimension(&self, name: &str) -> Result<usize, Error> {
		let value = self.load_scalar(name)?;
		usize::try_from(&value).map_err(|_| Error::ScalarOutOfRange {
			path: self.path(name),
		})
	}

	/// Persists a vector of encodings as a flat concatenation.
	pub fn save_encodings<E: SerializeBytes>(&self, name: &str, encodings: &[E]) -> Result<(), Error> {
		let mut buf = Vec::new();
		for encoding in encodings {
			encoding
				.serialize(&mut buf)
				.map_err(|source| self.corrupt(name, source))?;
		}
		self.write(name, &buf)
	}

	/// Loads exactly `count` encodings. Vector files carry no length
	/// header, so the count comes from the caller; leftover bytes are
	/// reported as corruption.
	pub fn load_encodings<E: DeserializeBytes>(
		&self,
		name: &str,
		count: usize,
	) -> Result<Vec<E>, Error> {
		let bytes = self.read(name)?;
		let mut rest = bytes.as_slice();
		let encodings = (0..count)
			.map(|_| E::deserialize(&mut rest))
			.collect::<Result<Vec<_>, _>>()
			.map_err(|source| self.corrupt(name, source))?;
		self.ensure_consumed(name, rest)?;
		Ok(encodings)
	}

	pub fn save_params<P: SerializeBytes>(&self, params: &P) -> Result<(), Error> {
		let mut buf = Vec::new();
		params
			.serialize(&mut buf)
			.map_err(|source| self.corrupt(PARAMS_NAME, source))?;
		self.write(PARAMS_NAME, &buf)
	}

	pub fn load_params<P: DeserializeBytes>(&self) -> Result<P, Error> {
		let bytes = self.read(PARAMS_NAME)?;
		let mut rest = bytes.as_slice();
		let params =
			P::deserialize(&mut rest).map_err(|source| self.corrupt(PARAMS_NAME, source))?;
		self.ensure_consumed(PARAMS_NAME, rest)?;
		Ok(params)
	}

	/// Persists one branching-program layer record: the three metadata
	/// scalars plus the zero- and one-branch matrices.
	pub fn save_layer<E: SerializeBytes>(
		&self,
		layer: usize,
		header: LayerHeader,
		zero: &[E],
		one: &[E],
	) -> Result<(), Error> {
		self.save_scalar(&layer_file(layer, "nrows"), &BigUint::from(header.nrows))?;
		self.save_scalar(&layer_file(layer, "ncols"), &BigUint::from(header.ncols))?;
		self.save_scalar(&layer_file(layer, "input"), &BigUint::from(header.input_wire))?;
		self.save_encodings(&layer_file(layer, "zero"), zero)?;
		self.save_encodings(&layer_file(layer, "one"), one)
	}

	pub fn load_layer_header(&self, layer: usize) -> Result<LayerHeader, Error> {
		Ok(LayerHeader {
			nrows: self.load_dimension(&layer_file(layer, "nrows"))?,
			ncols: self.load_dimension(&layer_file(layer, "ncols"))?,
			input_wire: self.load_layer_input(layer)?,
		})
	}

	pub fn load_layer_input(&self, layer: usize) -> Result<usize, Error> {
		self.load_dimension(&layer_file(layer, "input"))
	}

	/// Loads the zero-branch (`bit == false`) or one-branch matrix of a
	/// layer, with `count` cells.
	pub fn load_layer_matrix<E: DeserializeBytes>(
		&self,
		layer: usize,
		bit: bool,
		count: usize,
	) -> Result<Vec<E>, Error> {
		let field = if bit { "one" } else { "zero" };
		self.load_encodings(&layer_file(layer, field), count)
	}

	fn write(&self, name: &str, bytes: &[u8]) -> Result<(), Error> {
		fs::write(self.path(name), bytes).map_err(|source| Error::Io {
			op: "write",
			path: self.path(name),
			source,
		})
	}

	fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
		fs::read(self.path(name)).map_err(|source| Error::Io {
			op: "read",
			path: self.path(name),
			source,
		})
	}

	fn ensure_consumed(&self, name: &str, rest: &[u8]) -> Result<(), Error> {
		ensure!(
			rest.is_empty(),
			Error::TrailingBytes {
				path: self.path(name),
				extra: rest.len(),
			}
		);
		Ok(())
	}

	fn corrupt(&self, name: &str, source: obf_utils::serialization::Error) -> Error {
		Error::Corrupt {
			path: self.path(name),
			source,
		}
	}
}
