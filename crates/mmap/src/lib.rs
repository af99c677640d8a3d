// Copyright 2025 Irreducible Inc.

//! Graded-encoding (multilinear-map) capability interface.
//!
//! The obfuscation engine never looks inside an encoding: it drives a
//! scheme through the two capability traits below and treats the elements
//! as opaque ring values. Two concrete variants are provided, selected at
//! runtime by [`MmapKind`]:
//!
//! - [`IntegerMmap`] — multi-slot composite-integer variant. Plaintexts
//!   are one residue per slot; encodings are integers modulo the product
//!   of the per-slot primes. Serialized as raw scalars.
//! - [`PolynomialMmap`] — single-slot polynomial-ring variant. Plaintexts
//!   embed as constant polynomials in `Z_q[x]/(x^n + 1)`. Serialized as a
//!   length-prefixed coefficient list plus the coefficient modulus.
//!
//! The full scheme handle ([`Mmap`]) exists only in the process that runs
//! setup and encoding. Evaluation reloads just the public parameter record
//! ([`MmapParams`]), which carries every numeric field `mul`/`add`/
//! `is_zero` need.

pub mod error;
mod integer;
mod poly;
mod prime;

pub use error::Error;
pub use integer::{IntegerEncoding, IntegerMmap, IntegerParams};
pub use poly::{PolynomialEncoding, PolynomialMmap, PolynomialParams};

use num_bigint::BigUint;
use obf_utils::{
	bail,
	serialization::{DeserializeBytes, SerializeBytes},
};
use rand::Rng;

/// Shorthand for the encoding type of a scheme.
pub type EncodingOf<M> = <<M as Mmap>::Params as MmapParams>::Encoding;

/// Runtime selector for the two scheme variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapKind {
	Integer,
	Polynomial,
}

impl MmapKind {
	pub(crate) const fn discriminant(self) -> u8 {
		match self {
			Self::Integer => 0,
			Self::Polynomial => 1,
		}
	}
}

/// The set of grading positions an encoding is produced under.
///
/// Represented as one power per position, mirroring the scheme boundary:
/// the integer variant encodes under a one-hot set (power 1 at the layer's
/// grading position), the polynomial variant under the trivial all-zero
/// set — see [`Mmap::index_set_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
	pows: Box<[u32]>,
}

impl IndexSet {
	/// The all-zero index set over `len` positions.
	pub fn trivial(len: usize) -> Self {
		Self {
			pows: vec![0; len].into_boxed_slice(),
		}
	}

	/// A one-hot index set with power 1 at `position`.
	pub fn singleton(len: usize, position: usize) -> Result<Self, Error> {
		if position >= len {
			bail!(Error::IndexOutOfRange { position, len });
		}
		let mut pows = vec![0; len];
		pows[position] = 1;
		Ok(Self {
			pows: pows.into_boxed_slice(),
		})
	}

	pub fn len(&self) -> usize {
		self.pows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pows.is_empty()
	}

	pub fn pows(&self) -> &[u32] {
		&self.pows
	}
}

/// Public evaluation capability of a scheme: the ring operations and the
/// zero test, plus a persistable parameter record.
pub trait MmapParams: SerializeBytes + DeserializeBytes + Send + Sync + Sized + 'static {
	type Encoding: Clone
		+ PartialEq
		+ Send
		+ Sync
		+ SerializeBytes
		+ DeserializeBytes
		+ 'static;

	fn mul(&self, lhs: &Self::Encoding, rhs: &Self::Encoding) -> Self::Encoding;

	fn add(&self, lhs: &Self::Encoding, rhs: &Self::Encoding) -> Self::Encoding;

	/// Whether `enc` encodes the scheme's zero element.
	fn is_zero(&self, enc: &Self::Encoding) -> bool;
}

/// Full scheme handle: setup and encoding, on top of the public
/// parameters.
pub trait Mmap: Send + Sync + Sized + 'static {
	type Params: MmapParams;

	/// Initializes a fresh scheme instance.
	///
	/// `degree` is the multilinearity degree (the length of the longest
	/// product the scheme must support), `num_index_sets` the number of
	/// grading positions.
	fn setup(
		security_param: usize,
		degree: usize,
		num_index_sets: usize,
		rng: impl Rng,
	) -> Result<Self, Error>;

	fn params(&self) -> &Self::Params;

	/// Number of plaintext slots each encoding carries.
	fn num_slots(&self) -> usize;

	/// Per-slot plaintext moduli, published to the caller at setup.
	fn plaintext_moduli(&self) -> &[BigUint];

	/// The index set this scheme assigns to grading position `position`.
	fn index_set_for(&self, position: usize) -> Result<IndexSet, Error>;

	/// Encodes one plaintext per slot under `index_set`.
	fn encode(
		&self,
		slots: &[BigUint],
		index_set: &IndexSet,
	) -> Result<EncodingOf<Self>, Error>;
}
