// Copyright 2025 Irreducible Inc.

//! Multi-slot composite-integer scheme variant.
//!
//! Setup samples one prime `g_i` per plaintext slot and publishes the ring
//! modulus `x0 = Π g_i`. An encoding of per-slot plaintexts `(m_1, …,
//! m_k)` is the CRT combination `c ≡ m_i (mod g_i)`, so ring operations
//! modulo `x0` act slot-wise and an encoding is zero exactly when every
//! slot is. Grading positions are tracked through one-hot index sets at
//! encode time; the persisted element form is a raw scalar.

use bytes::{Buf, BufMut};
use num_bigint::BigUint;
use num_traits::Zero;
use obf_utils::{
	bail, ensure,
	serialization::{self, DeserializeBytes, SerializeBytes},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::{prime, Error, IndexSet, Mmap, MmapKind, MmapParams};

/// An element of `Z_{x0}`, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerEncoding(BigUint);

impl SerializeBytes for IntegerEncoding {
	fn serialize(&self, write_buf: impl BufMut) -> Result<(), serialization::Error> {
		self.0.serialize(write_buf)
	}
}

impl DeserializeBytes for IntegerEncoding {
	fn deserialize(read_buf: impl Buf) -> Result<Self, serialization::Error> {
		Ok(Self(BigUint::deserialize(read_buf)?))
	}
}

/// Public parameters: the ring modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerParams {
	x0: BigUint,
}

impl IntegerParams {
	pub fn modulus(&self) -> &BigUint {
		&self.x0
	}
}

impl MmapParams for IntegerParams {
	type Encoding = IntegerEncoding;

	fn mul(&self, lhs: &IntegerEncoding, rhs: &IntegerEncoding) -> IntegerEncoding {
		IntegerEncoding(&lhs.0 * &rhs.0 % &self.x0)
	}

	fn add(&self, lhs: &IntegerEncoding, rhs: &IntegerEncoding) -> IntegerEncoding {
		IntegerEncoding((&lhs.0 + &rhs.0) % &self.x0)
	}

	fn is_zero(&self, enc: &IntegerEncoding) -> bool {
		(&enc.0 % &self.x0).is_zero()
	}
}

impl SerializeBytes for IntegerParams {
	fn serialize(&self, mut write_buf: impl BufMut) -> Result<(), serialization::Error> {
		if write_buf.remaining_mut() < 1 {
			return Err(serialization::Error::WriteBufferFull);
		}
		write_buf.put_u8(MmapKind::Integer.discriminant());
		self.x0.serialize(write_buf)
	}
}

impl DeserializeBytes for IntegerParams {
	fn deserialize(mut read_buf: impl Buf) -> Result<Self, serialization::Error> {
		if read_buf.remaining() < 1 {
			return Err(serialization::Error::NotEnoughBytes);
		}
		let tag = read_buf.get_u8();
		if tag != MmapKind::Integer.discriminant() {
			return Err(serialization::Error::UnknownEnumVariant {
				name: "MmapKind",
				index: tag,
			});
		}
		Ok(Self {
			x0: BigUint::deserialize(read_buf)?,
		})
	}
}

/// Full scheme handle created by setup.
pub struct IntegerMmap {
	params: IntegerParams,
	gs: Vec<BigUint>,
	// crt_basis[i] ≡ 1 (mod g_i) and ≡ 0 (mod g_j) for j ≠ i
	crt_basis: Vec<BigUint>,
	num_index_sets: usize,
}

impl Mmap for IntegerMmap {
	type Params = IntegerParams;

	fn setup(
		security_param: usize,
		degree: usize,
		num_index_sets: usize,
		mut rng: impl Rng,
	) -> Result<Self, Error> {
		ensure!(security_param >= 2, Error::SecurityParamTooSmall);
		ensure!(degree > 0, Error::ZeroDegree);
		ensure!(num_index_sets > 0, Error::ZeroIndexCount);

		let bits = security_param as u64;
		let started = std::time::Instant::now();
		let gs = sample_distinct_primes(security_param, bits, &mut rng)?;
		debug!(
			slots = gs.len(),
			bits,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"sampled plaintext moduli"
		);
		let x0: BigUint = gs.iter().product();

		let crt_basis = gs
			.iter()
			.map(|g| {
				let m = &x0 / g;
				let inv = prime::mod_inverse(&(&m % g), g)
					.expect("moduli are distinct primes, so x0/g is invertible mod g");
				m * inv % &x0
			})
			.collect();

		Ok(Self {
			params: IntegerParams { x0 },
			gs,
			crt_basis,
			num_index_sets,
		})
	}

	fn params(&self) -> &IntegerParams {
		&self.params
	}

	fn num_slots(&self) -> usize {
		self.gs.len()
	}

	fn plaintext_moduli(&self) -> &[BigUint] {
		&self.gs
	}

	fn index_set_for(&self, position: usize) -> Result<IndexSet, Error> {
		IndexSet::singleton(self.num_index_sets, position)
	}

	fn encode(&self, slots: &[BigUint], index_set: &IndexSet) -> Result<IntegerEncoding, Error> {
		ensure!(
			slots.len() == self.gs.len(),
			Error::SlotCountMismatch {
				expected: self.gs.len(),
				actual: slots.len(),
			}
		);
		ensure!(
			index_set.len() == self.num_index_sets,
			Error::IndexSetLenMismatch {
				expected: self.num_index_sets,
				actual: index_set.len(),
			}
		);

		let mut acc = BigUint::zero();
		for ((value, g), basis) in slots.iter().zip(&self.gs).zip(&self.crt_basis) {
			acc += value % g * basis;
		}
		Ok(IntegerEncoding(acc % &self.params.x0))
	}
}

/// Samples `count` distinct primes of exactly `bits` bits, fanning the
/// independent samples out over the current rayon pool.
fn sample_distinct_primes(
	count: usize,
	bits: u64,
	mut rng: impl Rng,
) -> Result<Vec<BigUint>, Error> {
	let seeds: Vec<u64> = (0..count).map(|_| rng.gen()).collect();
	let mut gs = seeds
		.into_par_iter()
		.map(|seed| prime::sample(bits, StdRng::seed_from_u64(seed)))
		.collect::<Result<Vec<_>, _>>()?;

	gs.sort_unstable();
	let mut attempts = 0;
	while has_adjacent_duplicate(&gs) {
		attempts += 1;
		if attempts > count * 64 {
			bail!(Error::PrimeSampling { bits });
		}
		dedup_resample(&mut gs, bits, &mut rng)?;
		gs.sort_unstable();
	}
	Ok(gs)
}

fn has_adjacent_duplicate(sorted: &[BigUint]) -> bool {
	sorted.windows(2).any(|pair| pair[0] == pair[1])
}

fn dedup_resample(sorted: &mut [BigUint], bits: u64, mut rng: impl Rng) -> Result<(), Error> {
	for i in 1..sorted.len() {
		if sorted[i] == sorted[i - 1] {
			sorted[i] = prime::sample(bits, &mut rng)?;
		}
	}
	Ok(())
}
