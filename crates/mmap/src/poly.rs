// Copyright 2025 Irreducible Inc.

//! Single-slot polynomial-ring scheme variant.
//!
//! Elements live in `Z_q[x]/(x^n + 1)` with `n` a power of two. A
//! plaintext embeds as a constant polynomial, multiplication is negacyclic
//! convolution, and an element is zero exactly when every coefficient
//! reduces to zero. This variant never marks a grading position: every
//! encoding is produced under the trivial all-zero index set, a fixed
//! convention of the persisted artifact format rather than a per-element
//! property.

use bytes::{Buf, BufMut};
use num_bigint::BigUint;
use num_traits::Zero;
use obf_utils::{
	ensure,
	serialization::{self, read_len, write_len, DeserializeBytes, SerializeBytes},
};
use rand::Rng;

use crate::{prime, Error, IndexSet, Mmap, MmapKind, MmapParams};

/// An element of `Z_q[x]/(x^n + 1)`, opaque to the engine.
///
/// Carries its own coefficient modulus, so the wire form is
/// self-describing: a length prefix, the modulus, then the coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolynomialEncoding {
	modulus: BigUint,
	coeffs: Vec<BigUint>,
}

impl SerializeBytes for PolynomialEncoding {
	fn serialize(&self, mut write_buf: impl BufMut) -> Result<(), serialization::Error> {
		write_len(&mut write_buf, self.coeffs.len())?;
		self.modulus.serialize(&mut write_buf)?;
		for coeff in &self.coeffs {
			coeff.serialize(&mut write_buf)?;
		}
		Ok(())
	}
}

impl DeserializeBytes for PolynomialEncoding {
	fn deserialize(mut read_buf: impl Buf) -> Result<Self, serialization::Error> {
		let len = read_len(&mut read_buf)?;
		let modulus = BigUint::deserialize(&mut read_buf)?;
		let coeffs = (0..len)
			.map(|_| BigUint::deserialize(&mut read_buf))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { modulus, coeffs })
	}
}

/// Public parameters: the ring degree and the coefficient modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolynomialParams {
	n: usize,
	q: BigUint,
}

impl PolynomialParams {
	pub fn ring_degree(&self) -> usize {
		self.n
	}

	pub fn coeff_modulus(&self) -> &BigUint {
		&self.q
	}
}

impl MmapParams for PolynomialParams {
	type Encoding = PolynomialEncoding;

	fn mul(&self, lhs: &PolynomialEncoding, rhs: &PolynomialEncoding) -> PolynomialEncoding {
		let mut acc = vec![BigUint::zero(); self.n];
		for (i, a) in lhs.coeffs.iter().enumerate() {
			if a.is_zero() {
				continue;
			}
			for (j, b) in rhs.coeffs.iter().enumerate() {
				if b.is_zero() {
					continue;
				}
				let prod = a * b % &self.q;
				// x^n ≡ -1, so degree i + j wraps with alternating sign.
				let k = (i + j) % self.n;
				if (i + j) / self.n % 2 == 0 {
					acc[k] += prod;
				} else if !prod.is_zero() {
					acc[k] += &self.q - prod;
				}
			}
		}
		PolynomialEncoding {
			modulus: self.q.clone(),
			coeffs: acc.into_iter().map(|c| c % &self.q).collect(),
		}
	}

	fn add(&self, lhs: &PolynomialEncoding, rhs: &PolynomialEncoding) -> PolynomialEncoding {
		let zero = BigUint::zero();
		let coeffs = (0..self.n)
			.map(|k| {
				(lhs.coeffs.get(k).unwrap_or(&zero) + rhs.coeffs.get(k).unwrap_or(&zero)) % &self.q
			})
			.collect();
		PolynomialEncoding {
			modulus: self.q.clone(),
			coeffs,
		}
	}

	fn is_zero(&self, enc: &PolynomialEncoding) -> bool {
		enc.coeffs.iter().all(|coeff| (coeff % &self.q).is_zero())
	}
}

impl SerializeBytes for PolynomialParams {
	fn serialize(&self, mut write_buf: impl BufMut) -> Result<(), serialization::Error> {
		if write_buf.remaining_mut() < 1 {
			return Err(serialization::Error::WriteBufferFull);
		}
		write_buf.put_u8(MmapKind::Polynomial.discriminant());
		write_len(&mut write_buf, self.n)?;
		self.q.serialize(write_buf)
	}
}

impl DeserializeBytes for PolynomialParams {
	fn deserialize(mut read_buf: impl Buf) -> Result<Self, serialization::Error> {
		if read_buf.remaining() < 1 {
			return Err(serialization::Error::NotEnoughBytes);
		}
		let tag = read_buf.get_u8();
		if tag != MmapKind::Polynomial.discriminant() {
			return Err(serialization::Error::UnknownEnumVariant {
				name: "MmapKind",
				index: tag,
			});
		}
		let n = read_len(&mut read_buf)?;
		Ok(Self {
			n,
			q: BigUint::deserialize(read_buf)?,
		})
	}
}

/// Full scheme handle created by setup.
pub struct PolynomialMmap {
	params: PolynomialParams,
	moduli: Vec<BigUint>,
	num_index_sets: usize,
}

impl Mmap for PolynomialMmap {
	type Params = PolynomialParams;

	fn setup(
		security_param: usize,
		degree: usize,
		num_index_sets: usize,
		rng: impl Rng,
	) -> Result<Self, Error> {
		ensure!(security_param >= 2, Error::SecurityParamTooSmall);
		ensure!(degree > 0, Error::ZeroDegree);
		ensure!(num_index_sets > 0, Error::ZeroIndexCount);

		// The modulus must absorb products of `degree` elements without the
		// coefficients overflowing their bound.
		let n = security_param.next_power_of_two();
		let bits = (security_param * degree).max(2) as u64;
		let q = prime::sample(bits, rng)?;
		tracing::debug!(n, bits, "sampled coefficient modulus");

		Ok(Self {
			moduli: vec![q.clone()],
			params: PolynomialParams { n, q },
			num_index_sets,
		})
	}

	fn params(&self) -> &PolynomialParams {
		&self.params
	}

	fn num_slots(&self) -> usize {
		1
	}

	fn plaintext_moduli(&self) -> &[BigUint] {
		&self.moduli
	}

	fn index_set_for(&self, position: usize) -> Result<IndexSet, Error> {
		ensure!(
			position < self.num_index_sets,
			Error::IndexOutOfRange {
				position,
				len: self.num_index_sets,
			}
		);
		// Grading positions are not marked in this variant; every encoding
		// is produced under the trivial index set.
		Ok(IndexSet::trivial(self.num_index_sets))
	}

	fn encode(&self, slots: &[BigUint], index_set: &IndexSet) -> Result<PolynomialEncoding, Error> {
		ensure!(
			slots.len() == 1,
			Error::SlotCountMismatch {
				expected: 1,
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

		let mut coeffs = vec![BigUint::zero(); self.params.n];
		coeffs[0] = &slots[0] % &self.params.q;
		Ok(PolynomialEncoding {
			modulus: self.params.q.clone(),
			coeffs,
		})
	}
}
