// Copyright 2025 Irreducible Inc.

//! Probabilistic prime sampling over [`BigUint`].

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

use crate::error::Error;

const MILLER_RABIN_ROUNDS: usize = 25;

const SMALL_PRIMES: [u32; 24] = [
	3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Samples a prime of exactly `bits` bits.
pub fn sample(bits: u64, mut rng: impl Rng) -> Result<BigUint, Error> {
	if bits < 2 {
		return Err(Error::PrimeSampling { bits });
	}
	// Candidate density ~1/ln(2^bits); this bound makes exhaustion
	// astronomically unlikely for any bits ≥ 2.
	let attempts = 128 * bits.max(8) as usize;
	for _ in 0..attempts {
		let mut candidate = rng.gen_biguint(bits);
		candidate.set_bit(bits - 1, true);
		candidate.set_bit(0, true);
		if is_probable_prime(&candidate, MILLER_RABIN_ROUNDS, &mut rng) {
			return Ok(candidate);
		}
	}
	Err(Error::PrimeSampling { bits })
}

/// Miller–Rabin with `rounds` random bases.
pub fn is_probable_prime(n: &BigUint, rounds: usize, mut rng: impl Rng) -> bool {
	let two = BigUint::from(2u8);
	let three = BigUint::from(3u8);
	if *n < two {
		return false;
	}
	if *n == two || *n == three {
		return true;
	}
	if n.is_even() {
		return false;
	}
	for p in SMALL_PRIMES {
		let p = BigUint::from(p);
		if *n == p {
			return true;
		}
		if (n % &p).is_zero() {
			return false;
		}
	}

	// n - 1 = d * 2^s with d odd
	let n_minus_one = n - 1u8;
	let s = n_minus_one.trailing_zeros().expect("n > 1 and odd");
	let d = &n_minus_one >> s;

	'witness: for _ in 0..rounds {
		let base = rng.gen_biguint_range(&two, &n_minus_one);
		let mut x = base.modpow(&d, n);
		if x.is_one() || x == n_minus_one {
			continue;
		}
		for _ in 0..s - 1 {
			x = x.modpow(&two, n);
			if x == n_minus_one {
				continue 'witness;
			}
		}
		return false;
	}
	true
}

/// Inverse of `a` modulo `m`, when `gcd(a, m) == 1`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
	let a = BigInt::from_biguint(Sign::Plus, a.clone());
	let m = BigInt::from_biguint(Sign::Plus, m.clone());
	let ext = a.extended_gcd(&m);
	if !ext.gcd.is_one() {
		return None;
	}
	let mut x = ext.x % &m;
	if x.sign() == Sign::Minus {
		x += &m;
	}
	x.to_biguint()
}
