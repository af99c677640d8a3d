// Copyright 2025 Irreducible Inc.

//! Full construct-then-evaluate runs over both scheme variants and both
//! evaluation modes.

use std::path::Path;

use num_bigint::BigUint;
use obf_core::{evaluate, setup, sz_evaluate, Instance, SetupConfig};
use obf_mmap::MmapKind;
use rand::{rngs::StdRng, SeedableRng};

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.try_init();
}

fn config(dir: &Path, kind: MmapKind, boundary_size: usize) -> SetupConfig {
	SetupConfig {
		security_param: 8,
		degree: 4,
		boundary_size,
		num_index_slots: 4,
		dir: dir.to_path_buf(),
		kind,
		num_threads: 4,
		num_cores: 2,
	}
}

fn columns(instance: &Instance, values: &[u64]) -> Vec<Vec<BigUint>> {
	let column: Vec<BigUint> = values.iter().copied().map(BigUint::from).collect();
	vec![column; instance.num_slots()]
}

/// Two layers computing XOR of the two input bits: the first routes a
/// unit into coordinate x0, the second applies identity or swap, and the
/// zero test reads cell 1 of the final 1x2 product.
fn build_xor_program(instance: &Instance) {
	instance
		.encode_layer(0, 1, 2, 0, &columns(instance, &[1, 0]), &columns(instance, &[0, 1]))
		.unwrap();
	instance
		.encode_layer(
			1,
			2,
			2,
			1,
			&columns(instance, &[1, 0, 0, 1]),
			&columns(instance, &[0, 1, 1, 0]),
		)
		.unwrap();
	instance.wait().unwrap();
}

fn assert_xor(dir: &Path, kind: MmapKind) {
	for (input, expected) in [("00", 0), ("01", 1), ("10", 1), ("11", 0)] {
		assert_eq!(
			sz_evaluate(dir, input, 2, kind, 2).unwrap(),
			expected,
			"input {input}"
		);
	}
}

#[test]
fn test_integer_matrix_chain_roundtrip() {
	init_tracing();
	let tmp = tempfile::tempdir().unwrap();
	let dir = tmp.path().join("obf");

	let (instance, moduli) = setup(
		config(&dir, MmapKind::Integer, 0),
		StdRng::seed_from_u64(17),
	)
	.unwrap();
	assert_eq!(moduli.len(), 8);
	build_xor_program(&instance);
	drop(instance);

	assert_xor(&dir, MmapKind::Integer);
}

#[test]
fn test_polynomial_matrix_chain_roundtrip() {
	init_tracing();
	let tmp = tempfile::tempdir().unwrap();
	let dir = tmp.path().join("obf");

	let (instance, moduli) = setup(
		config(&dir, MmapKind::Polynomial, 0),
		StdRng::seed_from_u64(17),
	)
	.unwrap();
	assert_eq!(moduli.len(), 1);
	build_xor_program(&instance);
	drop(instance);

	assert_xor(&dir, MmapKind::Polynomial);
}

#[test]
fn test_integer_boundary_vector_roundtrip() {
	init_tracing();
	let tmp = tempfile::tempdir().unwrap();
	let dir = tmp.path().join("obf");

	let (instance, _moduli) = setup(
		config(&dir, MmapKind::Integer, 2),
		StdRng::seed_from_u64(23),
	)
	.unwrap();

	// s = [1, 0] and t = [0, 1]: the identity branch keeps s . t = 0, the
	// swap branch moves the unit across.
	instance
		.encode_vector("s_enc", 2, &columns(&instance, &[1, 0]))
		.unwrap();
	instance
		.encode_vector("t_enc", 3, &columns(&instance, &[0, 1]))
		.unwrap();
	instance
		.encode_layer(
			0,
			2,
			2,
			0,
			&columns(&instance, &[1, 0, 0, 1]),
			&columns(&instance, &[0, 1, 1, 0]),
		)
		.unwrap();
	instance.wait().unwrap();
	drop(instance);

	assert_eq!(evaluate(&dir, "0", 1, MmapKind::Integer, 2).unwrap(), 0);
	assert_eq!(evaluate(&dir, "1", 1, MmapKind::Integer, 2).unwrap(), 1);
}

#[test]
fn test_polynomial_boundary_vector_roundtrip() {
	init_tracing();
	let tmp = tempfile::tempdir().unwrap();
	let dir = tmp.path().join("obf");

	let (instance, _moduli) = setup(
		config(&dir, MmapKind::Polynomial, 2),
		StdRng::seed_from_u64(23),
	)
	.unwrap();

	instance
		.encode_vector("s_enc", 2, &columns(&instance, &[1, 1]))
		.unwrap();
	instance
		.encode_vector("t_enc", 3, &columns(&instance, &[1, 0]))
		.unwrap();
	// The one-branch annihilates the first coordinate.
	instance
		.encode_layer(
			0,
			2,
			2,
			0,
			&columns(&instance, &[1, 0, 0, 1]),
			&columns(&instance, &[0, 0, 0, 1]),
		)
		.unwrap();
	instance.wait().unwrap();
	drop(instance);

	assert_eq!(evaluate(&dir, "0", 1, MmapKind::Polynomial, 2).unwrap(), 1);
	assert_eq!(evaluate(&dir, "1", 1, MmapKind::Polynomial, 2).unwrap(), 0);
}

#[test]
fn test_setup_rejects_bad_config() {
	let tmp = tempfile::tempdir().unwrap();
	let mut bad = config(&tmp.path().join("obf"), MmapKind::Integer, 0);
	bad.degree = 0;
	assert!(matches!(
		setup(bad, StdRng::seed_from_u64(0)),
		Err(obf_core::Error::ZeroDegree)
	));

	let mut bad = config(&tmp.path().join("obf"), MmapKind::Integer, 0);
	bad.num_index_slots = 0;
	assert!(matches!(
		setup(bad, StdRng::seed_from_u64(0)),
		Err(obf_core::Error::ZeroIndexSlots)
	));
}

#[test]
fn test_evaluation_against_unfinished_directory_fails_cleanly() {
	let tmp = tempfile::tempdir().unwrap();
	let dir = tmp.path().join("obf");
	let (instance, _moduli) = setup(
		config(&dir, MmapKind::Integer, 0),
		StdRng::seed_from_u64(5),
	)
	.unwrap();
	drop(instance);

	// Params exist but no layer was ever encoded.
	let err = sz_evaluate(&dir, "0", 1, MmapKind::Integer, 2).unwrap_err();
	assert!(matches!(err, obf_core::Error::Io { .. }));
}
