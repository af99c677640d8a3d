// Copyright 2025 Irreducible Inc.

//! Byte-level serialization for artifact files.
//!
//! Every persisted record is assembled in an in-memory buffer through
//! [`SerializeBytes`] and flushed to a file in one write, so the on-disk
//! layout is independent of worker count and completion order. The scalar
//! codec matches GMP's `mpz_out_raw` shape for non-negative values: a
//! 4-byte big-endian byte-length prefix followed by big-endian magnitude
//! bytes, with zero encoded as a bare zero length.

use bytes::{Buf, BufMut};
use num_bigint::BigUint;
use num_traits::Zero;

#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
	#[error("write buffer is full")]
	WriteBufferFull,
	#[error("not enough data in read buffer to deserialize")]
	NotEnoughBytes,
	#[error("unknown enum variant index {name}::{index}")]
	UnknownEnumVariant { name: &'static str, index: u8 },
	#[error("length prefix {len} exceeds addressable size")]
	LengthOverflow { len: u64 },
}

/// Represents a type that can be serialized to a byte buffer.
pub trait SerializeBytes {
	fn serialize(&self, write_buf: impl BufMut) -> Result<(), Error>;
}

/// Represents a type that can be deserialized from a byte buffer.
///
/// Each implementation must be self-delimiting: it consumes exactly the
/// bytes its `serialize` produced, so encodings can be concatenated into
/// flat vector files with no per-file framing.
pub trait DeserializeBytes {
	fn deserialize(read_buf: impl Buf) -> Result<Self, Error>
	where
		Self: Sized;
}

/// Writes a 4-byte big-endian length prefix.
pub fn write_len(mut write_buf: impl BufMut, len: usize) -> Result<(), Error> {
	let len = u32::try_from(len).map_err(|_| Error::LengthOverflow { len: len as u64 })?;
	if write_buf.remaining_mut() < 4 {
		return Err(Error::WriteBufferFull);
	}
	write_buf.put_u32(len);
	Ok(())
}

/// Reads a 4-byte big-endian length prefix.
pub fn read_len(mut read_buf: impl Buf) -> Result<usize, Error> {
	if read_buf.remaining() < 4 {
		return Err(Error::NotEnoughBytes);
	}
	let len = read_buf.get_u32();
	usize::try_from(len).map_err(|_| Error::LengthOverflow { len: len as u64 })
}

impl SerializeBytes for BigUint {
	fn serialize(&self, mut write_buf: impl BufMut) -> Result<(), Error> {
		if self.is_zero() {
			return write_len(write_buf, 0);
		}
		let bytes = self.to_bytes_be();
		write_len(&mut write_buf, bytes.len())?;
		if write_buf.remaining_mut() < bytes.len() {
			return Err(Error::WriteBufferFull);
		}
		write_buf.put_slice(&bytes);
		Ok(())
	}
}

impl DeserializeBytes for BigUint {
	fn deserialize(mut read_buf: impl Buf) -> Result<Self, Error> {
		let len = read_len(&mut read_buf)?;
		if len == 0 {
			return Ok(Self::zero());
		}
		if read_buf.remaining() < len {
			return Err(Error::NotEnoughBytes);
		}
		let mut bytes = vec![0u8; len];
		read_buf.copy_to_slice(&mut bytes);
		Ok(Self::from_bytes_be(&bytes))
	}
}
