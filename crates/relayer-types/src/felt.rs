//! Field element helpers.
//!
//! Starknet exchanges all data as felts, unsigned integers modulo the Stark
//! prime. This module re-exports the felt type and provides the conversions the
//! relayer needs between felts, fixed-width integers and byte buffers.

use alloy_primitives::{I256, U256};
use sha3::{Digest, Keccak256};
use thiserror::Error;

pub use starknet_types_core::felt::Felt;

/// Width in bytes of a felt in its big-endian byte form.
pub const FELT_LENGTH: usize = 32;

/// Largest number of raw bytes that always fits below the field modulus.
pub const CHUNK_SIZE: usize = 31;

/// Errors that can occur when converting to or from felts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeltError {
	/// Error that occurs when a hex string cannot be parsed.
	#[error("Invalid hex: {0}")]
	InvalidHex(String),
	/// Error that occurs when a value does not fit the target width.
	#[error("Value out of range: {0}")]
	OutOfRange(String),
}

/// Parses a hex string, with or without `0x` prefix, into a felt.
///
/// Values at or above the field modulus are rejected rather than reduced.
pub fn felt_from_hex(value: &str) -> Result<Felt, FeltError> {
	let digits = crate::without_0x_prefix(value);
	if digits.is_empty() {
		return Err(FeltError::InvalidHex(value.to_string()));
	}
	let digits = if digits.len() % 2 == 1 {
		format!("0{}", digits)
	} else {
		digits.to_string()
	};
	let bytes = hex::decode(&digits).map_err(|e| FeltError::InvalidHex(e.to_string()))?;
	felt_from_bytes(&bytes)
}

/// Converts a big-endian byte slice of at most 32 bytes into a felt.
///
/// Fails when the slice is wider than a felt or encodes a value at or above
/// the field modulus.
pub fn felt_from_bytes(bytes: &[u8]) -> Result<Felt, FeltError> {
	if bytes.len() > FELT_LENGTH {
		return Err(FeltError::OutOfRange(format!(
			"{} bytes exceed felt width",
			bytes.len()
		)));
	}
	let padded = pad_bytes(bytes, FELT_LENGTH);
	let mut word = [0u8; FELT_LENGTH];
	word.copy_from_slice(&padded);
	let felt = Felt::from_bytes_be(&word);
	if felt.to_bytes_be() != word {
		return Err(FeltError::OutOfRange(format!(
			"0x{} is not below the field modulus",
			hex::encode(word)
		)));
	}
	Ok(felt)
}

/// Formats a felt as a `0x`-prefixed, zero-padded 64 character hex string.
pub fn felt_to_hex(felt: &Felt) -> String {
	format!("0x{}", hex::encode(felt.to_bytes_be()))
}

/// Compares two felts by their canonical integer value.
pub fn felt_cmp(a: &Felt, b: &Felt) -> std::cmp::Ordering {
	a.to_bytes_be().cmp(&b.to_bytes_be())
}

/// Interprets a felt as a signed integer.
///
/// Values in the upper half of the field are negative: a felt is negative when
/// it is greater than its own additive inverse, and its magnitude is then the
/// inverse.
pub fn felt_to_signed(felt: &Felt) -> I256 {
	let negated = -*felt;
	if felt_cmp(felt, &negated) == std::cmp::Ordering::Greater {
		let magnitude = U256::from_be_bytes(negated.to_bytes_be());
		-I256::from_raw(magnitude)
	} else {
		I256::from_raw(U256::from_be_bytes(felt.to_bytes_be()))
	}
}

/// Encodes a signed integer as a felt, mapping negatives to `p - |value|`.
pub fn felt_from_signed(value: &I256) -> Result<Felt, FeltError> {
	let magnitude = u256_to_felt(&value.unsigned_abs())?;
	if value.is_negative() {
		Ok(-magnitude)
	} else {
		Ok(magnitude)
	}
}

/// Converts a felt into a 256-bit unsigned integer.
pub fn felt_to_u256(felt: &Felt) -> U256 {
	U256::from_be_bytes(felt.to_bytes_be())
}

/// Converts a 256-bit unsigned integer into a felt, failing above the modulus.
pub fn u256_to_felt(value: &U256) -> Result<Felt, FeltError> {
	felt_from_bytes(&value.to_be_bytes::<FELT_LENGTH>())
}

/// Converts a felt into a `u64`, failing when it does not fit.
pub fn felt_to_u64(felt: &Felt) -> Result<u64, FeltError> {
	let bytes = felt.to_bytes_be();
	if bytes[..FELT_LENGTH - 8].iter().any(|b| *b != 0) {
		return Err(FeltError::OutOfRange(format!(
			"{} does not fit in u64",
			felt_to_hex(felt)
		)));
	}
	let mut word = [0u8; 8];
	word.copy_from_slice(&bytes[FELT_LENGTH - 8..]);
	Ok(u64::from_be_bytes(word))
}

/// Left-pads `bytes` with zeros up to `len`. Longer inputs are returned as is.
pub fn pad_bytes(bytes: &[u8], len: usize) -> Vec<u8> {
	if bytes.len() >= len {
		return bytes.to_vec();
	}
	let mut padded = vec![0u8; len - bytes.len()];
	padded.extend_from_slice(bytes);
	padded
}

/// Forces a 32-byte word into a felt by dropping its most significant byte.
pub fn ensure_felt(word: &[u8; FELT_LENGTH]) -> Felt {
	let mut truncated = *word;
	truncated[0] = 0;
	Felt::from_bytes_be(&truncated)
}

/// Computes the Starknet selector of an entry point or event name.
///
/// The selector is the keccak256 digest of the name truncated to 250 bits.
pub fn selector_from_name(name: &str) -> Felt {
	let digest = Keccak256::digest(name.as_bytes());
	let mut word = [0u8; FELT_LENGTH];
	word.copy_from_slice(&digest);
	word[0] &= 0x03;
	Felt::from_bytes_be(&word)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signed(v: i64) -> I256 {
		I256::try_from(v).unwrap()
	}

	#[test]
	fn test_signed_round_trip() {
		for v in [0i64, 1, -1, 99, -10, 1_000_000_000, i64::MIN, i64::MAX] {
			let felt = felt_from_signed(&signed(v)).unwrap();
			assert_eq!(felt_to_signed(&felt), signed(v));
		}
	}

	#[test]
	fn test_negative_felt_is_upper_half() {
		let minus_ten =
			felt_from_hex("0x800000000000010fffffffffffffffffffffffffffffffffffffffffffffff7").unwrap();
		assert_eq!(felt_to_signed(&minus_ten), signed(-10));
		assert_eq!(felt_from_signed(&signed(-10)).unwrap(), minus_ten);
	}

	#[test]
	fn test_felt_from_hex_rejects_modulus() {
		let p = "0x0800000000000011000000000000000000000000000000000000000000000001";
		assert!(matches!(felt_from_hex(p), Err(FeltError::OutOfRange(_))));
		assert!(felt_from_hex("0x").is_err());
		assert!(felt_from_hex("0xzz").is_err());
		assert_eq!(felt_from_hex("0x63").unwrap(), Felt::from(99u64));
		assert_eq!(felt_from_hex("abc").unwrap(), Felt::from(0xabcu64));
	}

	#[test]
	fn test_felt_to_u64() {
		assert_eq!(felt_to_u64(&Felt::from(42u64)).unwrap(), 42);
		let big = felt_from_hex("0x10000000000000000").unwrap();
		assert!(felt_to_u64(&big).is_err());
	}

	#[test]
	fn test_pad_bytes() {
		assert_eq!(pad_bytes(&[1, 2], 4), vec![0, 0, 1, 2]);
		assert_eq!(pad_bytes(&[1, 2, 3], 2), vec![1, 2, 3]);
	}

	#[test]
	fn test_ensure_felt_drops_top_byte() {
		let word = [0xffu8; FELT_LENGTH];
		let felt = ensure_felt(&word);
		let bytes = felt.to_bytes_be();
		assert_eq!(bytes[0], 0);
		assert!(bytes[1..].iter().all(|b| *b == 0xff));
	}

	#[test]
	fn test_selector_from_name() {
		assert_eq!(
			felt_to_hex(&selector_from_name("transfer")),
			"0x0083afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e"
		);
		assert!(selector_from_name("ConfigSet").to_bytes_be()[0] <= 0x03);
	}
}
