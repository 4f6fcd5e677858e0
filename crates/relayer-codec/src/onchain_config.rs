//! Median onchain config codec.
//!
//! The aggregator stores `(version, min, max)`; offchain parties exchange the
//! same triple as three 32-byte two's complement big-endian words.

use crate::CodecError;
use alloy_primitives::{I256, U256};
use relayer_types::{felt_to_signed, Felt, FELT_LENGTH};

/// The only onchain config version the aggregator understands.
pub const ONCHAIN_CONFIG_VERSION: i64 = 1;

/// Encoded length of an onchain config.
pub const ONCHAIN_CONFIG_LENGTH: usize = 3 * FELT_LENGTH;

/// Bounds applied by the aggregator to reported answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnchainConfig {
	pub min: I256,
	pub max: I256,
}

/// Encoder and decoder for the median onchain config.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnchainConfigCodec;

impl OnchainConfigCodec {
	/// Encodes `config` as `version | min | max`.
	pub fn encode(&self, config: &OnchainConfig) -> Vec<u8> {
		self.encode_words(&version_word(), &config.min, &config.max)
	}

	/// Decodes a 96-byte onchain config, rejecting unknown versions and `min > max`.
	pub fn decode(&self, bytes: &[u8]) -> Result<OnchainConfig, CodecError> {
		if bytes.len() != ONCHAIN_CONFIG_LENGTH {
			return Err(CodecError::InvalidOnchainConfig(format!(
				"unexpected length, expected {}, got {}",
				ONCHAIN_CONFIG_LENGTH,
				bytes.len()
			)));
		}
		let version = read_word(&bytes[..FELT_LENGTH]);
		if version != version_word() {
			return Err(CodecError::InvalidOnchainConfig(format!(
				"unexpected version, expected {}, got {}",
				ONCHAIN_CONFIG_VERSION, version
			)));
		}
		let min = read_word(&bytes[FELT_LENGTH..2 * FELT_LENGTH]);
		let max = read_word(&bytes[2 * FELT_LENGTH..]);
		if min > max {
			return Err(CodecError::InvalidOnchainConfig(format!(
				"min ({}) should not be greater than max ({})",
				min, max
			)));
		}
		Ok(OnchainConfig { min, max })
	}

	/// Re-encodes the `(version, min, max)` felts of a `ConfigSet` event.
	///
	/// `min` and `max` are signed felts.
	pub fn encode_from_felts(&self, felts: &[Felt]) -> Result<Vec<u8>, CodecError> {
		let [version, min, max] = felts else {
			return Err(CodecError::InvalidOnchainConfig(format!(
				"expected 3 felts, got {}",
				felts.len()
			)));
		};
		let version = felt_to_signed(version);
		if version != version_word() {
			return Err(CodecError::InvalidOnchainConfig(format!(
				"unexpected version {}",
				version
			)));
		}
		Ok(self.encode_words(&version, &felt_to_signed(min), &felt_to_signed(max)))
	}

	fn encode_words(&self, version: &I256, min: &I256, max: &I256) -> Vec<u8> {
		let mut out = Vec::with_capacity(ONCHAIN_CONFIG_LENGTH);
		for word in [version, min, max] {
			out.extend_from_slice(&word.into_raw().to_be_bytes::<FELT_LENGTH>());
		}
		out
	}
}

fn version_word() -> I256 {
	I256::from_raw(U256::from(ONCHAIN_CONFIG_VERSION as u64))
}

fn read_word(bytes: &[u8]) -> I256 {
	let mut word = [0u8; FELT_LENGTH];
	word.copy_from_slice(bytes);
	I256::from_raw(U256::from_be_bytes(word))
}

#[cfg(test)]
mod tests {
	use super::*;
	use relayer_types::felt_from_signed;

	fn signed(v: i64) -> I256 {
		I256::try_from(v).unwrap()
	}

	#[test]
	fn test_encode_layout() {
		let encoded = OnchainConfigCodec.encode(&OnchainConfig {
			min: signed(-1),
			max: signed(2),
		});
		assert_eq!(encoded.len(), ONCHAIN_CONFIG_LENGTH);
		assert_eq!(encoded[31], 1);
		assert!(encoded[32..64].iter().all(|b| *b == 0xff));
		assert_eq!(encoded[95], 2);
	}

	#[test]
	fn test_decode_validates() {
		let codec = OnchainConfigCodec;
		let config = OnchainConfig {
			min: signed(-10),
			max: signed(1_000_000_000),
		};
		assert_eq!(codec.decode(&codec.encode(&config)).unwrap(), config);

		let inverted = codec.encode(&OnchainConfig {
			min: signed(5),
			max: signed(1),
		});
		assert!(codec.decode(&inverted).is_err());

		let mut wrong_version = codec.encode(&config);
		wrong_version[31] = 2;
		assert!(codec.decode(&wrong_version).is_err());
		assert!(codec.decode(&[0u8; 64]).is_err());
	}

	#[test]
	fn test_encode_from_felts() {
		let codec = OnchainConfigCodec;
		let felts = vec![
			Felt::ONE,
			felt_from_signed(&signed(-10)).unwrap(),
			Felt::from(1_000_000_000u64),
		];
		let encoded = codec.encode_from_felts(&felts).unwrap();
		assert_eq!(
			codec.decode(&encoded).unwrap(),
			OnchainConfig {
				min: signed(-10),
				max: signed(1_000_000_000)
			}
		);
		assert!(codec.encode_from_felts(&felts[..2]).is_err());
	}
}
