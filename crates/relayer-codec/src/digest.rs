//! Config digest computation.
//!
//! The aggregator contract and the offchain oracles must derive the same digest
//! for a configuration. Both hash the configuration fields with Pedersen over a
//! felt array and stamp the result with a two-byte prefix identifying the
//! Starknet adapter.

use crate::felt::encode_felts;
use crate::onchain_config::ONCHAIN_CONFIG_LENGTH;
use crate::CodecError;
use relayer_types::{
	felt_from_bytes, felt_from_hex, felt_to_hex, ConfigDigest, ContractConfig, Felt, CHUNK_SIZE,
	FELT_LENGTH,
};
use starknet_types_core::hash::{Pedersen, StarkHash};

/// Prefix stamped on every digest produced for Starknet aggregators.
pub const CONFIG_DIGEST_PREFIX: u16 = 0x0004;

/// Computes config digests for one aggregator on one chain.
#[derive(Debug, Clone)]
pub struct ConfigDigester {
	chain_id: String,
	contract_address: Felt,
}

impl ConfigDigester {
	pub fn new(chain_id: impl Into<String>, contract_address: Felt) -> Self {
		Self {
			chain_id: chain_id.into(),
			contract_address,
		}
	}

	/// Returns the prefix this digester stamps on digests.
	pub fn prefix(&self) -> u16 {
		CONFIG_DIGEST_PREFIX
	}

	/// Computes the digest of `config`.
	///
	/// The hashed array is `chain_id, contract_address, config_count,
	/// oracles_len, (signer, transmitter)..., f, onchain_config,
	/// offchain_config_version, offchain_config_len, offchain_config...` where
	/// the offchain config is felt-encoded.
	pub fn config_digest(&self, config: &ContractConfig) -> Result<ConfigDigest, CodecError> {
		let chain_id = self.chain_id.as_bytes();
		if chain_id.len() > CHUNK_SIZE {
			return Err(CodecError::InvalidValue(format!(
				"chainID exceeds max length: {} bytes",
				chain_id.len()
			)));
		}

		if config.signers.len() != config.transmitters.len() {
			return Err(CodecError::InvalidValue(format!(
				"must have equal number of signers and transmitters: {} != {}",
				config.signers.len(),
				config.transmitters.len()
			)));
		}

		let offchain_config = encode_felts(&config.offchain_config);

		let mut data = Vec::with_capacity(8 + 2 * config.signers.len() + offchain_config.len());
		data.push(felt_from_bytes(chain_id)?);
		data.push(self.contract_address);
		data.push(Felt::from(config.config_count));
		data.push(Felt::from(config.signers.len() as u64));
		for (signer, transmitter) in config.signers.iter().zip(&config.transmitters) {
			data.push(felt_from_bytes(signer)?);
			data.push(felt_from_hex(transmitter)?);
		}
		data.push(Felt::from(config.f as u64));
		data.push(onchain_config_felt(&config.onchain_config)?);
		data.push(Felt::from(config.offchain_config_version));
		data.push(Felt::from(offchain_config.len() as u64));
		data.extend(offchain_config);

		let mut digest = Pedersen::hash_array(&data).to_bytes_be();
		digest[..2].copy_from_slice(&CONFIG_DIGEST_PREFIX.to_be_bytes());
		Ok(ConfigDigest(digest))
	}
}

/// Reduces an onchain config to the single felt the aggregator hashes.
///
/// A median config contributes its version word; shorter configs contribute
/// their big-endian value.
fn onchain_config_felt(onchain_config: &[u8]) -> Result<Felt, CodecError> {
	match onchain_config.len() {
		ONCHAIN_CONFIG_LENGTH => Ok(felt_from_bytes(&onchain_config[..FELT_LENGTH])?),
		n if n <= FELT_LENGTH => Ok(felt_from_bytes(onchain_config)?),
		n => Err(CodecError::InvalidOnchainConfig(format!(
			"cannot hash {} byte onchain config",
			n
		))),
	}
}

impl std::fmt::Display for ConfigDigester {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}@{}", felt_to_hex(&self.contract_address), self.chain_id)
	}
}
