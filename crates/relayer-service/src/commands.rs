//! Subcommand implementations.

use alloy_primitives::I256;
use relayer_codec::{CodecError, ConfigDigester, MedianReportCodec};
use relayer_config::{Config, ConfigError};
use relayer_types::{felt_to_hex, without_0x_prefix, ConfigDigest, ContractConfig};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("Config error: {0}")]
	Config(#[from] ConfigError),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Invalid contract config: {0}")]
	Json(#[from] serde_json::Error),
	#[error("Invalid hex: {0}")]
	Hex(#[from] hex::FromHexError),
	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),
}

/// Logs the effective settings of a validated config and returns a summary.
pub fn check_config(config: &Config) -> Result<String, CommandError> {
	let contract = config.contract_address()?;
	let txm = config.txm();
	let cache = config.ocr2();

	tracing::info!(
		relayer_id = %config.relayer.id,
		chain_id = %config.relayer.chain_id,
		contract = %felt_to_hex(&contract),
		"Loaded configuration"
	);
	tracing::info!(
		tx_timeout = ?txm.tx_timeout,
		request_timeout = ?txm.request_timeout,
		confirm_frequency = ?txm.confirm_frequency,
		retry_frequency = ?txm.retry_frequency,
		queue_capacity = txm.queue_capacity,
		fee_margin_percent = txm.fee_margin_percent,
		"Transaction manager settings"
	);
	tracing::info!(
		poll_period = ?cache.poll_period,
		ttl = ?cache.ttl,
		"Contract cache settings"
	);

	Ok(format!(
		"{} on {} for {}",
		config.relayer.id,
		config.relayer.chain_id,
		felt_to_hex(&contract)
	))
}

/// Computes the digest of the JSON contract config at `path` for the
/// configured chain and aggregator.
pub async fn digest(config: &Config, path: &Path) -> Result<ConfigDigest, CommandError> {
	let content = tokio::fs::read_to_string(path).await?;
	let contract_config: ContractConfig = serde_json::from_str(&content)?;

	let digester = ConfigDigester::new(config.relayer.chain_id.clone(), config.contract_address()?);
	tracing::debug!(digester = %digester, "Computing config digest");
	Ok(digester.config_digest(&contract_config)?)
}

/// Decodes the median answer of a hex-encoded report.
pub fn median(report: &str, with_gas_price: bool) -> Result<I256, CommandError> {
	let bytes = hex::decode(without_0x_prefix(report.trim()))?;
	let codec = if with_gas_price {
		MedianReportCodec::with_gas_price()
	} else {
		MedianReportCodec::default()
	};
	Ok(codec.median_from_report(&bytes)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use relayer_codec::ParsedAttributedObservation;
	use relayer_config::ConfigBuilder;
	use std::io::Write;

	const GOERLI_CONFIG: &str = r#"{
		"config_digest": "0000000000000000000000000000000000000000000000000000000000000000",
		"config_count": 1,
		"signers": [
			"0330bd957f7d6dc7b0fc9b1c8d792eb85876ebafc7156f0c94ae4616609b1dde",
			"035b8d28cb168dad13b8f02aeb5b13450aa5e7552916095c72efb98bfcc7fa4f",
			"027048193a8696a4e691e1b3a2e91defc4a14931d3d56d79744bd8c0e5738201",
			"0639ed78f722682dcf52f4956a8fbe9605883ab45d20af096738c86ec0df6847"
		],
		"transmitters": [
			"0x035597ad15679bd62c26d2095bb7fbe9134d7d1420bda9c2a270f72ee2c9c222",
			"0x01d794632b9ce1ff18d6c999932a8ab7521caf1de1c141f198c3ef8965ccaae0",
			"0x03b8d21e7873041f19cbf4ad73b8d85ec4d0eccf1749c2fd107df09573d9af52",
			"0x0758906a2332045ae6b410ee17533d1b302044b03f1862df771db3d154a97c0f"
		],
		"f": 1,
		"onchain_config": "01",
		"offchain_config_version": 2,
		"offchain_config": "01"
	}"#;

	fn goerli() -> Config {
		ConfigBuilder::new()
			.chain_id("SN_GOERLI")
			.contract_address("0x030cd58d6b04baafd0f4bb47652312c79335bd944f9bd8245448cd82e4f04f6b")
			.build()
	}

	#[tokio::test]
	async fn test_digest_from_json() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(GOERLI_CONFIG.as_bytes()).unwrap();

		let digest = digest(&goerli(), file.path()).await.unwrap();
		assert_eq!(
			digest.to_string(),
			"00044d35fedccdab024f3611ff2dda5599dd5ba4da9a4501c10e7556bbf1e3e6"
		);
	}

	#[tokio::test]
	async fn test_digest_rejects_malformed_json() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"{\"config_count\": 1}").unwrap();
		assert!(matches!(
			digest(&goerli(), file.path()).await,
			Err(CommandError::Json(_))
		));
	}

	#[test]
	fn test_median_from_hex() {
		let observations: Vec<_> = [3i64, -1, 8]
			.iter()
			.enumerate()
			.map(|(i, value)| ParsedAttributedObservation {
				timestamp: 1,
				value: I256::try_from(*value).unwrap(),
				juels_per_fee_coin: U256::from(1u64),
				gas_price: U256::from(2u64),
				observer: i as u8,
			})
			.collect();
		let report = MedianReportCodec::with_gas_price()
			.build_report(&observations)
			.unwrap();
		let encoded = format!("0x{}", hex::encode(&report));

		assert_eq!(median(&encoded, true).unwrap(), I256::try_from(3i64).unwrap());
		assert!(matches!(median(&encoded, false), Err(CommandError::Codec(_))));
		assert!(matches!(median("0xzz", false), Err(CommandError::Hex(_))));
	}

	#[test]
	fn test_check_config_summary() {
		let summary = check_config(&goerli()).unwrap();
		assert!(summary.starts_with("test-relayer on SN_GOERLI for 0x030cd58d"));
	}
}
