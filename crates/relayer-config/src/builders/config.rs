//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{Config, Ocr2Config, RelayerConfig, TxmSettings};

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	relayer_id: String,
	chain_id: String,
	contract_address: String,
	txm: TxmSettings,
	cache_poll_period_seconds: u64,
	cache_ttl_seconds: u64,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			relayer_id: "test-relayer".to_string(),
			chain_id: "SN_SEPOLIA".to_string(),
			contract_address: "0x1".to_string(),
			txm: TxmSettings::default(),
			cache_poll_period_seconds: 5,
			cache_ttl_seconds: 60,
		}
	}

	/// Sets the relayer ID.
	pub fn relayer_id(mut self, id: impl Into<String>) -> Self {
		self.relayer_id = id.into();
		self
	}

	/// Sets the chain ID.
	pub fn chain_id(mut self, chain_id: impl Into<String>) -> Self {
		self.chain_id = chain_id.into();
		self
	}

	/// Sets the aggregator contract address.
	pub fn contract_address(mut self, address: impl Into<String>) -> Self {
		self.contract_address = address.into();
		self
	}

	/// Sets the submission queue capacity.
	pub fn queue_capacity(mut self, capacity: usize) -> Self {
		self.txm.queue_capacity = capacity;
		self
	}

	/// Sets the confirmer and retryer periods in seconds.
	pub fn poll_frequency_seconds(mut self, seconds: u64) -> Self {
		self.txm.confirm_frequency_seconds = seconds;
		self.txm.retry_frequency_seconds = seconds;
		self
	}

	/// Sets the cache poll period and TTL in seconds.
	pub fn cache(mut self, poll_period_seconds: u64, ttl_seconds: u64) -> Self {
		self.cache_poll_period_seconds = poll_period_seconds;
		self.cache_ttl_seconds = ttl_seconds;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			relayer: RelayerConfig {
				id: self.relayer_id,
				chain_id: self.chain_id,
			},
			txm: self.txm,
			ocr2: Ocr2Config {
				contract_address: self.contract_address,
				cache_poll_period_seconds: self.cache_poll_period_seconds,
				cache_ttl_seconds: self.cache_ttl_seconds,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_builder_round_trips_through_toml() {
		let config = ConfigBuilder::new()
			.relayer_id("relayer-7")
			.chain_id("SN_MAIN")
			.contract_address("0xabc")
			.queue_capacity(5)
			.poll_frequency_seconds(2)
			.cache(1, 10)
			.build();

		assert_eq!(config.txm().queue_capacity, 5);
		assert_eq!(config.txm().retry_frequency, Duration::from_secs(2));
		assert_eq!(config.ocr2().ttl, Duration::from_secs(10));

		let text = toml::to_string(&config).unwrap();
		let parsed: Config = text.parse().unwrap();
		assert_eq!(parsed, config);
	}

	#[test]
	fn test_default_builder_is_valid() {
		let config = ConfigBuilder::default().build();
		assert!(config.validate().is_ok());
	}
}
