//! Configuration module for the Starknet OCR2 relayer.
//!
//! This module provides structures and utilities for managing relayer configuration.
//! It supports loading configuration from TOML files with `${VAR}` and
//! `${VAR:-default}` environment variable interpolation, and validates that all
//! values are usable before any component is built from them.

pub mod builders {
	pub mod config;
}

pub use builders::config::ConfigBuilder;

use regex::Regex;
use relayer_ocr2::CacheConfig;
use relayer_txm::TxmConfig;
use relayer_types::{felt_from_hex, Felt, CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this relayer instance and the chain it serves.
	pub relayer: RelayerConfig,
	/// Transaction manager settings.
	#[serde(default)]
	pub txm: TxmSettings,
	/// Aggregator contract settings.
	pub ocr2: Ocr2Config,
}

/// Identity of the relayer instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Unique identifier for this relayer instance.
	pub id: String,
	/// Starknet chain id, such as `SN_MAIN`. Hashed into config digests.
	pub chain_id: String,
}

/// Transaction manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TxmSettings {
	#[serde(default = "default_tx_timeout_seconds")]
	pub tx_timeout_seconds: u64,
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
	#[serde(default = "default_confirm_frequency_seconds")]
	pub confirm_frequency_seconds: u64,
	#[serde(default = "default_retry_frequency_seconds")]
	pub retry_frequency_seconds: u64,
	/// Capacity of the submission queue.
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
	/// Estimated fees are multiplied by this percentage.
	#[serde(default = "default_fee_margin_percent")]
	pub fee_margin_percent: u64,
}

impl Default for TxmSettings {
	fn default() -> Self {
		Self {
			tx_timeout_seconds: default_tx_timeout_seconds(),
			request_timeout_seconds: default_request_timeout_seconds(),
			confirm_frequency_seconds: default_confirm_frequency_seconds(),
			retry_frequency_seconds: default_retry_frequency_seconds(),
			queue_capacity: default_queue_capacity(),
			fee_margin_percent: default_fee_margin_percent(),
		}
	}
}

fn default_tx_timeout_seconds() -> u64 {
	60
}

fn default_request_timeout_seconds() -> u64 {
	10
}

fn default_confirm_frequency_seconds() -> u64 {
	5
}

fn default_retry_frequency_seconds() -> u64 {
	5
}

fn default_queue_capacity() -> usize {
	1000
}

/// Returns the default fee margin, 15% above the estimate.
fn default_fee_margin_percent() -> u64 {
	115
}

/// Aggregator contract settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ocr2Config {
	/// Address of the OCR2 aggregator contract, as hex.
	pub contract_address: String,
	#[serde(default = "default_cache_poll_period_seconds")]
	pub cache_poll_period_seconds: u64,
	/// Maximum age of cached contract state before reads fail.
	#[serde(default = "default_cache_ttl_seconds")]
	pub cache_ttl_seconds: u64,
}

fn default_cache_poll_period_seconds() -> u64 {
	5
}

fn default_cache_ttl_seconds() -> u64 {
	60
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match (std::env::var(var_name.as_str()), default_value) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			}
		};
		replacements.push((full_match.range(), value));
	}

	// Apply replacements in reverse order to maintain positions
	let mut result = input.to_string();
	for (range, value) in replacements.into_iter().rev() {
		result.replace_range(range, &value);
	}
	Ok(result)
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all values are usable.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.is_empty() {
			return Err(ConfigError::Validation("Relayer ID cannot be empty".into()));
		}
		if self.relayer.chain_id.is_empty() {
			return Err(ConfigError::Validation("Chain ID cannot be empty".into()));
		}
		if self.relayer.chain_id.len() > CHUNK_SIZE {
			return Err(ConfigError::Validation(format!(
				"Chain ID '{}' exceeds {} bytes",
				self.relayer.chain_id, CHUNK_SIZE
			)));
		}

		let txm = &self.txm;
		for (name, value) in [
			("tx_timeout_seconds", txm.tx_timeout_seconds),
			("request_timeout_seconds", txm.request_timeout_seconds),
			("confirm_frequency_seconds", txm.confirm_frequency_seconds),
			("retry_frequency_seconds", txm.retry_frequency_seconds),
			("cache_poll_period_seconds", self.ocr2.cache_poll_period_seconds),
			("cache_ttl_seconds", self.ocr2.cache_ttl_seconds),
		] {
			if value == 0 {
				return Err(ConfigError::Validation(format!("{} must be greater than 0", name)));
			}
		}
		if txm.queue_capacity == 0 {
			return Err(ConfigError::Validation(
				"queue_capacity must be greater than 0".into(),
			));
		}
		if txm.fee_margin_percent < 100 {
			return Err(ConfigError::Validation(format!(
				"fee_margin_percent must be at least 100, got {}",
				txm.fee_margin_percent
			)));
		}

		if self.ocr2.cache_ttl_seconds < self.ocr2.cache_poll_period_seconds {
			return Err(ConfigError::Validation(format!(
				"cache_ttl_seconds ({}) must not be shorter than cache_poll_period_seconds ({})",
				self.ocr2.cache_ttl_seconds, self.ocr2.cache_poll_period_seconds
			)));
		}
		self.contract_address()?;

		Ok(())
	}

	/// Returns the aggregator contract address.
	pub fn contract_address(&self) -> Result<Felt, ConfigError> {
		felt_from_hex(&self.ocr2.contract_address).map_err(|e| {
			ConfigError::Validation(format!(
				"Invalid contract address '{}': {}",
				self.ocr2.contract_address, e
			))
		})
	}

	/// Returns the transaction manager settings.
	pub fn txm(&self) -> TxmConfig {
		TxmConfig {
			tx_timeout: Duration::from_secs(self.txm.tx_timeout_seconds),
			request_timeout: Duration::from_secs(self.txm.request_timeout_seconds),
			confirm_frequency: Duration::from_secs(self.txm.confirm_frequency_seconds),
			retry_frequency: Duration::from_secs(self.txm.retry_frequency_seconds),
			queue_capacity: self.txm.queue_capacity,
			fee_margin_percent: self.txm.fee_margin_percent,
		}
	}

	/// Returns the contract cache settings.
	pub fn ocr2(&self) -> CacheConfig {
		CacheConfig {
			poll_period: Duration::from_secs(self.ocr2.cache_poll_period_seconds),
			ttl: Duration::from_secs(self.ocr2.cache_ttl_seconds),
		}
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
