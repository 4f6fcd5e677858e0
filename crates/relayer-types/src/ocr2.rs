//! OCR2 configuration and transmission records.
//!
//! These are the decoded forms of the aggregator contract's `ConfigSet` event and
//! `latest_transmission_details` view, shared by the codec, the contract reader
//! and the configuration cache.

use crate::felt::{Felt, FELT_LENGTH};
use crate::utils::without_0x_prefix;
use alloy_primitives::I256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte fingerprint of an oracle network configuration.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConfigDigest(pub [u8; FELT_LENGTH]);

impl ConfigDigest {
	/// Returns the protocol prefix stored in the two leading bytes.
	pub fn prefix(&self) -> u16 {
		u16::from_be_bytes([self.0[0], self.0[1]])
	}

	/// Converts the digest into a felt.
	///
	/// Digests carry a small prefix in their leading bytes so they always fit.
	pub fn to_felt(&self) -> Felt {
		Felt::from_bytes_be(&self.0)
	}

	/// Returns the raw digest bytes.
	pub fn as_bytes(&self) -> &[u8; FELT_LENGTH] {
		&self.0
	}
}

impl From<Felt> for ConfigDigest {
	fn from(felt: Felt) -> Self {
		Self(felt.to_bytes_be())
	}
}

impl fmt::Display for ConfigDigest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

impl fmt::Debug for ConfigDigest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ConfigDigest({})", hex::encode(self.0))
	}
}

impl FromStr for ConfigDigest {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = hex::decode(without_0x_prefix(s)).map_err(|e| e.to_string())?;
		let word: [u8; FELT_LENGTH] = bytes
			.try_into()
			.map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))?;
		Ok(Self(word))
	}
}

impl Serialize for ConfigDigest {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for ConfigDigest {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// An oracle network configuration as set on the aggregator contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
	/// Fingerprint of this configuration.
	pub config_digest: ConfigDigest,
	/// Number of configurations set on the contract so far.
	pub config_count: u64,
	/// Oracle signing keys, each 32 bytes.
	#[serde(with = "hex_bytes_vec")]
	pub signers: Vec<Vec<u8>>,
	/// Oracle transmitter accounts, as `0x`-prefixed hex.
	pub transmitters: Vec<String>,
	/// Fault tolerance threshold.
	pub f: u8,
	/// Median onchain config bytes.
	#[serde(with = "hex_bytes")]
	pub onchain_config: Vec<u8>,
	/// Version of the offchain config encoding.
	pub offchain_config_version: u64,
	/// Offchain config bytes.
	#[serde(with = "hex_bytes")]
	pub offchain_config: Vec<u8>,
}

/// Cheap summary of the latest configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractConfigDetails {
	/// Block in which the configuration was set.
	pub block: u64,
	/// Digest of the configuration.
	pub digest: ConfigDigest,
}

/// Latest transmission recorded on the aggregator contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionDetails {
	/// Digest of the configuration the report was produced under.
	pub digest: ConfigDigest,
	/// Epoch of the report.
	pub epoch: u32,
	/// Round within the epoch.
	pub round: u8,
	/// Median answer of the report.
	pub latest_answer: I256,
	/// Observation timestamp of the report.
	pub latest_timestamp: DateTime<Utc>,
}

mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&hex::encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(crate::without_0x_prefix(&s)).map_err(serde::de::Error::custom)
	}
}

mod hex_bytes_vec {
	use serde::ser::SerializeSeq;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(Some(items.len()))?;
		for item in items {
			seq.serialize_element(&hex::encode(item))?;
		}
		seq.end()
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Vec<Vec<u8>>, D::Error> {
		let items = Vec::<String>::deserialize(deserializer)?;
		items
			.iter()
			.map(|s| hex::decode(crate::without_0x_prefix(s)).map_err(serde::de::Error::custom))
			.collect()
	}
}
