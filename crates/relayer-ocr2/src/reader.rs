//! Typed reads of the OCR2 aggregator contract.

use crate::{ChainReader, ReaderError};
use chrono::{DateTime, Utc};
use relayer_codec::{parse_config_set_event, unpack_epoch_and_round, CONFIG_SET_EVENT};
use relayer_types::{
	felt_to_hex, felt_to_signed, felt_to_u64, selector_from_name, ConfigDigest, ContractConfig,
	ContractConfigDetails, Felt, TransmissionDetails,
};
use std::sync::Arc;

/// Reads configuration and transmission state of one aggregator.
pub struct ContractReader {
	reader: Arc<dyn ChainReader>,
	address: Felt,
}

impl ContractReader {
	pub fn new(reader: Arc<dyn ChainReader>, address: Felt) -> Self {
		Self { reader, address }
	}

	pub fn address(&self) -> &Felt {
		&self.address
	}

	/// Returns the block and digest of the latest configuration.
	pub async fn latest_config_details(&self) -> Result<ContractConfigDetails, ReaderError> {
		let result = self.call("latest_config_details").await?;
		// config_count, block_number, config_digest
		if result.len() != 3 {
			return Err(ReaderError::UnexpectedResult(format!(
				"latest_config_details returned {} felts, expected 3",
				result.len()
			)));
		}

		let block = felt_to_u64(&result[1])
			.map_err(|e| ReaderError::UnexpectedResult(format!("block number: {}", e)))?;
		Ok(ContractConfigDetails {
			block,
			digest: ConfigDigest::from(result[2]),
		})
	}

	/// Loads the configuration set in `block` from its ConfigSet event.
	pub async fn latest_config(&self, block: u64) -> Result<ContractConfig, ReaderError> {
		let key = selector_from_name(CONFIG_SET_EVENT);
		let events = self.reader.events(&self.address, block, &key).await?;
		let data = events.first().ok_or(ReaderError::MissingEvent {
			event: CONFIG_SET_EVENT,
			block,
		})?;
		Ok(parse_config_set_event(data)?)
	}

	/// Returns the latest transmission recorded on the contract.
	pub async fn latest_transmission_details(&self) -> Result<TransmissionDetails, ReaderError> {
		let result = self.call("latest_transmission_details").await?;
		// config_digest, epoch_and_round, latest_answer, latest_timestamp
		if result.len() < 4 {
			return Err(ReaderError::UnexpectedResult(format!(
				"latest_transmission_details returned {} felts, expected 4",
				result.len()
			)));
		}

		let (epoch, round) = unpack_epoch_and_round(&result[1]);
		let timestamp = felt_to_u64(&result[3])
			.ok()
			.and_then(|secs| i64::try_from(secs).ok())
			.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
			.ok_or_else(|| {
				ReaderError::UnexpectedResult(format!(
					"invalid timestamp {}",
					felt_to_hex(&result[3])
				))
			})?;

		Ok(TransmissionDetails {
			digest: ConfigDigest::from(result[0]),
			epoch,
			round,
			latest_answer: felt_to_signed(&result[2]),
			latest_timestamp: timestamp,
		})
	}

	pub async fn latest_block_height(&self) -> Result<u64, ReaderError> {
		self.reader.latest_block_height().await
	}

	async fn call(&self, entry_point: &str) -> Result<Vec<Felt>, ReaderError> {
		self.reader
			.call_contract(&self.address, &selector_from_name(entry_point), &[])
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::I256;
	use async_trait::async_trait;
	use relayer_codec::pack_epoch_and_round;

	struct StaticReader {
		result: Vec<Felt>,
		events: Vec<Vec<Felt>>,
	}

	#[async_trait]
	impl ChainReader for StaticReader {
		async fn call_contract(
			&self,
			_address: &Felt,
			_selector: &Felt,
			_calldata: &[Felt],
		) -> Result<Vec<Felt>, ReaderError> {
			Ok(self.result.clone())
		}

		async fn events(
			&self,
			_address: &Felt,
			_block: u64,
			_key: &Felt,
		) -> Result<Vec<Vec<Felt>>, ReaderError> {
			Ok(self.events.clone())
		}

		async fn latest_block_height(&self) -> Result<u64, ReaderError> {
			Ok(1234)
		}
	}

	fn reader(result: Vec<Felt>, events: Vec<Vec<Felt>>) -> ContractReader {
		ContractReader::new(Arc::new(StaticReader { result, events }), Felt::from(0xaaau64))
	}

	#[tokio::test]
	async fn test_latest_config_details() {
		let reader = reader(
			vec![Felt::from(3u64), Felt::from(77u64), Felt::from(0xabcdu64)],
			vec![],
		);
		let details = reader.latest_config_details().await.unwrap();
		assert_eq!(details.block, 77);
		assert_eq!(details.digest, ConfigDigest::from(Felt::from(0xabcdu64)));
		assert_eq!(reader.latest_block_height().await.unwrap(), 1234);
	}

	#[tokio::test]
	async fn test_latest_config_details_rejects_bad_shape() {
		let reader = reader(vec![Felt::ONE], vec![]);
		assert!(matches!(
			reader.latest_config_details().await,
			Err(ReaderError::UnexpectedResult(_))
		));
	}

	#[tokio::test]
	async fn test_latest_transmission_details() {
		let reader = reader(
			vec![
				Felt::from(0x42u64),
				pack_epoch_and_round(9, 3),
				-Felt::from(5u64),
				Felt::from(1_700_000_000u64),
			],
			vec![],
		);
		let details = reader.latest_transmission_details().await.unwrap();
		assert_eq!(details.epoch, 9);
		assert_eq!(details.round, 3);
		assert_eq!(details.latest_answer, I256::try_from(-5i64).unwrap());
		assert_eq!(details.latest_timestamp.timestamp(), 1_700_000_000);
	}

	#[tokio::test]
	async fn test_latest_config_requires_event() {
		let reader = reader(vec![], vec![]);
		assert!(matches!(
			reader.latest_config(10).await,
			Err(ReaderError::MissingEvent { block: 10, .. })
		));

		let reader = self::reader(vec![], vec![vec![Felt::ONE]]);
		assert!(matches!(
			reader.latest_config(10).await,
			Err(ReaderError::Codec(_))
		));
	}
}
