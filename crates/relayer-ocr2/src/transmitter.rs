//! Submission of signed OCR2 reports.

use crate::cache::{CacheError, ContractConfigCache};
use relayer_codec::{pack_epoch_and_round, split_report, CodecError};
use relayer_txm::{TransactionManager, TxmError};
use relayer_types::{
	ensure_felt, felt_from_bytes, felt_to_hex, selector_from_name, truncate_id, ConfigDigest, Felt,
	Transaction, FELT_LENGTH,
};
use std::sync::Arc;
use thiserror::Error;

/// Length of an attributed onchain signature: public key, r and s.
const SIGNATURE_LENGTH: usize = 3 * FELT_LENGTH;

#[derive(Debug, Error)]
pub enum TransmitterError {
	#[error("invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),
	#[error("Txm error: {0}")]
	Txm(#[from] TxmError),
}

/// Context a report was produced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
	pub config_digest: ConfigDigest,
	pub epoch: u32,
	pub round: u8,
	pub extra_hash: [u8; FELT_LENGTH],
}

/// Submits reports to one aggregator from one transmitter account.
pub struct ContractTransmitter {
	txm: Arc<TransactionManager>,
	contract_address: Felt,
	sender_address: Felt,
}

impl ContractTransmitter {
	pub fn new(txm: Arc<TransactionManager>, contract_address: Felt, sender_address: Felt) -> Self {
		Self {
			txm,
			contract_address,
			sender_address,
		}
	}

	/// Queues a `transmit` call carrying `report` and its signatures.
	///
	/// Returns the id the transaction manager tracks the call under.
	pub async fn transmit(
		&self,
		context: &ReportContext,
		report: &[u8],
		signatures: &[Vec<u8>],
	) -> Result<String, TransmitterError> {
		let calldata = transmit_calldata(context, report, signatures)?;
		let tx = Transaction::new(
			self.sender_address,
			self.contract_address,
			selector_from_name("transmit"),
			calldata,
		);

		let id = self.txm.enqueue(tx).await?;
		tracing::debug!(
			tx_id = %truncate_id(&id),
			epoch = context.epoch,
			round = context.round,
			signatures = signatures.len(),
			"Queued report transmission"
		);
		Ok(id)
	}

	/// Returns the digest and epoch of the latest transmission on the contract.
	pub async fn latest_config_digest_and_epoch(
		&self,
		cache: &ContractConfigCache,
	) -> Result<(ConfigDigest, u32), CacheError> {
		let details = cache.latest_transmission_details().await?;
		Ok((details.digest, details.epoch))
	}

	/// Returns the transmitter account address.
	pub fn from_account(&self) -> String {
		felt_to_hex(&self.sender_address)
	}
}

/// Builds the calldata of the aggregator's `transmit` entry point.
///
/// Layout: `config_digest, epoch_and_round, extra_hash, report words...,
/// signatures_len, (r, s, public_key)...`.
pub fn transmit_calldata(
	context: &ReportContext,
	report: &[u8],
	signatures: &[Vec<u8>],
) -> Result<Vec<Felt>, TransmitterError> {
	let words = split_report(report)?;

	let mut calldata = Vec::with_capacity(4 + words.len() + 3 * signatures.len());
	calldata.push(context.config_digest.to_felt());
	calldata.push(pack_epoch_and_round(context.epoch, context.round));
	// extra_hash is a full 32-byte hash and may exceed the field
	calldata.push(ensure_felt(&context.extra_hash));
	calldata.extend(words);

	calldata.push(Felt::from(signatures.len() as u64));
	for signature in signatures {
		if signature.len() != SIGNATURE_LENGTH {
			return Err(TransmitterError::InvalidSignature(format!(
				"expected {} bytes, got {}",
				SIGNATURE_LENGTH,
				signature.len()
			)));
		}
		for word in [&signature[32..64], &signature[64..96], &signature[..32]] {
			let felt = felt_from_bytes(word)
				.map_err(|e| TransmitterError::InvalidSignature(e.to_string()))?;
			calldata.push(felt);
		}
	}
	Ok(calldata)
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use relayer_account::implementations::memory::InMemoryKeystore;
	use relayer_account::{Key, KeystoreService};
	use relayer_codec::{MedianReportCodec, ParsedAttributedObservation};
	use relayer_txm::{
		ChainClient, ChainClientError, InMemoryTxStore, NonceClient, NonceSequencer, TxStatuses,
		TxmConfig,
	};
	use relayer_types::{OnchainTxStatus, TxStatus};

	/// Chain that is never reached because the manager is not started.
	struct OfflineChain;

	#[async_trait]
	impl NonceClient for OfflineChain {
		async fn get_nonce(&self, _address: &Felt) -> Result<Felt, ChainClientError> {
			Err(ChainClientError::Network("offline".into()))
		}
	}

	#[async_trait]
	impl ChainClient for OfflineChain {
		fn chain_id(&self) -> String {
			"SN_SEPOLIA".into()
		}

		async fn estimate_tx(
			&self,
			_tx: &Transaction,
			_nonce: &Felt,
		) -> Result<Felt, ChainClientError> {
			Err(ChainClientError::Network("offline".into()))
		}

		async fn send_tx(
			&self,
			_tx: &Transaction,
			_key: &Key,
			_nonce: &Felt,
			_max_fee: &Felt,
		) -> Result<Felt, ChainClientError> {
			Err(ChainClientError::Network("offline".into()))
		}

		async fn tx_status(&self, _hash: &Felt) -> Result<OnchainTxStatus, ChainClientError> {
			Ok(OnchainTxStatus::Pending)
		}

		fn is_fatal_error(&self, _error: &str) -> bool {
			false
		}
	}

	fn context() -> ReportContext {
		ReportContext {
			config_digest: ConfigDigest::from(Felt::from(0x0004abcdu64)),
			epoch: 7,
			round: 2,
			extra_hash: [0xff; 32],
		}
	}

	fn report() -> Vec<u8> {
		let observations: Vec<_> = (0..3u8)
			.map(|i| ParsedAttributedObservation {
				timestamp: 10,
				value: alloy_primitives::I256::try_from(i as i64).unwrap(),
				juels_per_fee_coin: alloy_primitives::U256::from(1u64),
				gas_price: alloy_primitives::U256::ZERO,
				observer: i,
			})
			.collect();
		MedianReportCodec::default()
			.build_report(&observations)
			.unwrap()
	}

	fn signature(fill: u8) -> Vec<u8> {
		let mut signature = vec![0u8; 96];
		signature[31] = fill;
		signature[63] = fill + 1;
		signature[95] = fill + 2;
		signature
	}

	#[test]
	fn test_calldata_layout() {
		let report = report();
		let calldata = transmit_calldata(&context(), &report, &[signature(1), signature(4)]).unwrap();

		let words = report.len() / 32;
		assert_eq!(calldata.len(), 3 + words + 1 + 6);
		assert_eq!(calldata[0], Felt::from(0x0004abcdu64));
		assert_eq!(calldata[1], Felt::from((7u64 << 8) | 2));
		// top byte cleared
		let extra_hash = calldata[2].to_bytes_be();
		assert_eq!(extra_hash[0], 0);
		assert!(extra_hash[1..].iter().all(|b| *b == 0xff));
		assert_eq!(calldata[3..3 + words], split_report(&report).unwrap()[..]);

		let tail = &calldata[3 + words..];
		assert_eq!(tail[0], Felt::from(2u64));
		// r, s, public key
		assert_eq!(
			&tail[1..4],
			&[Felt::from(2u64), Felt::from(3u64), Felt::from(1u64)]
		);
		assert_eq!(
			&tail[4..7],
			&[Felt::from(5u64), Felt::from(6u64), Felt::from(4u64)]
		);
	}

	#[test]
	fn test_calldata_rejects_bad_input() {
		let result = transmit_calldata(&context(), &report(), &[vec![0u8; 95]]);
		assert!(matches!(result, Err(TransmitterError::InvalidSignature(_))));

		let result = transmit_calldata(&context(), &report()[..40], &[]);
		assert!(matches!(result, Err(TransmitterError::Codec(_))));
	}

	#[tokio::test]
	async fn test_transmit_enqueues_invoke() {
		let store = Arc::new(InMemoryTxStore::new());
		let txm = Arc::new(TransactionManager::new(
			TxmConfig::default(),
			Arc::new(KeystoreService::new(Box::new(InMemoryKeystore::new()))),
			Arc::new(OfflineChain),
			store.clone(),
			Arc::new(NonceSequencer::new()),
		));
		let transmitter = ContractTransmitter::new(txm, Felt::from(0xc0u64), Felt::from(0x5eu64));
		assert_eq!(transmitter.from_account(), format!("0x{:0>64}", "5e"));

		let id = transmitter
			.transmit(&context(), &report(), &[signature(1)])
			.await
			.unwrap();

		let record = store.get_by_id(&id).await.unwrap();
		assert_eq!(record.status, TxStatus::Queued);
		assert_eq!(record.tx.contract_address, Felt::from(0xc0u64));
		assert_eq!(record.tx.sender_address, Felt::from(0x5eu64));
		assert_eq!(record.tx.entry_point_selector, selector_from_name("transmit"));
		assert_eq!(
			record.tx.calldata,
			transmit_calldata(&context(), &report(), &[signature(1)]).unwrap()
		);
	}
}
