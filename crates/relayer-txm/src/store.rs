//! Transaction status tracking.
//!
//! Every transaction moves through Queued/Retry -> Broadcast -> Confirmed, with
//! failures parked in Errored until the retryer either re-queues them or marks
//! them Fatal. The store validates each change against a static transition
//! table and rejects anything else.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use relayer_types::{Felt, Transaction, TxRecord, TxStatus};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors that can occur when updating transaction statuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxStoreError {
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: TxStatus, to: TxStatus },
	#[error("Transaction not found: {0}")]
	NotFound(String),
}

static TRANSITIONS: Lazy<HashMap<TxStatus, HashSet<TxStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		TxStatus::Queued,
		HashSet::from([TxStatus::Broadcast, TxStatus::Errored]),
	);
	m.insert(
		TxStatus::Retry,
		HashSet::from([TxStatus::Broadcast, TxStatus::Errored]),
	);
	m.insert(
		TxStatus::Broadcast,
		HashSet::from([TxStatus::Confirmed, TxStatus::Errored]),
	);
	m.insert(
		TxStatus::Errored,
		HashSet::from([TxStatus::Retry, TxStatus::Fatal]),
	);
	m.insert(TxStatus::Confirmed, HashSet::new()); // terminal
	m.insert(TxStatus::Fatal, HashSet::new()); // terminal
	m
});

fn is_valid_transition(from: TxStatus, to: TxStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.map(|allowed| allowed.contains(&to))
		.unwrap_or(false)
}

/// Storage of transaction records and their lifecycle state.
#[async_trait]
pub trait TxStatuses: Send + Sync {
	/// Starts tracking `tx` in the Queued state under a fresh id.
	async fn queued(&self, tx: Transaction) -> Result<TxRecord, TxStoreError>;

	/// Moves an Errored record back to Retry, clearing its nonce and fee
	/// overrides and bumping its retry count.
	async fn retry(&self, id: &str) -> Result<TxRecord, TxStoreError>;

	/// Records that the transaction was submitted under `hash`.
	async fn broadcast(&self, id: &str, hash: Felt) -> Result<TxRecord, TxStoreError>;

	/// Records that the chain accepted the transaction.
	async fn confirmed(&self, id: &str) -> Result<TxRecord, TxStoreError>;

	/// Records a failure.
	async fn errored(&self, id: &str, error: String) -> Result<TxRecord, TxStoreError>;

	/// Marks an Errored record as permanently failed.
	async fn fatal(&self, id: &str) -> Result<TxRecord, TxStoreError>;

	/// Returns all records currently in `status`.
	async fn get(&self, status: TxStatus) -> Vec<TxRecord>;

	async fn get_by_id(&self, id: &str) -> Result<TxRecord, TxStoreError>;

	async fn exists(&self, id: &str) -> bool;

	/// Returns the number of records currently in `status`.
	async fn count(&self, status: TxStatus) -> usize;
}

/// In-memory `TxStatuses` implementation. Records are lost on restart.
#[derive(Default)]
pub struct InMemoryTxStore {
	records: RwLock<HashMap<String, TxRecord>>,
}

impl InMemoryTxStore {
	pub fn new() -> Self {
		Self::default()
	}

	async fn transition<F>(&self, id: &str, to: TxStatus, update: F) -> Result<TxRecord, TxStoreError>
	where
		F: FnOnce(&mut TxRecord) + Send,
	{
		let mut records = self.records.write().await;
		let record = records
			.get_mut(id)
			.ok_or_else(|| TxStoreError::NotFound(id.to_string()))?;

		if !is_valid_transition(record.status, to) {
			return Err(TxStoreError::InvalidTransition {
				from: record.status,
				to,
			});
		}

		record.status = to;
		update(record);
		Ok(record.clone())
	}
}

#[async_trait]
impl TxStatuses for InMemoryTxStore {
	async fn queued(&self, tx: Transaction) -> Result<TxRecord, TxStoreError> {
		let record = TxRecord {
			id: Uuid::new_v4().to_string(),
			tx,
			status: TxStatus::Queued,
			error: None,
			retry_count: 0,
		};
		self.records
			.write()
			.await
			.insert(record.id.clone(), record.clone());
		Ok(record)
	}

	async fn retry(&self, id: &str) -> Result<TxRecord, TxStoreError> {
		self.transition(id, TxStatus::Retry, |record| {
			record.tx.clear_overrides();
			record.retry_count += 1;
		})
		.await
	}

	async fn broadcast(&self, id: &str, hash: Felt) -> Result<TxRecord, TxStoreError> {
		self.transition(id, TxStatus::Broadcast, |record| {
			record.tx.hash = Some(hash);
			record.error = None;
		})
		.await
	}

	async fn confirmed(&self, id: &str) -> Result<TxRecord, TxStoreError> {
		self.transition(id, TxStatus::Confirmed, |_| {}).await
	}

	async fn errored(&self, id: &str, error: String) -> Result<TxRecord, TxStoreError> {
		self.transition(id, TxStatus::Errored, |record| {
			record.error = Some(error);
		})
		.await
	}

	async fn fatal(&self, id: &str) -> Result<TxRecord, TxStoreError> {
		self.transition(id, TxStatus::Fatal, |_| {}).await
	}

	async fn get(&self, status: TxStatus) -> Vec<TxRecord> {
		self.records
			.read()
			.await
			.values()
			.filter(|record| record.status == status)
			.cloned()
			.collect()
	}

	async fn get_by_id(&self, id: &str) -> Result<TxRecord, TxStoreError> {
		self.records
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| TxStoreError::NotFound(id.to_string()))
	}

	async fn exists(&self, id: &str) -> bool {
		self.records.read().await.contains_key(id)
	}

	async fn count(&self, status: TxStatus) -> usize {
		self.records
			.read()
			.await
			.values()
			.filter(|record| record.status == status)
			.count()
	}
}
