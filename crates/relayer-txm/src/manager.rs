//! Transaction manager.
//!
//! Three tasks share a bounded queue and the status store:
//!
//! * the sender dequeues records, resolves key, nonce and fee, and broadcasts;
//! * the confirmer polls the chain for every Broadcast record;
//! * the retryer classifies Errored records as Fatal or re-queues them.
//!
//! Broadcast failures are recoverable unless the chain client classifies the
//! error text as fatal.

use crate::nonce::NonceSequencer;
use crate::store::{TxStatuses, TxStoreError};
use crate::ChainClient;
use alloy_primitives::U256;
use futures::future::join_all;
use relayer_account::KeystoreService;
use relayer_types::{
	felt_to_hex, felt_to_u256, truncate_id, u256_to_felt, with_jitter, Felt, OnchainTxStatus,
	Transaction, TxRecord, TxStatus,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Errors returned by the transaction manager.
#[derive(Debug, Error)]
pub enum TxmError {
	#[error("transaction queue is full")]
	QueueFull,
	#[error("Broadcast error: {0}")]
	Broadcast(String),
	#[error("Store error: {0}")]
	Store(#[from] TxStoreError),
	#[error("transaction manager is closed")]
	Closed,
}

/// Runtime settings of the transaction manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxmConfig {
	/// Upper bound on a single `send_tx` call.
	pub tx_timeout: Duration,
	/// Upper bound on nonce, fee and status queries.
	pub request_timeout: Duration,
	/// Base period of the confirmer. Each wait is jittered.
	pub confirm_frequency: Duration,
	/// Base period of the retryer. Each wait is jittered.
	pub retry_frequency: Duration,
	/// Capacity of the submission queue.
	pub queue_capacity: usize,
	/// Estimated fees are multiplied by this percentage.
	pub fee_margin_percent: u64,
}

impl Default for TxmConfig {
	fn default() -> Self {
		Self {
			tx_timeout: Duration::from_secs(60),
			request_timeout: Duration::from_secs(10),
			confirm_frequency: Duration::from_secs(5),
			retry_frequency: Duration::from_secs(5),
			queue_capacity: 1000,
			fee_margin_percent: 115,
		}
	}
}

enum Lifecycle {
	Idle(mpsc::Receiver<TxRecord>),
	Running {
		token: CancellationToken,
		handles: Vec<JoinHandle<()>>,
	},
	Closed,
}

/// Collaborators shared by the three background tasks.
struct Shared {
	config: TxmConfig,
	keystore: Arc<KeystoreService>,
	client: Arc<dyn ChainClient>,
	txs: Arc<dyn TxStatuses>,
	nonces: Arc<NonceSequencer>,
}

/// Queues, broadcasts and tracks invoke transactions.
pub struct TransactionManager {
	shared: Arc<Shared>,
	queue: mpsc::Sender<TxRecord>,
	lifecycle: Mutex<Lifecycle>,
}

impl TransactionManager {
	pub fn new(
		config: TxmConfig,
		keystore: Arc<KeystoreService>,
		client: Arc<dyn ChainClient>,
		txs: Arc<dyn TxStatuses>,
		nonces: Arc<NonceSequencer>,
	) -> Self {
		let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
		Self {
			shared: Arc::new(Shared {
				config,
				keystore,
				client,
				txs,
				nonces,
			}),
			queue,
			lifecycle: Mutex::new(Lifecycle::Idle(receiver)),
		}
	}

	/// Queues `tx` for broadcast and returns its id.
	///
	/// Never waits for queue space. When the queue is full the submission is
	/// refused with `TxmError::QueueFull` and its record ends Fatal, so the
	/// retryer never broadcasts it.
	pub async fn enqueue(&self, tx: Transaction) -> Result<String, TxmError> {
		let record = self.shared.txs.queued(tx).await?;
		let id = record.id.clone();

		let rejected = match self.queue.try_send(record) {
			Ok(()) => {
				tracing::debug!(tx_id = %truncate_id(&id), "Queued transaction");
				return Ok(id);
			}
			Err(TrySendError::Full(_)) => TxmError::QueueFull,
			Err(TrySendError::Closed(_)) => TxmError::Closed,
		};

		tracing::warn!(tx_id = %truncate_id(&id), error = %rejected, "Failed to enqueue transaction");
		self.shared.txs.errored(&id, rejected.to_string()).await?;
		self.shared.txs.fatal(&id).await?;
		Err(rejected)
	}

	/// Returns the number of tracked transactions in `status`.
	pub async fn tx_count(&self, status: TxStatus) -> usize {
		self.shared.txs.count(status).await
	}

	/// Returns the number of queued transactions and of broadcast transactions
	/// still awaiting confirmation.
	pub async fn inflight_count(&self) -> (usize, usize) {
		let queued = self.queue.max_capacity() - self.queue.capacity();
		(queued, self.shared.txs.count(TxStatus::Broadcast).await)
	}

	/// Spawns the sender, confirmer and retryer tasks.
	///
	/// Calling `start` on a running manager does nothing. A closed manager
	/// cannot be restarted.
	pub async fn start(&self) -> Result<(), TxmError> {
		let mut lifecycle = self.lifecycle.lock().await;
		let receiver = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
			Lifecycle::Idle(receiver) => receiver,
			Lifecycle::Closed => return Err(TxmError::Closed),
			running => {
				*lifecycle = running;
				return Ok(());
			}
		};

		let token = CancellationToken::new();
		let handles = vec![
			tokio::spawn(run_sender(self.shared.clone(), receiver, token.clone())),
			tokio::spawn(run_confirmer(self.shared.clone(), token.clone())),
			tokio::spawn(run_retryer(
				self.shared.clone(),
				self.queue.clone(),
				token.clone(),
			)),
		];
		*lifecycle = Lifecycle::Running { token, handles };

		tracing::info!(
			queue_capacity = self.shared.config.queue_capacity,
			"Transaction manager started"
		);
		Ok(())
	}

	/// Stops the background tasks and waits for them to exit.
	pub async fn close(&self) {
		let mut lifecycle = self.lifecycle.lock().await;
		if let Lifecycle::Running { token, handles } =
			std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
		{
			token.cancel();
			for result in join_all(handles).await {
				if let Err(e) = result {
					tracing::error!(error = %e, "Transaction manager task failed");
				}
			}
			tracing::info!("Transaction manager stopped");
		}
	}
}

impl Shared {
	async fn process(&self, record: TxRecord) {
		match self.broadcast(&record.tx).await {
			Ok(hash) => match self.txs.broadcast(&record.id, hash).await {
				Ok(_) => tracing::info!(
					tx_id = %truncate_id(&record.id),
					tx_hash = %truncate_id(&felt_to_hex(&hash)),
					retry_count = record.retry_count,
					"Broadcast transaction"
				),
				Err(e) => tracing::error!(
					tx_id = %truncate_id(&record.id),
					error = %e,
					"Failed to record broadcast"
				),
			},
			Err(e) => {
				tracing::warn!(tx_id = %truncate_id(&record.id), error = %e, "Broadcast failed");
				if let Err(e) = self.txs.errored(&record.id, e.to_string()).await {
					tracing::error!(
						tx_id = %truncate_id(&record.id),
						error = %e,
						"Failed to record broadcast failure"
					);
				}
			}
		}
	}

	async fn broadcast(&self, tx: &Transaction) -> Result<Felt, TxmError> {
		let key = self
			.keystore
			.get(&tx.sender_id())
			.await
			.map_err(|e| TxmError::Broadcast(format!("failed to get key: {}", e)))?;

		let chain_id = self.client.chain_id();
		let (nonce, sequenced) = match tx.nonce {
			Some(nonce) => (nonce, false),
			None => (self.sequence_nonce(&tx.sender_address, &chain_id).await?, true),
		};

		let max_fee = match tx.max_fee {
			Some(max_fee) => max_fee,
			None => self.estimate_fee(tx, &nonce).await?,
		};

		let hash = timeout(
			self.config.tx_timeout,
			self.client.send_tx(tx, &key, &nonce, &max_fee),
		)
		.await
		.map_err(|_| {
			TxmError::Broadcast(format!("send timed out after {:?}", self.config.tx_timeout))
		})?
		.map_err(|e| TxmError::Broadcast(e.to_string()))?;

		if sequenced {
			if let Err(e) = self
				.nonces
				.increment_next_sequence(&tx.sender_address, &chain_id, &nonce)
				.await
			{
				tracing::warn!(error = %e, "Nonce sequence diverged");
			}
		}
		Ok(hash)
	}

	async fn sequence_nonce(&self, sender: &Felt, chain_id: &str) -> Result<Felt, TxmError> {
		timeout(
			self.config.request_timeout,
			self.nonces.register(sender, chain_id, self.client.as_ref()),
		)
		.await
		.map_err(|_| TxmError::Broadcast("nonce query timed out".into()))?
		.map_err(|e| TxmError::Broadcast(e.to_string()))?;

		self.nonces
			.next_sequence(sender, chain_id)
			.await
			.map_err(|e| TxmError::Broadcast(e.to_string()))
	}

	async fn estimate_fee(&self, tx: &Transaction, nonce: &Felt) -> Result<Felt, TxmError> {
		let estimate = timeout(self.config.request_timeout, self.client.estimate_tx(tx, nonce))
			.await
			.map_err(|_| TxmError::Broadcast("fee estimation timed out".into()))?
			.map_err(|e| TxmError::Broadcast(format!("failed to estimate fee: {}", e)))?;

		let fee = felt_to_u256(&estimate)
			.checked_mul(U256::from(self.config.fee_margin_percent))
			.map(|fee| fee / U256::from(100u64))
			.ok_or_else(|| TxmError::Broadcast("fee estimate overflow".into()))?;
		u256_to_felt(&fee).map_err(|e| TxmError::Broadcast(format!("invalid max fee: {}", e)))
	}

	async fn confirm_broadcasts(&self) {
		let records = self.txs.get(TxStatus::Broadcast).await;
		if records.is_empty() {
			return;
		}

		let checks = records
			.iter()
			.filter_map(|record| record.tx.hash.map(|hash| (record, hash)))
			.map(|(record, hash)| async move {
				let status = timeout(self.config.request_timeout, self.client.tx_status(&hash)).await;
				(record, hash, status)
			});

		for (record, hash, status) in join_all(checks).await {
			let tx_id = truncate_id(&record.id);
			let tx_hash = truncate_id(&felt_to_hex(&hash));
			let updated = match status {
				Ok(Ok(OnchainTxStatus::Accepted)) => {
					tracing::info!(tx_id = %tx_id, tx_hash = %tx_hash, "Transaction confirmed");
					self.txs.confirmed(&record.id).await
				}
				Ok(Ok(OnchainTxStatus::Rejected(reason))) => {
					tracing::warn!(tx_id = %tx_id, tx_hash = %tx_hash, reason = %reason, "Transaction rejected");
					self.txs.errored(&record.id, reason).await
				}
				Ok(Ok(OnchainTxStatus::Pending)) => continue,
				Ok(Err(e)) => {
					tracing::debug!(tx_id = %tx_id, tx_hash = %tx_hash, error = %e, "Status query failed");
					continue;
				}
				Err(_) => {
					tracing::debug!(tx_id = %tx_id, tx_hash = %tx_hash, "Status query timed out");
					continue;
				}
			};
			if let Err(e) = updated {
				tracing::error!(tx_id = %tx_id, error = %e, "Failed to record transaction status");
			}
		}
	}

	async fn retry_errored(&self, queue: &mpsc::Sender<TxRecord>, token: &CancellationToken) {
		for record in self.txs.get(TxStatus::Errored).await {
			let tx_id = truncate_id(&record.id);
			let error = record.error.as_deref().unwrap_or_default();

			if self.client.is_fatal_error(error) {
				match self.txs.fatal(&record.id).await {
					Ok(_) => tracing::error!(
						tx_id = %tx_id,
						retry_count = record.retry_count,
						error = %error,
						"Transaction failed permanently"
					),
					Err(e) => tracing::error!(tx_id = %tx_id, error = %e, "Failed to mark transaction fatal"),
				}
				continue;
			}

			let retried = match self.txs.retry(&record.id).await {
				Ok(retried) => retried,
				Err(e) => {
					tracing::error!(tx_id = %tx_id, error = %e, "Failed to mark transaction for retry");
					continue;
				}
			};
			tracing::info!(
				tx_id = %tx_id,
				retry_count = retried.retry_count,
				error = %error,
				"Retrying transaction"
			);

			tokio::select! {
				_ = token.cancelled() => return,
				sent = queue.send(retried) => {
					if sent.is_err() {
						return;
					}
				}
			}
		}
	}
}

#[instrument(skip_all)]
async fn run_sender(
	shared: Arc<Shared>,
	mut receiver: mpsc::Receiver<TxRecord>,
	token: CancellationToken,
) {
	loop {
		let record = tokio::select! {
			_ = token.cancelled() => break,
			next = receiver.recv() => match next {
				Some(record) => record,
				None => break,
			},
		};
		shared.process(record).await;
	}
	tracing::debug!("Sender stopped");
}

#[instrument(skip_all)]
async fn run_confirmer(shared: Arc<Shared>, token: CancellationToken) {
	let period = shared.config.confirm_frequency;
	every(period, &token, || shared.confirm_broadcasts()).await;
	tracing::debug!("Confirmer stopped");
}

#[instrument(skip_all)]
async fn run_retryer(shared: Arc<Shared>, queue: mpsc::Sender<TxRecord>, token: CancellationToken) {
	let period = shared.config.retry_frequency;
	every(period, &token, || shared.retry_errored(&queue, &token)).await;
	tracing::debug!("Retryer stopped");
}

/// Runs `tick` immediately and then once per jittered `period`, measured from
/// the start of the previous tick, until `token` is cancelled.
async fn every<F, Fut>(period: Duration, token: &CancellationToken, mut tick: F)
where
	F: FnMut() -> Fut,
	Fut: Future<Output = ()>,
{
	while !token.is_cancelled() {
		let started = Instant::now();
		tick().await;
		let wait = with_jitter(period).saturating_sub(started.elapsed());
		tokio::select! {
			_ = token.cancelled() => break,
			_ = tokio::time::sleep(wait) => {}
		}
	}
}
