//! In-memory cache of aggregator state.
//!
//! A background task polls the contract on a jittered period. Each poll first
//! reads the cheap config details and only loads the full ConfigSet event when
//! the (block, digest) pair changed, then refreshes the latest transmission.
//! Reads serve the cached values but fail once a slot has not been refreshed
//! within the TTL.

use crate::reader::ContractReader;
use crate::ReaderError;
use relayer_types::{
	felt_to_hex, truncate_id, with_jitter, ConfigDigest, ContractConfig, ContractConfigDetails,
	TransmissionDetails,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Errors returned by cache reads and polls.
#[derive(Debug, Error)]
pub enum CacheError {
	#[error("cache not yet initialized")]
	NotInitialized,
	#[error("cache expired: last checked {since:?} ago")]
	Expired { since: Duration },
	#[error("Reader error: {0}")]
	Reader(#[from] ReaderError),
}

/// Polling settings of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
	/// Base poll period. Each wait is jittered.
	pub poll_period: Duration,
	/// Maximum age of a cached value before reads fail.
	pub ttl: Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			poll_period: Duration::from_secs(5),
			ttl: Duration::from_secs(60),
		}
	}
}

struct CachedConfig {
	details: ContractConfigDetails,
	config: ContractConfig,
	last_checked_at: Instant,
}

struct CachedTransmission {
	details: TransmissionDetails,
	last_checked_at: Instant,
}

#[derive(Default)]
struct CacheState {
	config: Option<CachedConfig>,
	transmission: Option<CachedTransmission>,
}

struct Inner {
	reader: Arc<ContractReader>,
	config: CacheConfig,
	state: RwLock<CacheState>,
}

/// Caches the latest configuration and transmission of one aggregator.
pub struct ContractConfigCache {
	inner: Arc<Inner>,
	task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ContractConfigCache {
	pub fn new(reader: Arc<ContractReader>, config: CacheConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				reader,
				config,
				state: RwLock::new(CacheState::default()),
			}),
			task: Mutex::new(None),
		}
	}

	/// Runs a single poll. Only the poller and tests call this.
	pub(crate) async fn update(&self) -> Result<(), CacheError> {
		self.inner.update().await
	}

	/// Polls once, then keeps polling in the background.
	///
	/// A failed first poll is logged and leaves the cache uninitialized until
	/// the background task succeeds. Calling `start` again while running does
	/// nothing.
	pub async fn start(&self) {
		let mut task = self.task.lock().await;
		if task.is_some() {
			return;
		}

		if let Err(e) = self.inner.update().await {
			tracing::warn!(error = %e, "Initial contract cache poll failed");
		}

		let token = CancellationToken::new();
		let handle = tokio::spawn(run_poller(self.inner.clone(), token.clone()));
		*task = Some((token, handle));
		tracing::info!(
			contract = %truncate_id(&felt_to_hex(self.inner.reader.address())),
			"Contract cache started"
		);
	}

	/// Stops the background poller and waits for it to exit.
	pub async fn close(&self) {
		if let Some((token, handle)) = self.task.lock().await.take() {
			token.cancel();
			if let Err(e) = handle.await {
				tracing::error!(error = %e, "Contract cache poller failed");
			}
		}
	}

	pub async fn latest_config_details(&self) -> Result<ContractConfigDetails, CacheError> {
		let state = self.inner.state.read().await;
		let cached = state.config.as_ref().ok_or(CacheError::NotInitialized)?;
		self.check_age(cached.last_checked_at)?;
		Ok(cached.details)
	}

	/// Returns the configuration set in `block`.
	///
	/// The cached configuration is served when `block` is the block of the
	/// latest configuration. Any other block is read from the contract.
	pub async fn latest_config(&self, block: u64) -> Result<ContractConfig, CacheError> {
		{
			let state = self.inner.state.read().await;
			let cached = state.config.as_ref().ok_or(CacheError::NotInitialized)?;
			self.check_age(cached.last_checked_at)?;
			if cached.details.block == block {
				return Ok(cached.config.clone());
			}
		}
		Ok(self.inner.reader.latest_config(block).await?)
	}

	pub async fn latest_transmission_details(&self) -> Result<TransmissionDetails, CacheError> {
		let state = self.inner.state.read().await;
		let cached = state
			.transmission
			.as_ref()
			.ok_or(CacheError::NotInitialized)?;
		self.check_age(cached.last_checked_at)?;
		Ok(cached.details.clone())
	}

	/// Returns the digest, epoch and round of the latest round requested within
	/// `lookback`.
	///
	/// The aggregator emits no round request events, so the latest
	/// transmission is reported whatever `lookback` is.
	pub async fn latest_round_requested(
		&self,
		lookback: Duration,
	) -> Result<(ConfigDigest, u32, u8), CacheError> {
		let details = self.latest_transmission_details().await?;
		tracing::trace!(
			lookback = ?lookback,
			epoch = details.epoch,
			round = details.round,
			"Latest round requested"
		);
		Ok((details.digest, details.epoch, details.round))
	}

	/// Returns the latest block height, bypassing the cache.
	pub async fn latest_block_height(&self) -> Result<u64, CacheError> {
		Ok(self.inner.reader.latest_block_height().await?)
	}

	fn check_age(&self, last_checked_at: Instant) -> Result<(), CacheError> {
		let since = last_checked_at.elapsed();
		if since > self.inner.config.ttl {
			return Err(CacheError::Expired { since });
		}
		Ok(())
	}
}

impl Inner {
	async fn update(&self) -> Result<(), CacheError> {
		let details = self.reader.latest_config_details().await?;

		let refreshed = match self.state.write().await.config.as_mut() {
			Some(cached) if cached.details == details => {
				cached.last_checked_at = Instant::now();
				true
			}
			_ => false,
		};

		if !refreshed {
			let config = self.reader.latest_config(details.block).await?;
			tracing::info!(
				block = details.block,
				digest = %details.digest,
				"Loaded new contract config"
			);
			self.state.write().await.config = Some(CachedConfig {
				details,
				config,
				last_checked_at: Instant::now(),
			});
		}

		let transmission = self.reader.latest_transmission_details().await?;
		self.state.write().await.transmission = Some(CachedTransmission {
			details: transmission,
			last_checked_at: Instant::now(),
		});
		Ok(())
	}
}

#[instrument(skip_all)]
async fn run_poller(inner: Arc<Inner>, token: CancellationToken) {
	loop {
		tokio::select! {
			_ = token.cancelled() => break,
			_ = tokio::time::sleep(with_jitter(inner.config.poll_period)) => {}
		}
		if let Err(e) = inner.update().await {
			tracing::warn!(error = %e, "Contract cache poll failed");
		}
	}
	tracing::debug!("Contract cache poller stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ChainReader;
	use async_trait::async_trait;
	use relayer_codec::{encode_felts, pack_epoch_and_round};
	use relayer_types::{selector_from_name, Felt};
	use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

	/// Reader serving one configuration whose digest can be changed.
	struct FakeReader {
		digest: AtomicU64,
		fail_transmission: AtomicBool,
		config_calls: AtomicUsize,
		details_calls: AtomicUsize,
	}

	impl FakeReader {
		fn new() -> Self {
			Self {
				digest: AtomicU64::new(0xd1),
				fail_transmission: AtomicBool::new(false),
				config_calls: AtomicUsize::new(0),
				details_calls: AtomicUsize::new(0),
			}
		}

		fn config_set_event(digest: u64) -> Vec<Felt> {
			let mut data = vec![
				Felt::ZERO,
				Felt::from(digest),
				Felt::ONE,
				Felt::ONE,
				Felt::from(0x5151u64),
				Felt::from(0x7e7eu64),
				Felt::ONE,
				Felt::from(3u64),
				Felt::ONE,
				Felt::ZERO,
				Felt::from(100u64),
				Felt::from(2u64),
			];
			let offchain = encode_felts(&[1, 2, 3]);
			data.push(Felt::from(offchain.len() as u64));
			data.extend(offchain);
			data
		}
	}

	#[async_trait]
	impl ChainReader for FakeReader {
		async fn call_contract(
			&self,
			_address: &Felt,
			selector: &Felt,
			_calldata: &[Felt],
		) -> Result<Vec<Felt>, ReaderError> {
			if *selector == selector_from_name("latest_config_details") {
				self.details_calls.fetch_add(1, Ordering::SeqCst);
				return Ok(vec![
					Felt::ONE,
					Felt::from(50u64),
					Felt::from(self.digest.load(Ordering::SeqCst)),
				]);
			}
			if self.fail_transmission.load(Ordering::SeqCst) {
				return Err(ReaderError::Network("connection refused".into()));
			}
			Ok(vec![
				Felt::from(self.digest.load(Ordering::SeqCst)),
				pack_epoch_and_round(4, 2),
				Felt::from(99u64),
				Felt::from(1_700_000_000u64),
			])
		}

		async fn events(
			&self,
			_address: &Felt,
			_block: u64,
			_key: &Felt,
		) -> Result<Vec<Vec<Felt>>, ReaderError> {
			self.config_calls.fetch_add(1, Ordering::SeqCst);
			Ok(vec![Self::config_set_event(self.digest.load(Ordering::SeqCst))])
		}

		async fn latest_block_height(&self) -> Result<u64, ReaderError> {
			Ok(60)
		}
	}

	fn cache(reader: Arc<FakeReader>, ttl: Duration) -> ContractConfigCache {
		let reader = Arc::new(ContractReader::new(reader, Felt::from(0xaaau64)));
		ContractConfigCache::new(
			reader,
			CacheConfig {
				poll_period: Duration::from_millis(500),
				ttl,
			},
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_reads_before_first_poll() {
		let cache = cache(Arc::new(FakeReader::new()), Duration::from_secs(1));
		assert!(matches!(
			cache.latest_config_details().await,
			Err(CacheError::NotInitialized)
		));
		assert!(matches!(
			cache.latest_transmission_details().await,
			Err(CacheError::NotInitialized)
		));
		assert!(matches!(
			cache.latest_config(50).await,
			Err(CacheError::NotInitialized)
		));
		assert_eq!(cache.latest_block_height().await.unwrap(), 60);
	}

	#[tokio::test(start_paused = true)]
	async fn test_expires_after_ttl() {
		let cache = cache(Arc::new(FakeReader::new()), Duration::from_secs(1));
		cache.update().await.unwrap();

		let details = cache.latest_config_details().await.unwrap();
		assert_eq!(details.block, 50);
		assert_eq!(details.digest, ConfigDigest::from(Felt::from(0xd1u64)));
		let config = cache.latest_config(50).await.unwrap();
		assert_eq!(config.offchain_config, vec![1, 2, 3]);
		assert_eq!(cache.latest_transmission_details().await.unwrap().epoch, 4);

		tokio::time::advance(Duration::from_millis(1100)).await;
		assert!(matches!(
			cache.latest_config_details().await,
			Err(CacheError::Expired { .. })
		));
		assert!(matches!(
			cache.latest_transmission_details().await,
			Err(CacheError::Expired { .. })
		));

		cache.update().await.unwrap();
		assert!(cache.latest_config_details().await.is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unchanged_details_skip_config_fetch() {
		let reader = Arc::new(FakeReader::new());
		let cache = cache(reader.clone(), Duration::from_secs(10));

		cache.update().await.unwrap();
		tokio::time::advance(Duration::from_secs(8)).await;
		cache.update().await.unwrap();
		assert_eq!(reader.details_calls.load(Ordering::SeqCst), 2);
		assert_eq!(reader.config_calls.load(Ordering::SeqCst), 1);

		// The unchanged poll still counts as a refresh
		tokio::time::advance(Duration::from_secs(8)).await;
		assert!(cache.latest_config_details().await.is_ok());

		reader.digest.store(0xd2, Ordering::SeqCst);
		cache.update().await.unwrap();
		assert_eq!(reader.config_calls.load(Ordering::SeqCst), 2);
		assert_eq!(
			cache.latest_config(50).await.unwrap().config_digest,
			ConfigDigest::from(Felt::from(0xd2u64))
		);

		// Other blocks bypass the cache
		cache.latest_config(49).await.unwrap();
		assert_eq!(reader.config_calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_transmission_failure_keeps_config_fresh() {
		let reader = Arc::new(FakeReader::new());
		let cache = cache(reader.clone(), Duration::from_secs(1));
		cache.update().await.unwrap();

		reader.fail_transmission.store(true, Ordering::SeqCst);
		tokio::time::advance(Duration::from_millis(800)).await;
		assert!(cache.update().await.is_err());

		tokio::time::advance(Duration::from_millis(400)).await;
		assert!(cache.latest_config_details().await.is_ok());
		assert!(matches!(
			cache.latest_transmission_details().await,
			Err(CacheError::Expired { .. })
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_latest_round_requested() {
		let reader = Arc::new(FakeReader::new());
		let cache = cache(reader.clone(), Duration::from_secs(1));
		assert!(matches!(
			cache.latest_round_requested(Duration::from_secs(30)).await,
			Err(CacheError::NotInitialized)
		));

		cache.update().await.unwrap();
		let (digest, epoch, round) = cache
			.latest_round_requested(Duration::from_secs(30))
			.await
			.unwrap();
		assert_eq!(digest, ConfigDigest::from(Felt::from(0xd1u64)));
		assert_eq!((epoch, round), (4, 2));
		assert_eq!(
			cache.latest_round_requested(Duration::ZERO).await.unwrap(),
			(digest, epoch, round)
		);

		tokio::time::advance(Duration::from_millis(1100)).await;
		assert!(matches!(
			cache.latest_round_requested(Duration::from_secs(30)).await,
			Err(CacheError::Expired { .. })
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_background_polling() {
		let reader = Arc::new(FakeReader::new());
		let cache = cache(reader.clone(), Duration::from_secs(1));

		cache.start().await;
		cache.start().await;
		assert_eq!(reader.details_calls.load(Ordering::SeqCst), 1);

		tokio::time::sleep(Duration::from_secs(5)).await;
		assert!(reader.details_calls.load(Ordering::SeqCst) > 5);
		assert!(cache.latest_config_details().await.is_ok());

		cache.close().await;
		cache.close().await;
		tokio::time::sleep(Duration::from_secs(5)).await;
		assert!(matches!(
			cache.latest_config_details().await,
			Err(CacheError::Expired { .. })
		));
	}
}
