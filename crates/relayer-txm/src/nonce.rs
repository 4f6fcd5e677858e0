//! Per-account nonce tracking.
//!
//! Nonces are tracked locally per (address, chain id) so consecutive
//! transactions from one account can be broadcast without waiting for the
//! chain to include the previous one. The tracked value only advances through
//! a compare-and-swap, so a caller holding a stale nonce finds out instead of
//! silently diverging from the chain.

use crate::NonceClient;
use relayer_types::{felt_to_hex, truncate_id, Felt};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur while sequencing nonces.
#[derive(Debug, Error)]
pub enum NonceError {
	/// Error that occurs when an account was never registered for a chain.
	#[error("nonce not registered for {address} on {chain_id}")]
	NotRegistered { address: String, chain_id: String },
	/// Error that occurs when the tracked nonce moved on since it was read.
	#[error("mismatched nonce for {address}: {expected} (expected) != {current} (got)")]
	Mismatch {
		address: String,
		expected: Felt,
		current: Felt,
	},
	/// Error that occurs when the chain cannot be queried for the seed nonce.
	#[error("failed to fetch nonce: {0}")]
	Client(String),
}

type AccountKey = ([u8; 32], String);

fn account_key(address: &Felt, chain_id: &str) -> AccountKey {
	(address.to_bytes_be(), chain_id.to_string())
}

/// Hands out sequential nonces per account and chain.
#[derive(Default)]
pub struct NonceSequencer {
	nonces: RwLock<HashMap<AccountKey, Felt>>,
}

impl NonceSequencer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds the nonce of `address` on `chain_id` from the chain.
	///
	/// Does nothing if the pair is already registered. The write lock is held
	/// across the chain query so concurrent registrations seed exactly once.
	pub async fn register<C>(
		&self,
		address: &Felt,
		chain_id: &str,
		client: &C,
	) -> Result<(), NonceError>
	where
		C: NonceClient + ?Sized,
	{
		let mut nonces = self.nonces.write().await;
		let key = account_key(address, chain_id);
		if nonces.contains_key(&key) {
			return Ok(());
		}

		let nonce = client
			.get_nonce(address)
			.await
			.map_err(|e| NonceError::Client(e.to_string()))?;
		tracing::debug!(
			account = %truncate_id(&felt_to_hex(address)),
			chain_id = %chain_id,
			nonce = %nonce,
			"Registered account nonce"
		);
		nonces.insert(key, nonce);
		Ok(())
	}

	/// Returns the nonce the next transaction from `address` should use.
	pub async fn next_sequence(&self, address: &Felt, chain_id: &str) -> Result<Felt, NonceError> {
		self.nonces
			.read()
			.await
			.get(&account_key(address, chain_id))
			.copied()
			.ok_or_else(|| NonceError::NotRegistered {
				address: felt_to_hex(address),
				chain_id: chain_id.to_string(),
			})
	}

	/// Advances the tracked nonce by one if it still equals `current`.
	pub async fn increment_next_sequence(
		&self,
		address: &Felt,
		chain_id: &str,
		current: &Felt,
	) -> Result<(), NonceError> {
		let mut nonces = self.nonces.write().await;
		let tracked = nonces
			.get_mut(&account_key(address, chain_id))
			.ok_or_else(|| NonceError::NotRegistered {
				address: felt_to_hex(address),
				chain_id: chain_id.to_string(),
			})?;

		if tracked != current {
			return Err(NonceError::Mismatch {
				address: felt_to_hex(address),
				expected: *current,
				current: *tracked,
			});
		}
		*tracked = *tracked + Felt::ONE;
		Ok(())
	}
}
