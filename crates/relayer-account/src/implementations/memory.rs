//! In-memory keystore implementation.
//!
//! Keys are held in a HashMap keyed by the sender address in canonical felt
//! hex, so lookups match regardless of how the address was written when the
//! key was added.

use crate::{Key, KeystoreError, KeystoreInterface};
use async_trait::async_trait;
use relayer_types::{felt_from_hex, felt_to_hex, truncate_id, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory keystore.
///
/// Nothing is persisted; keys must be added again after a restart.
pub struct InMemoryKeystore {
	keys: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl InMemoryKeystore {
	/// Creates an empty keystore.
	pub fn new() -> Self {
		Self {
			keys: Arc::new(RwLock::new(HashMap::new())),
		}
	}

	/// Registers `secret` as the signing key for the account at `address`.
	///
	/// Both the address and the key must be valid field elements. Adding a key
	/// for an address that already has one replaces it.
	pub async fn add_key(&self, address: &str, secret: SecretString) -> Result<(), KeystoreError> {
		let id = felt_from_hex(address)
			.map(|felt| felt_to_hex(&felt))
			.map_err(|e| KeystoreError::InvalidKey(format!("invalid account address: {}", e)))?;

		if secret.is_empty() {
			return Err(KeystoreError::InvalidKey("private key is empty".into()));
		}
		secret
			.with_exposed(|s| felt_from_hex(s).map(|_| ()))
			.map_err(|e| KeystoreError::InvalidKey(format!("invalid private key: {}", e)))?;

		tracing::debug!(account = %truncate_id(&id), "Added signing key");
		self.keys.write().await.insert(id, secret);
		Ok(())
	}

	/// Returns the number of stored keys.
	pub async fn len(&self) -> usize {
		self.keys.read().await.len()
	}

	/// Returns true if no keys are stored.
	pub async fn is_empty(&self) -> bool {
		self.keys.read().await.is_empty()
	}
}

impl Default for InMemoryKeystore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl KeystoreInterface for InMemoryKeystore {
	async fn get(&self, id: &str) -> Result<Key, KeystoreError> {
		let id = felt_from_hex(id)
			.map(|felt| felt_to_hex(&felt))
			.map_err(|_| KeystoreError::NotFound(id.to_string()))?;
		let keys = self.keys.read().await;
		keys.get(&id)
			.cloned()
			.map(|secret| Key {
				id: id.clone(),
				secret,
			})
			.ok_or(KeystoreError::NotFound(id))
	}
}
