//! Signing key management for the relayer.
//!
//! The transaction manager resolves the key of each transaction's sender through
//! the `KeystoreInterface` before broadcasting. Signing itself happens inside
//! the chain client; this crate only stores and hands out key material.

use async_trait::async_trait;
use relayer_types::SecretString;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during keystore operations.
#[derive(Debug, Error)]
pub enum KeystoreError {
	/// Error that occurs when no key is registered for a sender.
	#[error("Key not found: {0}")]
	NotFound(String),
	/// Error that occurs when a key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// A signing key resolved for a sender.
#[derive(Debug, Clone)]
pub struct Key {
	/// Sender id the key belongs to.
	pub id: String,
	/// Stark private key, `0x`-prefixed hex.
	pub secret: SecretString,
}

/// Trait defining the interface for keystore implementations.
#[async_trait]
pub trait KeystoreInterface: Send + Sync {
	/// Returns the key registered for `id`.
	async fn get(&self, id: &str) -> Result<Key, KeystoreError>;
}

/// Service that resolves signing keys by sender id.
pub struct KeystoreService {
	/// The underlying keystore implementation.
	implementation: Box<dyn KeystoreInterface>,
}

impl KeystoreService {
	/// Creates a new KeystoreService with the specified implementation.
	pub fn new(implementation: Box<dyn KeystoreInterface>) -> Self {
		Self { implementation }
	}

	/// Resolves the signing key for `id`.
	pub async fn get(&self, id: &str) -> Result<Key, KeystoreError> {
		self.implementation.get(id).await
	}
}
