//! Transaction submission pipeline for the Starknet relayer.
//!
//! The `TransactionManager` accepts invoke transactions, resolves their nonce
//! and fee, broadcasts them through a `ChainClient` and tracks them until the
//! chain accepts them or they fail terminally. Nonces are handed out by the
//! `NonceSequencer` and every lifecycle change goes through a `TxStatuses`
//! store that rejects illegal transitions.

use async_trait::async_trait;
use relayer_account::Key;
use relayer_types::{Felt, OnchainTxStatus, Transaction};
use thiserror::Error;

pub mod manager;
pub mod nonce;
pub mod store;

pub use manager::{TransactionManager, TxmConfig, TxmError};
pub use nonce::{NonceError, NonceSequencer};
pub use store::{InMemoryTxStore, TxStatuses, TxStoreError};

/// Failure texts the Starknet sequencer returns for transactions that can
/// never succeed, however often they are retried.
const FATAL_STARKNET_ERRORS: [&str; 3] = [
	"Error in the called contract",
	"No contract at the provided address",
	"Invalid key",
];

/// Errors returned by chain client implementations.
#[derive(Debug, Error)]
pub enum ChainClientError {
	/// Error that occurs when the node cannot be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// Error reported by the node for a call or transaction.
	#[error("Chain error: {0}")]
	Chain(String),
	/// Error that occurs when a response cannot be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Source of account nonces, used to seed the `NonceSequencer`.
///
/// Split from `ChainClient` so the sequencer can be driven by anything that
/// answers nonce queries.
#[async_trait]
pub trait NonceClient: Send + Sync {
	/// Queries the chain for the next nonce it expects from `address`.
	async fn get_nonce(&self, address: &Felt) -> Result<Felt, ChainClientError>;
}

/// Chain operations the transaction manager depends on.
///
/// Nonces come from the `NonceClient::get_nonce` supertrait method, which the
/// manager only calls through the `NonceSequencer`.
#[async_trait]
pub trait ChainClient: NonceClient {
	/// Identifier of the chain this client talks to, such as `SN_MAIN`.
	fn chain_id(&self) -> String;

	/// Estimates the overall fee of `tx` when sent with `nonce`.
	async fn estimate_tx(&self, tx: &Transaction, nonce: &Felt) -> Result<Felt, ChainClientError>;

	/// Signs `tx` with `key` and submits it. Returns the transaction hash.
	async fn send_tx(
		&self,
		tx: &Transaction,
		key: &Key,
		nonce: &Felt,
		max_fee: &Felt,
	) -> Result<Felt, ChainClientError>;

	/// Returns the status the chain reports for a broadcast transaction.
	async fn tx_status(&self, hash: &Felt) -> Result<OnchainTxStatus, ChainClientError>;

	/// Returns true if a failure with this text can never succeed on retry.
	fn is_fatal_error(&self, error: &str) -> bool;
}

/// Classifies Starknet sequencer failures.
///
/// Chain clients can delegate `ChainClient::is_fatal_error` to this function.
pub fn is_fatal_starknet_error(error: &str) -> bool {
	FATAL_STARKNET_ERRORS
		.iter()
		.any(|fatal| error.contains(fatal))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fatal_classification() {
		assert!(is_fatal_starknet_error(
			"Broadcast error: No contract at the provided address"
		));
		assert!(is_fatal_starknet_error("Error in the called contract (0x1234)"));
		assert!(is_fatal_starknet_error("Invalid key"));
		assert!(!is_fatal_starknet_error("connection reset by peer"));
		assert!(!is_fatal_starknet_error("Invalid transaction nonce"));
		assert!(!is_fatal_starknet_error(""));
	}
}
