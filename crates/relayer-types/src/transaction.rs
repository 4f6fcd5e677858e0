//! Transaction types for the relayer's submission pipeline.
//!
//! Defines the invoke transaction submitted by the OCR2 runtime, the record the
//! status store keeps for it, and the lifecycle states it moves through.

use crate::felt::{felt_to_hex, Felt};
use std::fmt;

/// An invoke transaction submitted on behalf of a sender account.
///
/// The nonce and max fee are optional caller overrides. When absent they are
/// resolved at broadcast time, and they are cleared again before a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	/// Account that signs and pays for the transaction.
	pub sender_address: Felt,
	/// Contract being invoked.
	pub contract_address: Felt,
	/// Selector of the entry point being invoked.
	pub entry_point_selector: Felt,
	/// Call data passed to the entry point.
	pub calldata: Vec<Felt>,
	/// Caller supplied nonce override.
	pub nonce: Option<Felt>,
	/// Caller supplied max fee override.
	pub max_fee: Option<Felt>,
	/// Hash assigned by the chain once broadcast.
	pub hash: Option<Felt>,
}

impl Transaction {
	/// Creates a transaction without overrides.
	pub fn new(
		sender_address: Felt,
		contract_address: Felt,
		entry_point_selector: Felt,
		calldata: Vec<Felt>,
	) -> Self {
		Self {
			sender_address,
			contract_address,
			entry_point_selector,
			calldata,
			nonce: None,
			max_fee: None,
			hash: None,
		}
	}

	/// Sets a nonce override.
	pub fn with_nonce(mut self, nonce: Felt) -> Self {
		self.nonce = Some(nonce);
		self
	}

	/// Sets a max fee override.
	pub fn with_max_fee(mut self, max_fee: Felt) -> Self {
		self.max_fee = Some(max_fee);
		self
	}

	/// Drops nonce and fee overrides so they are re-resolved on the next broadcast.
	pub fn clear_overrides(&mut self) {
		self.nonce = None;
		self.max_fee = None;
	}

	/// Returns the sender address as a `0x`-prefixed hex string.
	pub fn sender_id(&self) -> String {
		felt_to_hex(&self.sender_address)
	}
}

/// Lifecycle state of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
	/// Accepted into the submission queue.
	Queued,
	/// Re-queued after a recoverable failure.
	Retry,
	/// Submitted to the chain and awaiting confirmation.
	Broadcast,
	/// Accepted by the chain. Terminal.
	Confirmed,
	/// Failed; waiting for the retryer to classify the failure.
	Errored,
	/// Failed with a terminal condition. Terminal.
	Fatal,
}

impl TxStatus {
	/// Returns true if no transition leaves this state.
	pub fn is_terminal(&self) -> bool {
		matches!(self, TxStatus::Confirmed | TxStatus::Fatal)
	}
}

impl fmt::Display for TxStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TxStatus::Queued => "QUEUED",
			TxStatus::Retry => "RETRY",
			TxStatus::Broadcast => "BROADCAST",
			TxStatus::Confirmed => "CONFIRMED",
			TxStatus::Errored => "ERRORED",
			TxStatus::Fatal => "FATAL",
		};
		f.write_str(s)
	}
}

/// A transaction tracked by the status store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
	/// Store assigned identifier.
	pub id: String,
	/// The transaction itself.
	pub tx: Transaction,
	/// Current lifecycle state.
	pub status: TxStatus,
	/// Text of the most recent failure.
	pub error: Option<String>,
	/// Number of times the transaction was re-queued.
	pub retry_count: u32,
}

/// Status of a broadcast transaction as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnchainTxStatus {
	/// Not yet accepted nor rejected.
	Pending,
	/// Accepted on L2 or L1.
	Accepted,
	/// Rejected, with the failure reason reported by the chain.
	Rejected(String),
}
