//! OCR2 contract access for the Starknet relayer.
//!
//! `ContractReader` turns raw contract calls and events into OCR2 records,
//! `ContractConfigCache` keeps the latest of them in memory with a freshness
//! bound, and `ContractTransmitter` submits signed reports through the
//! transaction manager.

use async_trait::async_trait;
use relayer_codec::CodecError;
use relayer_types::Felt;
use thiserror::Error;

pub mod cache;
pub mod reader;
pub mod transmitter;

pub use cache::{CacheConfig, CacheError, ContractConfigCache};
pub use reader::ContractReader;
pub use transmitter::{transmit_calldata, ContractTransmitter, ReportContext, TransmitterError};

/// Errors that can occur while reading contract state.
#[derive(Debug, Error)]
pub enum ReaderError {
	/// Error that occurs when the node cannot be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a call returns an unexpected shape.
	#[error("Unexpected result: {0}")]
	UnexpectedResult(String),
	/// Error that occurs when the expected event is absent from a block.
	#[error("{event} event not found in block {block}")]
	MissingEvent { event: &'static str, block: u64 },
	/// Error that occurs when returned data cannot be decoded.
	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),
}

/// Read access to Starknet contract state.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Calls a view entry point and returns its result felts.
	async fn call_contract(
		&self,
		address: &Felt,
		selector: &Felt,
		calldata: &[Felt],
	) -> Result<Vec<Felt>, ReaderError>;

	/// Returns the data of every event emitted by `address` in `block` whose
	/// first key is `key`, in emission order.
	async fn events(
		&self,
		address: &Felt,
		block: u64,
		key: &Felt,
	) -> Result<Vec<Vec<Felt>>, ReaderError>;

	/// Returns the number of the latest accepted block.
	async fn latest_block_height(&self) -> Result<u64, ReaderError>;
}
