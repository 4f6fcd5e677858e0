//! Codecs for Starknet's felt-based data formats.
//!
//! This module converts between OCR2 structures and the flat felt arrays the
//! aggregator contract reads and emits. It covers byte buffer chunking, event
//! decoding, the median report layout, the median onchain config, and the
//! config digest computation shared by onchain and offchain parties.
//!
//! All decoders are all-or-nothing: malformed input yields a `CodecError` and no
//! partially decoded value.

use relayer_types::FeltError;
use thiserror::Error;

pub mod digest;
pub mod events;
pub mod felt;
pub mod onchain_config;
pub mod report;

pub use digest::{ConfigDigester, CONFIG_DIGEST_PREFIX};
pub use events::{
	pack_epoch_and_round, parse_config_set_event, parse_new_transmission_event,
	unpack_epoch_and_round, NewTransmissionEvent, CONFIG_SET_EVENT, NEW_TRANSMISSION_EVENT,
};
pub use felt::{decode_felts, encode_felts};
pub use onchain_config::{OnchainConfig, OnchainConfigCodec, ONCHAIN_CONFIG_VERSION};
pub use report::{split_report, MedianReportCodec, ParsedAttributedObservation, MAX_OBSERVERS};

/// Errors that can occur while encoding or decoding felt payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
	/// Error that occurs when a felt array that must carry a length prefix is empty.
	#[error("Empty felt array")]
	Empty,
	/// Error that occurs when a payload is shorter than its layout requires.
	#[error("Truncated payload: need {needed} felts, have {available}")]
	Truncated { needed: usize, available: usize },
	/// Error that occurs when decoded data is shorter than its declared length.
	#[error("Invalid: contained less bytes than the specified length: expected {expected}, got {actual}")]
	ShortData { expected: usize, actual: usize },
	/// Error that occurs when a chunk holds more bytes than its slot allows.
	#[error("Chunk {index} does not fit in {width} bytes")]
	ChunkOverflow { index: usize, width: usize },
	/// Error that occurs when a report is malformed.
	#[error("Invalid report: {0}")]
	InvalidReport(String),
	/// Error that occurs when an onchain config is malformed.
	#[error("Invalid onchain config: {0}")]
	InvalidOnchainConfig(String),
	/// Error that occurs when a field holds a value outside its allowed range.
	#[error("Invalid value: {0}")]
	InvalidValue(String),
	/// Error that occurs when converting to or from a felt fails.
	#[error("Felt error: {0}")]
	Felt(#[from] FeltError),
}
