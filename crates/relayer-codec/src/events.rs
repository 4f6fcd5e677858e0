//! Aggregator event decoding.
//!
//! `ConfigSet` and `NewTransmission` events arrive as flat felt arrays. Scalar
//! fields occupy one felt each; variable sections are preceded by their length.
//! A bounds-checked cursor walks the array so a short payload surfaces as
//! `CodecError::Truncated` instead of a panic.

use crate::felt::decode_felts;
use crate::onchain_config::OnchainConfigCodec;
use crate::CodecError;
use crate::report::MAX_OBSERVERS;
use alloy_primitives::{I256, U256};
use chrono::{DateTime, Utc};
use relayer_types::{
	felt_to_hex, felt_to_signed, felt_to_u256, felt_to_u64, ConfigDigest, ContractConfig, Felt,
	TransmissionDetails, FELT_LENGTH,
};

/// Name of the event emitted when a new configuration is set.
pub const CONFIG_SET_EVENT: &str = "ConfigSet";

/// Name of the event emitted for every accepted report.
pub const NEW_TRANSMISSION_EVENT: &str = "NewTransmission";

/// Felts that must follow the observations of a `NewTransmission` event
/// without a gas price: juels, digest, epoch_and_round, reimbursement.
const TRANSMISSION_TAIL_LEN: usize = 4;

/// Decoded `NewTransmission` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransmissionEvent {
	pub round_id: u32,
	pub latest_answer: I256,
	pub transmitter: Felt,
	pub latest_timestamp: DateTime<Utc>,
	/// Observer index of each observation, in report order.
	pub observers: Vec<u8>,
	pub observations_len: u32,
	pub observations: Vec<I256>,
	pub juels_per_fee_coin: U256,
	/// Present only on aggregators that report a gas price.
	pub gas_price: Option<U256>,
	pub config_digest: ConfigDigest,
	pub epoch: u32,
	pub round: u8,
	pub reimbursement: U256,
}

impl NewTransmissionEvent {
	/// Projects the event onto the latest transmission details.
	pub fn transmission_details(&self) -> TransmissionDetails {
		TransmissionDetails {
			digest: self.config_digest,
			epoch: self.epoch,
			round: self.round,
			latest_answer: self.latest_answer,
			latest_timestamp: self.latest_timestamp,
		}
	}
}

struct FeltCursor<'a> {
	felts: &'a [Felt],
	index: usize,
}

impl<'a> FeltCursor<'a> {
	fn new(felts: &'a [Felt]) -> Self {
		Self { felts, index: 0 }
	}

	fn remaining(&self) -> usize {
		self.felts.len() - self.index
	}

	fn take(&mut self, n: usize) -> Result<&'a [Felt], CodecError> {
		let end = self
			.index
			.checked_add(n)
			.filter(|end| *end <= self.felts.len())
			.ok_or(CodecError::Truncated {
				needed: self.index.saturating_add(n),
				available: self.felts.len(),
			})?;
		let section = &self.felts[self.index..end];
		self.index = end;
		Ok(section)
	}

	fn next(&mut self) -> Result<&'a Felt, CodecError> {
		Ok(&self.take(1)?[0])
	}

	fn next_u64(&mut self) -> Result<u64, CodecError> {
		Ok(felt_to_u64(self.next()?)?)
	}

	fn next_len(&mut self) -> Result<usize, CodecError> {
		let len = self.next_u64()?;
		usize::try_from(len).map_err(|e| CodecError::InvalidValue(format!("length: {}", e)))
	}
}

fn narrow<T: TryFrom<u64>>(value: u64, field: &str) -> Result<T, CodecError> {
	T::try_from(value).map_err(|_| CodecError::InvalidValue(format!("{} out of range: {}", field, value)))
}

/// Decodes a `ConfigSet` event into a contract config.
pub fn parse_config_set_event(felts: &[Felt]) -> Result<ContractConfig, CodecError> {
	let mut cursor = FeltCursor::new(felts);

	// previous_config_block_number
	cursor.next()?;

	let config_digest = ConfigDigest::from(*cursor.next()?);
	let config_count = cursor.next_u64()?;

	let oracles_len = cursor.next_len()?;
	let pairs = oracles_len
		.checked_mul(2)
		.ok_or_else(|| CodecError::InvalidValue(format!("oracles_len: {}", oracles_len)))?;
	let oracles = cursor.take(pairs)?;
	let mut signers = Vec::with_capacity(oracles_len);
	let mut transmitters = Vec::with_capacity(oracles_len);
	for pair in oracles.chunks_exact(2) {
		signers.push(pair[0].to_bytes_be().to_vec());
		transmitters.push(felt_to_hex(&pair[1]));
	}

	let f = narrow::<u8>(cursor.next_u64()?, "f")?;

	let onchain_len = cursor.next_len()?;
	let onchain_felts = cursor.take(onchain_len)?;
	if onchain_felts.len() < 3 {
		return Err(CodecError::InvalidOnchainConfig(format!(
			"expected at least 3 felts, got {}",
			onchain_felts.len()
		)));
	}
	let onchain_config = OnchainConfigCodec.encode_from_felts(&onchain_felts[..3])?;

	let offchain_config_version = cursor.next_u64()?;
	let offchain_len = cursor.next_len()?;
	let offchain_config = decode_felts(cursor.take(offchain_len)?)?;

	Ok(ContractConfig {
		config_digest,
		config_count,
		signers,
		transmitters,
		f,
		onchain_config,
		offchain_config_version,
		offchain_config,
	})
}

/// Decodes a `NewTransmission` event.
///
/// The gas price field is detected from the number of felts that follow the
/// observations.
pub fn parse_new_transmission_event(felts: &[Felt]) -> Result<NewTransmissionEvent, CodecError> {
	let mut cursor = FeltCursor::new(felts);

	let round_id = narrow::<u32>(cursor.next_u64()?, "round_id")?;
	let latest_answer = felt_to_signed(cursor.next()?);
	let transmitter = *cursor.next()?;

	let timestamp = narrow::<i64>(cursor.next_u64()?, "observation_timestamp")?;
	let latest_timestamp = DateTime::<Utc>::from_timestamp(timestamp, 0)
		.ok_or_else(|| CodecError::InvalidValue(format!("timestamp: {}", timestamp)))?;

	// observers are packed one byte per observer into the low 31 bytes
	let observers_word = cursor.next()?.to_bytes_be();
	if observers_word[0] != 0 {
		return Err(CodecError::InvalidValue("observers exceed 31 bytes".into()));
	}
	let observers_raw = &observers_word[FELT_LENGTH - MAX_OBSERVERS..];

	let observations_len = narrow::<u32>(cursor.next_u64()?, "observations_len")?;
	let count = observations_len as usize;
	if count > MAX_OBSERVERS {
		return Err(CodecError::InvalidValue(format!(
			"observations_len {} exceeds {}",
			count, MAX_OBSERVERS
		)));
	}
	let observers = observers_raw[..count].to_vec();
	let observations = cursor.take(count)?.iter().map(felt_to_signed).collect();

	let gas_price_included = match cursor.remaining() {
		n if n == TRANSMISSION_TAIL_LEN => false,
		n if n == TRANSMISSION_TAIL_LEN + 1 => true,
		n if n < TRANSMISSION_TAIL_LEN => {
			return Err(CodecError::Truncated {
				needed: felts.len() - n + TRANSMISSION_TAIL_LEN,
				available: felts.len(),
			})
		},
		n => {
			return Err(CodecError::InvalidValue(format!(
				"unexpected {} trailing felts after observations",
				n
			)))
		},
	};

	let juels_per_fee_coin = felt_to_u256(cursor.next()?);
	let gas_price = if gas_price_included {
		Some(felt_to_u256(cursor.next()?))
	} else {
		None
	};
	let config_digest = ConfigDigest::from(*cursor.next()?);
	let (epoch, round) = unpack_epoch_and_round(cursor.next()?);
	let reimbursement = felt_to_u256(cursor.next()?);

	Ok(NewTransmissionEvent {
		round_id,
		latest_answer,
		transmitter,
		latest_timestamp,
		observers,
		observations_len,
		observations,
		juels_per_fee_coin,
		gas_price,
		config_digest,
		epoch,
		round,
		reimbursement,
	})
}

/// Splits a packed `epoch_and_round` felt.
///
/// Only the low five bytes are meaningful: the upper four of them hold the
/// epoch and the last one the round.
pub fn unpack_epoch_and_round(felt: &Felt) -> (u32, u8) {
	let bytes = felt.to_bytes_be();
	let epoch = u32::from_be_bytes([bytes[27], bytes[28], bytes[29], bytes[30]]);
	(epoch, bytes[31])
}

/// Packs an epoch and round into the felt layout read by `unpack_epoch_and_round`.
pub fn pack_epoch_and_round(epoch: u32, round: u8) -> Felt {
	Felt::from(((epoch as u64) << 8) | round as u64)
}
