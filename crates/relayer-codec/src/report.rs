//! OCR2 median report codec.
//!
//! Report layout, one 32-byte big-endian word per field:
//!
//! ```text
//! timestamp | observers | observations_len | observations... | juels_per_fee_coin [| gas_price]
//! ```
//!
//! Observations are signed felts sorted by value. The observers word holds one
//! observer index per byte in its low 31 bytes, leaving the top byte zero so the
//! word is always a valid felt.

use crate::CodecError;
use alloy_primitives::{I256, U256};
use relayer_types::{felt_from_bytes, felt_from_signed, felt_to_signed, u256_to_felt, Felt, FELT_LENGTH};

/// Maximum number of observations in a report.
pub const MAX_OBSERVERS: usize = 31;

/// Upper bound (exclusive) accepted for the encoded observation count.
const MAX_ENCODED_OBSERVATIONS: usize = i8::MAX as usize;

/// timestamp, observers and observations_len.
const PREFIX_LENGTH: usize = 3 * FELT_LENGTH;

/// A single oracle's observation, as produced by the median plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttributedObservation {
	pub timestamp: u32,
	pub value: I256,
	pub juels_per_fee_coin: U256,
	pub gas_price: U256,
	pub observer: u8,
}

/// Builds and parses median reports.
///
/// `MedianReportCodec::default()` produces the layout without a gas price;
/// `with_gas_price` appends the median gas price as a final word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MedianReportCodec {
	include_gas_price: bool,
}

impl MedianReportCodec {
	/// Codec for aggregators that also record a gas price.
	pub fn with_gas_price() -> Self {
		Self {
			include_gas_price: true,
		}
	}

	/// Returns the exact report length for `n` observations.
	pub fn max_report_length(&self, n: usize) -> usize {
		PREFIX_LENGTH + n * FELT_LENGTH + self.suffix_length()
	}

	fn suffix_length(&self) -> usize {
		if self.include_gas_price {
			2 * FELT_LENGTH
		} else {
			FELT_LENGTH
		}
	}

	/// Encodes a report from attributed observations.
	///
	/// The timestamp and juels per fee coin are the lower-middle element when
	/// observations are sorted by that field.
	pub fn build_report(
		&self,
		observations: &[ParsedAttributedObservation],
	) -> Result<Vec<u8>, CodecError> {
		let n = observations.len();
		if n == 0 {
			return Err(CodecError::InvalidReport(
				"cannot build report from empty attributed observations".into(),
			));
		}
		if n > MAX_OBSERVERS {
			return Err(CodecError::InvalidReport(format!(
				"{} observations exceed the maximum of {}",
				n, MAX_OBSERVERS
			)));
		}

		let mut working = observations.to_vec();

		working.sort_by_key(|o| o.timestamp);
		let timestamp = working[n / 2].timestamp;

		working.sort_by(|a, b| a.juels_per_fee_coin.cmp(&b.juels_per_fee_coin));
		let juels_per_fee_coin = working[n / 2].juels_per_fee_coin;

		working.sort_by(|a, b| a.gas_price.cmp(&b.gas_price));
		let gas_price = working[n / 2].gas_price;

		let mut observers = [0u8; FELT_LENGTH];
		for (slot, observation) in observers[1..].iter_mut().zip(observations) {
			*slot = observation.observer;
		}

		working.sort_by(|a, b| a.value.cmp(&b.value));

		let mut report = Vec::with_capacity(self.max_report_length(n));
		report.extend_from_slice(&Felt::from(timestamp as u64).to_bytes_be());
		report.extend_from_slice(&observers);
		report.extend_from_slice(&Felt::from(n as u64).to_bytes_be());
		for observation in &working {
			report.extend_from_slice(&felt_from_signed(&observation.value)?.to_bytes_be());
		}
		report.extend_from_slice(&u256_to_felt(&juels_per_fee_coin)?.to_bytes_be());
		if self.include_gas_price {
			report.extend_from_slice(&u256_to_felt(&gas_price)?.to_bytes_be());
		}
		Ok(report)
	}

	/// Extracts the median observation from an encoded report.
	pub fn median_from_report(&self, report: &[u8]) -> Result<I256, CodecError> {
		let len = report.len();
		if len < PREFIX_LENGTH + self.suffix_length() {
			return Err(CodecError::InvalidReport(format!(
				"invalid report length {}",
				len
			)));
		}
		if len % FELT_LENGTH != 0 {
			return Err(CodecError::InvalidReport(format!(
				"report length {} is not a multiple of {}",
				len, FELT_LENGTH
			)));
		}

		let count_word = &report[2 * FELT_LENGTH..PREFIX_LENGTH];
		if count_word[..FELT_LENGTH - 8].iter().any(|b| *b != 0) {
			return Err(CodecError::InvalidReport("length of observations is invalid".into()));
		}
		let mut count_bytes = [0u8; 8];
		count_bytes.copy_from_slice(&count_word[FELT_LENGTH - 8..]);
		let n = u64::from_be_bytes(count_bytes) as usize;
		if n == 0 {
			return Err(CodecError::InvalidReport("unpacked report has no observations".into()));
		}
		if n >= MAX_ENCODED_OBSERVATIONS {
			return Err(CodecError::InvalidReport("length of observations is invalid".into()));
		}
		if len != self.max_report_length(n) {
			return Err(CodecError::InvalidReport(format!(
				"report declares {} observations but is {} bytes long, expected {}",
				n,
				len,
				self.max_report_length(n)
			)));
		}

		let observations = report[PREFIX_LENGTH..PREFIX_LENGTH + n * FELT_LENGTH]
			.chunks_exact(FELT_LENGTH)
			.map(|word| felt_from_bytes(word).map(|felt| felt_to_signed(&felt)))
			.collect::<Result<Vec<_>, _>>()?;

		if observations.windows(2).any(|pair| pair[0] > pair[1]) {
			return Err(CodecError::InvalidReport("observations not sorted".into()));
		}

		Ok(observations[n / 2])
	}
}

/// Splits a report into 32-byte words, each read as a felt.
pub fn split_report(report: &[u8]) -> Result<Vec<Felt>, CodecError> {
	if report.len() % FELT_LENGTH != 0 {
		return Err(CodecError::InvalidReport(format!(
			"report length {} is not a multiple of {}",
			report.len(),
			FELT_LENGTH
		)));
	}
	report
		.chunks_exact(FELT_LENGTH)
		.map(|word| felt_from_bytes(word).map_err(CodecError::from))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn observation(value: i64, observer: u8) -> ParsedAttributedObservation {
		ParsedAttributedObservation {
			timestamp: 100 + observer as u32,
			value: I256::try_from(value).unwrap(),
			juels_per_fee_coin: U256::from(1_000u64 + observer as u64),
			gas_price: U256::from(1u64),
			observer,
		}
	}

	fn observations(values: &[i64]) -> Vec<ParsedAttributedObservation> {
		values
			.iter()
			.enumerate()
			.map(|(i, v)| observation(*v, i as u8))
			.collect()
	}

	fn median_of(values: &[i64]) -> I256 {
		let codec = MedianReportCodec::default();
		let report = codec.build_report(&observations(values)).unwrap();
		codec.median_from_report(&report).unwrap()
	}

	#[test]
	fn test_median_cases() {
		assert_eq!(median_of(&[10, 0, 20]), I256::try_from(10i64).unwrap());
		assert_eq!(median_of(&[1; 31]), I256::try_from(1i64).unwrap());
		assert_eq!(median_of(&[-2, -1]), I256::try_from(-1i64).unwrap());
		assert_eq!(median_of(&[5]), I256::try_from(5i64).unwrap());
	}

	#[test]
	fn test_report_layout() {
		let codec = MedianReportCodec::default();
		let report = codec.build_report(&observations(&[10, 0, 20])).unwrap();
		assert_eq!(report.len(), codec.max_report_length(3));
		assert_eq!(report.len(), 32 * 7);

		// timestamps 100, 101, 102: median 101
		assert_eq!(report[31], 101);
		// observers captured in input order below a zero top byte
		assert_eq!(report[32], 0);
		assert_eq!(&report[33..36], &[0, 1, 2]);
		assert_eq!(report[95], 3);
		// value ascending
		assert_eq!(report[127], 0);
		assert_eq!(report[159], 10);
		assert_eq!(report[191], 20);
		// juels median 1001 = 0x03e9
		assert_eq!(&report[222..224], &[0x03, 0xe9]);
	}

	#[test]
	fn test_gas_price_layout() {
		let codec = MedianReportCodec::with_gas_price();
		let report = codec.build_report(&observations(&[3, 1])).unwrap();
		assert_eq!(report.len(), codec.max_report_length(2));
		assert_eq!(report.len(), 32 * 7);
		assert_eq!(report[report.len() - 1], 1);
		assert_eq!(codec.median_from_report(&report).unwrap(), I256::try_from(3i64).unwrap());
		// the plain codec rejects the longer layout
		assert!(MedianReportCodec::default().median_from_report(&report).is_err());
	}

	#[test]
	fn test_count_matches_observations() {
		let codec = MedianReportCodec::default();
		for n in 1..=MAX_OBSERVERS {
			let values: Vec<i64> = (0..n as i64).collect();
			let report = codec.build_report(&observations(&values)).unwrap();
			assert_eq!(report[95] as usize, n);
			assert_eq!(report.len(), codec.max_report_length(n));
		}
	}

	#[test]
	fn test_build_rejects_bad_input() {
		let codec = MedianReportCodec::default();
		assert!(codec.build_report(&[]).is_err());
		assert!(codec.build_report(&observations(&[1; 32])).is_err());
	}

	#[test]
	fn test_median_rejects_malformed_reports() {
		let codec = MedianReportCodec::default();
		let report = codec.build_report(&observations(&[1, 2, 3])).unwrap();

		assert!(codec.median_from_report(&report[..64]).is_err());
		assert!(codec.median_from_report(&report[..report.len() - 1]).is_err());
		assert!(codec.median_from_report(&report[..report.len() - 32]).is_err());

		let mut zero_count = report.clone();
		zero_count[95] = 0;
		assert!(codec.median_from_report(&zero_count).is_err());

		let mut huge_count = report.clone();
		huge_count[95] = 127;
		assert!(codec.median_from_report(&huge_count).is_err());

		let mut unsorted = report.clone();
		unsorted[127] = 9;
		assert_eq!(
			codec.median_from_report(&unsorted),
			Err(CodecError::InvalidReport("observations not sorted".into()))
		);
	}

	#[test]
	fn test_split_report() {
		let codec = MedianReportCodec::default();
		let report = codec.build_report(&observations(&[7, 8])).unwrap();
		let felts = split_report(&report).unwrap();
		assert_eq!(felts.len(), 6);
		assert_eq!(felts[2], Felt::from(2u64));
		assert_eq!(felts[3], Felt::from(7u64));
		assert!(split_report(&report[..33]).is_err());
	}
}
