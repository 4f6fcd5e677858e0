//! Byte buffer chunking into felts.
//!
//! A buffer is encoded as its length followed by 31-byte big-endian chunks, the
//! widest chunk that always stays below the field modulus. The final chunk holds
//! whatever bytes remain.

use crate::CodecError;
use relayer_types::{felt_to_u64, Felt, CHUNK_SIZE, FELT_LENGTH};

/// Encodes `data` as a length felt followed by 31-byte chunks.
pub fn encode_felts(data: &[u8]) -> Vec<Felt> {
	let mut felts = Vec::with_capacity(1 + data.len().div_ceil(CHUNK_SIZE));
	felts.push(Felt::from(data.len() as u64));
	for chunk in data.chunks(CHUNK_SIZE) {
		felts.push(Felt::from_bytes_be_slice(chunk));
	}
	felts
}

/// Decodes a length-prefixed felt array back into bytes.
///
/// Each chunk contributes `min(31, remaining)` bytes. Felts after the declared
/// length has been satisfied are ignored.
pub fn decode_felts(felts: &[Felt]) -> Result<Vec<u8>, CodecError> {
	let (length_felt, chunks) = felts.split_first().ok_or(CodecError::Empty)?;
	let length = usize::try_from(felt_to_u64(length_felt)?)
		.map_err(|e| CodecError::InvalidValue(format!("length: {}", e)))?;

	let mut data = Vec::with_capacity(length.min(chunks.len() * CHUNK_SIZE));
	let mut remaining = length;
	for (index, chunk) in chunks.iter().enumerate() {
		if remaining == 0 {
			break;
		}
		let width = remaining.min(CHUNK_SIZE);
		let bytes = chunk.to_bytes_be();
		let (high, low) = bytes.split_at(FELT_LENGTH - width);
		if high.iter().any(|b| *b != 0) {
			return Err(CodecError::ChunkOverflow { index, width });
		}
		data.extend_from_slice(low);
		remaining -= width;
	}

	if remaining > 0 {
		return Err(CodecError::ShortData {
			expected: length,
			actual: data.len(),
		});
	}
	Ok(data)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip() {
		for len in [0usize, 1, 30, 31, 32, 61, 62, 63, 100, 310] {
			let data: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
			let felts = encode_felts(&data);
			assert_eq!(felts.len(), 1 + len.div_ceil(CHUNK_SIZE));
			assert_eq!(decode_felts(&felts).unwrap(), data, "length {}", len);
		}
	}

	#[test]
	fn test_round_trip_preserves_leading_zeros() {
		let data = vec![0u8; 40];
		assert_eq!(decode_felts(&encode_felts(&data)).unwrap(), data);
	}

	#[test]
	fn test_single_byte_encoding() {
		assert_eq!(encode_felts(&[1]), vec![Felt::ONE, Felt::ONE]);
	}

	#[test]
	fn test_decode_empty_fails() {
		assert_eq!(decode_felts(&[]), Err(CodecError::Empty));
	}

	#[test]
	fn test_decode_short_fails() {
		let mut felts = encode_felts(&[9u8; 40]);
		felts.pop();
		assert_eq!(
			decode_felts(&felts),
			Err(CodecError::ShortData {
				expected: 40,
				actual: 31
			})
		);
	}

	#[test]
	fn test_decode_oversized_chunk_fails() {
		// declares 1 byte but the chunk holds two
		let felts = vec![Felt::ONE, Felt::from(0x0102u64)];
		assert_eq!(
			decode_felts(&felts),
			Err(CodecError::ChunkOverflow { index: 0, width: 1 })
		);
	}

	#[test]
	fn test_decode_ignores_trailing_felts() {
		let mut felts = encode_felts(&[5, 6]);
		felts.push(Felt::from(77u64));
		assert_eq!(decode_felts(&felts).unwrap(), vec![5, 6]);
	}
}
