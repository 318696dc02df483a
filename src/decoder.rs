//! Byte-by-byte parser for status packets.

use crate::error::{DecodeError, FramingError, InvalidChecksum};
use crate::packet::{ErrorFlags, StatusPacket};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
	WaitPre1,
	WaitPre2,
	ReadId,
	ReadLen,
	ReadError,
	ReadParameters,
	ReadChecksum,
}

/// An incremental parser that turns a byte stream into status packets.
///
/// Feed bytes one at a time with [`Decoder::push`].
/// The decoder can be driven from interleaved reads of any size,
/// and resets itself after every completed packet or error,
/// so the next valid preamble in the stream starts a fresh packet.
#[derive(Debug)]
pub struct Decoder {
	state: State,
	packet_id: u8,
	length: u8,
	error: u8,
	parameters: Vec<u8>,
}

impl Decoder {
	pub fn new() -> Self {
		Self {
			state: State::WaitPre1,
			packet_id: 0,
			length: 0,
			error: 0,
			parameters: Vec::new(),
		}
	}

	/// Discard any partially parsed packet and wait for a new preamble.
	pub fn reset(&mut self) {
		self.state = State::WaitPre1;
		self.parameters.clear();
	}

	/// Consume one byte from the stream.
	///
	/// Returns `Ok(Some(packet))` when the byte completed a packet,
	/// `Ok(None)` when more bytes are needed,
	/// and an error when the stream could not be parsed.
	/// After an error the decoder is reset and can keep consuming bytes.
	pub fn push(&mut self, byte: u8) -> Result<Option<StatusPacket>, DecodeError> {
		match self.state {
			State::WaitPre1 => {
				// Bytes between packets are garbage and skipped silently.
				if byte == 0xFF {
					self.state = State::WaitPre2;
				}
			},
			State::WaitPre2 => {
				if byte != 0xFF {
					self.reset();
					return Err(FramingError::InvalidPreamble { byte }.into());
				}
				self.state = State::ReadId;
			},
			State::ReadId => {
				// In a run of three or more 0xFF bytes,
				// only the last two count as the preamble.
				if byte != 0xFF {
					self.packet_id = byte;
					self.state = State::ReadLen;
				}
			},
			State::ReadLen => {
				if !(2..=253).contains(&byte) {
					self.reset();
					return Err(FramingError::InvalidLength { length: byte }.into());
				}
				self.length = byte;
				self.state = State::ReadError;
			},
			State::ReadError => {
				self.error = byte;
				self.parameters.clear();
				self.state = if self.length == 2 {
					State::ReadChecksum
				} else {
					State::ReadParameters
				};
			},
			State::ReadParameters => {
				self.parameters.push(byte);
				if self.parameters.len() == usize::from(self.length) - 2 {
					self.state = State::ReadChecksum;
				}
			},
			State::ReadChecksum => {
				let computed = self.computed_checksum();
				let packet = StatusPacket {
					id: self.packet_id,
					error: ErrorFlags::new(self.error),
					parameters: std::mem::take(&mut self.parameters),
				};
				self.reset();
				InvalidChecksum::check(byte, computed)?;
				return Ok(Some(packet));
			},
		}

		Ok(None)
	}

	fn computed_checksum(&self) -> u8 {
		let mut sum = u16::from(self.packet_id);
		sum = sum.wrapping_add(self.length.into());
		sum = sum.wrapping_add(self.error.into());
		for &byte in &self.parameters {
			sum = sum.wrapping_add(byte.into());
		}
		!(sum as u8)
	}
}

impl Default for Decoder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::packet::encode_status;
	use assert2::{assert, let_assert};

	fn feed(decoder: &mut Decoder, bytes: &[u8]) -> Vec<Result<StatusPacket, DecodeError>> {
		let mut results = Vec::new();
		for &byte in bytes {
			match decoder.push(byte) {
				Ok(Some(packet)) => results.push(Ok(packet)),
				Ok(None) => (),
				Err(e) => results.push(Err(e)),
			}
		}
		results
	}

	#[test]
	fn decodes_encoded_packets() {
		let mut decoder = Decoder::new();
		for parameters in [&[][..], &[0x20][..], &[0xFF, 0x03][..]] {
			let bytes = encode_status(1, ErrorFlags::new(0), parameters);
			let results = feed(&mut decoder, &bytes);
			let_assert!([Ok(packet)] = &results[..]);
			assert!(packet.id == 1);
			assert!(packet.error.is_normal());
			assert!(packet.parameters == parameters);
		}
	}

	#[test]
	fn decodes_error_flags() {
		let mut decoder = Decoder::new();
		let results = feed(&mut decoder, &[0xFF, 0xFF, 0x01, 0x02, 0x04, 0xF8]);
		let_assert!([Ok(packet)] = &results[..]);
		assert!(packet.error == ErrorFlags::new(0x04));
		assert!(packet.parameters.is_empty());
	}

	#[test]
	fn skips_garbage_before_preamble() {
		let mut decoder = Decoder::new();
		let mut bytes = vec![0x12, 0x34, 0x56];
		bytes.extend(encode_status(2, ErrorFlags::new(0), &[]));
		let results = feed(&mut decoder, &bytes);
		let_assert!([Ok(packet)] = &results[..]);
		assert!(packet.id == 2);
	}

	#[test]
	fn triple_preamble_uses_last_two_bytes() {
		// 0xFF 0xFF 0xFF <id> ...: the first 0xFF is line noise.
		let mut decoder = Decoder::new();
		let results = feed(&mut decoder, &[0xFF, 0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC]);
		let_assert!([Ok(packet)] = &results[..]);
		assert!(packet.id == 1);
	}

	#[test]
	fn lone_preamble_byte_is_a_framing_error() {
		let mut decoder = Decoder::new();
		let results = feed(&mut decoder, &[0xFF, 0x42]);
		let_assert!([Err(DecodeError::Framing(FramingError::InvalidPreamble { byte: 0x42 }))] = &results[..]);
	}

	#[test]
	fn invalid_length_is_a_framing_error() {
		let mut decoder = Decoder::new();
		let results = feed(&mut decoder, &[0xFF, 0xFF, 0x01, 0x01]);
		let_assert!([Err(DecodeError::Framing(FramingError::InvalidLength { length: 1 }))] = &results[..]);

		let results = feed(&mut decoder, &[0xFF, 0xFF, 0x01, 0xFE]);
		let_assert!([Err(DecodeError::Framing(FramingError::InvalidLength { length: 0xFE }))] = &results[..]);
	}

	#[test]
	fn checksum_mismatch_is_reported() {
		let mut decoder = Decoder::new();
		let mut bytes = encode_status(1, ErrorFlags::new(0), &[0x20]);
		*bytes.last_mut().unwrap() ^= 0xFF;
		let results = feed(&mut decoder, &bytes);
		let_assert!([Err(DecodeError::Checksum(e))] = &results[..]);
		assert!(e.computed == 0xDB);
	}

	#[test]
	fn resyncs_after_framing_error() {
		let mut decoder = Decoder::new();
		let mut bytes = vec![0xFF, 0x00];
		bytes.extend(encode_status(3, ErrorFlags::new(0), &[0x01]));
		let results = feed(&mut decoder, &bytes);
		let_assert!([Err(_), Ok(packet)] = &results[..]);
		assert!(packet.id == 3);
	}

	#[test]
	fn resyncs_after_checksum_error() {
		let mut decoder = Decoder::new();
		let mut bytes = encode_status(1, ErrorFlags::new(0), &[0x20]);
		*bytes.last_mut().unwrap() ^= 0xFF;
		bytes.extend(encode_status(1, ErrorFlags::new(0), &[0x21]));
		let results = feed(&mut decoder, &bytes);
		let_assert!([Err(DecodeError::Checksum(_)), Ok(packet)] = &results[..]);
		assert!(packet.parameters == [0x21]);
	}
}
