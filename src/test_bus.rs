//! A deterministic, hardware-free [`Bus`] for test scripts.

use std::collections::VecDeque;
use std::time::Duration;

use crate::bus::Bus;
use crate::decoder::Decoder;
use crate::error::{ExpectationError, ReadError};
use crate::packet::{encode_instruction, encode_status, ErrorFlags, StatusPacket};

/// A command the driver is expected to put on the wire.
#[derive(Debug, Clone)]
pub enum ExpectedCommand {
	/// The exact bytes, including preamble and checksum.
	Raw(Vec<u8>),

	/// A structured command, encoded through the codec before comparison.
	Instruction { id: u8, instruction: u8, parameters: Vec<u8> },
}

impl ExpectedCommand {
	fn to_bytes(&self) -> Vec<u8> {
		match self {
			Self::Raw(bytes) => bytes.clone(),
			Self::Instruction { id, instruction, parameters } => encode_instruction(*id, *instruction, parameters),
		}
	}
}

/// A response directive played back on the next status read.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
	/// Raw bytes, run through the real decoder.
	///
	/// Deliberately corrupt bytes can be scripted to exercise
	/// framing and checksum error handling.
	Raw(Vec<u8>),

	/// A well-formed status packet.
	Status { id: u8, error: ErrorFlags, parameters: Vec<u8> },

	/// The device stays silent and the read times out.
	Timeout,

	/// No read must happen at all.
	///
	/// Queued after a broadcast or a status-suppressed write.
	/// A driver that still reads fails the script with an unexpected read.
	NoResponse,
}

/// A scripted implementation of [`Bus`].
///
/// Expected commands and scripted responses are queued up front;
/// the driver under test then consumes them in order.
/// Call [`TestBus::finish`] at the end of a script:
/// a clean run leaves both queues empty.
#[derive(Debug, Default)]
pub struct TestBus {
	expected_commands: VecDeque<ExpectedCommand>,
	scripted_responses: VecDeque<ScriptedResponse>,
}

impl TestBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue an exact byte sequence the driver must write next.
	pub fn expect_raw(&mut self, bytes: impl Into<Vec<u8>>) {
		self.expected_commands.push_back(ExpectedCommand::Raw(bytes.into()));
	}

	/// Queue a structured command expectation.
	pub fn expect_instruction(&mut self, id: u8, instruction: u8, parameters: impl Into<Vec<u8>>) {
		self.expected_commands.push_back(ExpectedCommand::Instruction {
			id,
			instruction,
			parameters: parameters.into(),
		});
	}

	/// Queue raw response bytes.
	pub fn respond_raw(&mut self, bytes: impl Into<Vec<u8>>) {
		self.scripted_responses.push_back(ScriptedResponse::Raw(bytes.into()));
	}

	/// Queue a well-formed status response.
	pub fn respond_status(&mut self, id: u8, error: ErrorFlags, parameters: impl Into<Vec<u8>>) {
		self.scripted_responses.push_back(ScriptedResponse::Status {
			id,
			error,
			parameters: parameters.into(),
		});
	}

	/// Queue a timeout for the next status read.
	pub fn respond_timeout(&mut self) {
		self.scripted_responses.push_back(ScriptedResponse::Timeout);
	}

	/// Declare that the driver must not read a status at all.
	pub fn respond_none(&mut self) {
		self.scripted_responses.push_back(ScriptedResponse::NoResponse);
	}

	/// Check that every expectation was consumed.
	pub fn finish(&mut self) -> Result<(), ExpectationError> {
		// A trailing NoResponse directive is satisfied by not reading.
		while let Some(ScriptedResponse::NoResponse) = self.scripted_responses.front() {
			self.scripted_responses.pop_front();
		}

		if self.expected_commands.is_empty() && self.scripted_responses.is_empty() {
			Ok(())
		} else {
			Err(ExpectationError::Leftover {
				commands: self.expected_commands.len(),
				responses: self.scripted_responses.len(),
			})
		}
	}
}

impl Bus for TestBus {
	type Error = ExpectationError;

	fn write_packet(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
		// Leading NoResponse directives were satisfied by not reading
		// after the previous command.
		while let Some(ScriptedResponse::NoResponse) = self.scripted_responses.front() {
			self.scripted_responses.pop_front();
		}

		let Some(expected) = self.expected_commands.pop_front() else {
			return Err(ExpectationError::UnexpectedWrite { actual: packet.to_vec() });
		};

		let expected = expected.to_bytes();
		if expected != packet {
			return Err(ExpectationError::Mismatch {
				expected,
				actual: packet.to_vec(),
			});
		}
		Ok(())
	}

	fn read_status_packet(&mut self, _timeout: Duration) -> Result<StatusPacket, ReadError<Self::Error>> {
		let Some(response) = self.scripted_responses.pop_front() else {
			return Err(ReadError::Io(ExpectationError::UnexpectedRead));
		};

		match response {
			ScriptedResponse::Raw(bytes) => {
				let mut decoder = Decoder::new();
				for byte in bytes {
					match decoder.push(byte) {
						Ok(None) => (),
						Ok(Some(packet)) => return Ok(packet),
						Err(e) => return Err(e.into()),
					}
				}
				// A scripted response that decodes to nothing acts like silence.
				Err(ReadError::Timeout)
			},
			ScriptedResponse::Status { id, error, parameters } => Ok(StatusPacket { id, error, parameters }),
			ScriptedResponse::Timeout => Err(ReadError::Timeout),
			ScriptedResponse::NoResponse => Err(ReadError::Io(ExpectationError::UnexpectedRead)),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::packet::instruction_id;
	use assert2::{assert, let_assert};

	#[test]
	fn matches_raw_and_structured_expectations() {
		let mut bus = TestBus::new();
		bus.expect_raw([0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
		bus.expect_instruction(1, instruction_id::PING, []);

		let ping = encode_instruction(1, instruction_id::PING, &[]);
		assert!(bus.write_packet(&ping) == Ok(()));
		assert!(bus.write_packet(&ping) == Ok(()));
		assert!(bus.finish() == Ok(()));
	}

	#[test]
	fn reports_mismatched_write() {
		let mut bus = TestBus::new();
		bus.expect_instruction(1, instruction_id::PING, []);

		let reset = encode_instruction(1, instruction_id::RESET, &[]);
		let_assert!(Err(ExpectationError::Mismatch { expected, actual }) = bus.write_packet(&reset));
		assert!(expected == encode_instruction(1, instruction_id::PING, &[]));
		assert!(actual == reset);
	}

	#[test]
	fn reports_unexpected_write_and_read() {
		let mut bus = TestBus::new();
		let ping = encode_instruction(1, instruction_id::PING, &[]);
		let_assert!(Err(ExpectationError::UnexpectedWrite { .. }) = bus.write_packet(&ping));
		let_assert!(Err(ReadError::Io(ExpectationError::UnexpectedRead)) = bus.read_status_packet(Duration::ZERO));
	}

	#[test]
	fn plays_back_scripted_responses() {
		let mut bus = TestBus::new();
		bus.respond_raw(encode_status(1, ErrorFlags::new(0), &[0x20]));
		bus.respond_status(2, ErrorFlags::new(0x04), vec![]);
		bus.respond_timeout();

		let_assert!(Ok(status) = bus.read_status_packet(Duration::ZERO));
		assert!(status.id == 1);
		assert!(status.parameters == [0x20]);

		let_assert!(Ok(status) = bus.read_status_packet(Duration::ZERO));
		assert!(status.error == ErrorFlags::new(0x04));

		let_assert!(Err(ReadError::Timeout) = bus.read_status_packet(Duration::ZERO));
		assert!(bus.finish() == Ok(()));
	}

	#[test]
	fn no_response_directive_fails_a_read() {
		let mut bus = TestBus::new();
		bus.respond_none();
		let_assert!(Err(ReadError::Io(ExpectationError::UnexpectedRead)) = bus.read_status_packet(Duration::ZERO));
	}

	#[test]
	fn leftover_expectations_fail_the_script() {
		let mut bus = TestBus::new();
		bus.expect_instruction(1, instruction_id::PING, []);
		bus.respond_timeout();
		let_assert!(Err(ExpectationError::Leftover { commands: 1, responses: 1 }) = bus.finish());
	}

	#[test]
	fn corrupt_scripted_response_surfaces_a_checksum_error() {
		let mut bus = TestBus::new();
		let mut bytes = encode_status(1, ErrorFlags::new(0), &[0x20]);
		*bytes.last_mut().unwrap() ^= 0xFF;
		bus.respond_raw(bytes);
		let_assert!(Err(ReadError::Checksum(_)) = bus.read_status_packet(Duration::ZERO));
	}
}
