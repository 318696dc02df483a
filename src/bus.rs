//! The [`Bus`] trait and the serial port implementation of it.

use log::trace;
use std::time::{Duration, Instant};

use crate::decoder::Decoder;
use crate::error::ReadError;
use crate::packet::{StatusPacket, HEADER_PREFIX};

/// A half-duplex link that carries instruction packets out and status packets back.
///
/// Implemented by [`SerialBus`] for real hardware
/// and by [`TestBus`][crate::TestBus] for hardware-free tests.
pub trait Bus {
	/// The error type returned by the underlying transport.
	type Error: std::fmt::Debug + std::fmt::Display;

	/// Write one encoded instruction packet as a single atomic write.
	fn write_packet(&mut self, packet: &[u8]) -> Result<(), Self::Error>;

	/// Read one status packet, waiting at most `timeout`.
	fn read_status_packet(&mut self, timeout: Duration) -> Result<StatusPacket, ReadError<Self::Error>>;
}

/// A [`Bus`] over a real serial port.
///
/// The port must be configured in raw mode with 8 bit characters,
/// no parity and one stop bit.
pub struct SerialBus {
	port: serial2::SerialPort,

	/// Bytes received but not yet consumed by the decoder.
	pending: Vec<u8>,
}

impl SerialBus {
	/// Open a serial port with the given baud rate.
	pub fn open(path: impl AsRef<std::path::Path>, baud_rate: u32) -> std::io::Result<Self> {
		let port = serial2::SerialPort::open(path, baud_rate)?;
		Ok(Self::new(port))
	}

	/// Create a bus for an already configured serial port.
	pub fn new(port: serial2::SerialPort) -> Self {
		Self {
			port,
			pending: Vec::new(),
		}
	}

	/// Get a reference to the underlying serial port.
	pub fn port(&self) -> &serial2::SerialPort {
		&self.port
	}

	/// Consume the bus to get ownership of the serial port.
	pub fn into_port(self) -> serial2::SerialPort {
		self.port
	}

	/// Drop buffered bytes up to (and keeping) the next preamble.
	///
	/// Called after a decode error so that a late or corrupted reply
	/// can not be misattributed to the next transaction.
	fn drain_to_preamble(&mut self) {
		let garbage = find_preamble(&self.pending);
		if garbage > 0 {
			trace!("dropping {} byte(s) of unparseable input", garbage);
		}
		self.pending.drain(..garbage);
	}
}

impl Bus for SerialBus {
	type Error = std::io::Error;

	fn write_packet(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
		// Throw away stale input so an old reply can not be taken
		// for the answer to this instruction.
		self.pending.clear();
		self.port.discard_input_buffer()?;
		trace!("sending instruction: {:02X?}", packet);
		self.port.write_all(packet)
	}

	fn read_status_packet(&mut self, timeout: Duration) -> Result<StatusPacket, ReadError<Self::Error>> {
		let deadline = Instant::now() + timeout;
		let mut decoder = Decoder::new();

		loop {
			while !self.pending.is_empty() {
				let byte = self.pending.remove(0);
				match decoder.push(byte) {
					Ok(None) => (),
					Ok(Some(packet)) => {
						trace!("received status: {:02X?}", packet);
						return Ok(packet);
					},
					Err(e) => {
						self.drain_to_preamble();
						return Err(e.into());
					},
				}
			}

			let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
				return Err(ReadError::Timeout);
			};
			self.port.set_read_timeout(remaining).map_err(ReadError::Io)?;

			let mut chunk = [0; 64];
			match self.port.read(&mut chunk) {
				Ok(count) => self.pending.extend_from_slice(&chunk[..count]),
				Err(e) if is_timeout(&e) => return Err(ReadError::Timeout),
				Err(e) => return Err(ReadError::Io(e)),
			}
		}
	}
}

fn is_timeout(error: &std::io::Error) -> bool {
	matches!(error.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
}

/// Find the start of the first (possibly partial) preamble in the buffer.
///
/// Returns the buffer length if no candidate is present.
fn find_preamble(buffer: &[u8]) -> usize {
	for i in 0..buffer.len() {
		let possible_prefix = HEADER_PREFIX.len().min(buffer.len() - i);
		if buffer[i..].starts_with(&HEADER_PREFIX[..possible_prefix]) {
			return i;
		}
	}

	buffer.len()
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn test_find_preamble() {
		assert!(find_preamble(&[0xFF]) == 0);
		assert!(find_preamble(&[0xFF, 0xFF]) == 0);
		assert!(find_preamble(&[0xFF, 0xFF, 0x01]) == 0);

		assert!(find_preamble(&[0, 1, 2, 0xFF]) == 3);
		assert!(find_preamble(&[0, 1, 2, 0xFF, 0xFF]) == 3);

		assert!(find_preamble(&[0xFF, 1]) == 2);
		assert!(find_preamble(&[0, 1, 2, 0xFF, 6]) == 5);
	}
}
