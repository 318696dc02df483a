//! The bus transactor: one instruction out, at most one status back.

use log::debug;
use std::time::Duration;

use crate::bus::Bus;
use crate::endian::read_u16_le;
use crate::error::{DeviceError, FramingError, TransferError};
use crate::packet::{self, instruction_id, packet_id, ErrorFlags, StatusPacket};

/// The status-return-level a device is configured with.
///
/// It decides which instructions the device answers with a status packet.
/// When the actual level of a device is not known, assume [`StatusReturnLevel::All`]:
/// waiting for a reply that never comes is a recoverable timeout,
/// while not waiting for a reply that does come corrupts the next transaction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum StatusReturnLevel {
	/// Reply only to PING.
	None,

	/// Reply to PING and READ_DATA.
	Read,

	/// Reply to every addressed instruction.
	#[default]
	All,
}

impl StatusReturnLevel {
	/// The level encoded by the raw value of a status-return-level register.
	pub fn from_raw(raw: u8) -> Option<Self> {
		match raw {
			0 => Some(Self::None),
			1 => Some(Self::Read),
			2 => Some(Self::All),
			_ => None,
		}
	}

	/// Does a device at this level send a status for the given instruction?
	pub fn returns_status(self, instruction: u8) -> bool {
		match instruction {
			instruction_id::PING => true,
			instruction_id::READ_DATA => matches!(self, Self::Read | Self::All),
			_ => matches!(self, Self::All),
		}
	}
}

/// Data for one device in a SYNC_WRITE instruction.
#[derive(Debug, Copy, Clone)]
pub struct SyncWriteData<'a> {
	/// The ID of the device.
	pub id: u8,

	/// The bytes written to the device.
	pub data: &'a [u8],
}

/// One responding device found by a bus scan.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScanResult {
	pub id: u8,
	pub model: u16,
	pub version: u8,
}

/// A transactor driving a half-duplex [`Bus`].
///
/// Every operation is a strict write-then-maybe-read sequence.
/// The client owns the bus, so transactions can never interleave.
pub struct Client<B> {
	bus: B,
	read_timeout: Duration,
}

impl<B: Bus> Client<B> {
	/// The default wall-clock deadline for a single status packet.
	pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

	pub fn new(bus: B) -> Self {
		Self::with_read_timeout(bus, Self::DEFAULT_READ_TIMEOUT)
	}

	pub fn with_read_timeout(bus: B, read_timeout: Duration) -> Self {
		Self { bus, read_timeout }
	}

	/// Override the per-response deadline.
	pub fn set_read_timeout(&mut self, read_timeout: Duration) {
		self.read_timeout = read_timeout;
	}

	pub fn bus(&self) -> &B {
		&self.bus
	}

	pub fn bus_mut(&mut self) -> &mut B {
		&mut self.bus
	}

	/// Consume the client to get ownership of the bus.
	pub fn into_bus(self) -> B {
		self.bus
	}

	/// Ping a device and return its error flags.
	///
	/// A device that answers with non-zero flags is still a successful ping;
	/// the flags are handed to the caller verbatim.
	/// A broadcast ping is written without waiting for any reply.
	pub fn ping(&mut self, id: u8) -> Result<ErrorFlags, TransferError<B::Error>> {
		match self.transfer(id, instruction_id::PING, &[], StatusReturnLevel::All)? {
			Some(status) => {
				FramingError::check_parameter_count(status.parameters.len(), 0)?;
				Ok(status.error)
			},
			None => Ok(ErrorFlags::new(0)),
		}
	}

	/// Read `count` bytes from a device, starting at `offset`.
	///
	/// Returns `None` without touching the bus for a reply when the ID is the
	/// broadcast address or `level` suppresses the status packet.
	pub fn read(
		&mut self,
		id: u8,
		offset: u8,
		count: u8,
		level: StatusReturnLevel,
	) -> Result<Option<Vec<u8>>, TransferError<B::Error>> {
		match self.transfer(id, instruction_id::READ_DATA, &[offset, count], level)? {
			Some(status) => {
				DeviceError::check(status.error)?;
				FramingError::check_parameter_count(status.parameters.len(), count.into())?;
				Ok(Some(status.parameters))
			},
			None => Ok(None),
		}
	}

	/// Write bytes to a device, starting at `offset`.
	pub fn write(
		&mut self,
		id: u8,
		offset: u8,
		data: &[u8],
		level: StatusReturnLevel,
	) -> Result<(), TransferError<B::Error>> {
		self.write_registers(id, instruction_id::WRITE_DATA, offset, data, level)
	}

	/// Write bytes to a device, latched until a broadcast ACTION.
	pub fn reg_write(
		&mut self,
		id: u8,
		offset: u8,
		data: &[u8],
		level: StatusReturnLevel,
	) -> Result<(), TransferError<B::Error>> {
		self.write_registers(id, instruction_id::REG_WRITE, offset, data, level)
	}

	/// Broadcast ACTION, triggering all pending registered writes.
	pub fn action(&mut self) -> Result<(), TransferError<B::Error>> {
		self.transfer(packet_id::BROADCAST, instruction_id::ACTION, &[], StatusReturnLevel::All)?;
		Ok(())
	}

	/// Reset a device to its factory defaults.
	pub fn reset(&mut self, id: u8, level: StatusReturnLevel) -> Result<(), TransferError<B::Error>> {
		match self.transfer(id, instruction_id::RESET, &[], level)? {
			Some(status) => Ok(DeviceError::check(status.error)?),
			None => Ok(()),
		}
	}

	/// Write the same registers of several devices with one broadcast.
	///
	/// Every data slice must be exactly `count` bytes.
	/// Devices never reply to a SYNC_WRITE.
	pub fn sync_write(&mut self, offset: u8, count: u8, data: &[SyncWriteData]) -> Result<(), TransferError<B::Error>> {
		let mut parameters = Vec::with_capacity(2 + data.len() * (usize::from(count) + 1));
		parameters.push(offset);
		parameters.push(count);
		for entry in data {
			assert!(entry.data.len() == usize::from(count), "sync write data length must match the register count");
			parameters.push(entry.id);
			parameters.extend_from_slice(entry.data);
		}

		self.transfer(packet_id::BROADCAST, instruction_id::SYNC_WRITE, &parameters, StatusReturnLevel::All)?;
		Ok(())
	}

	/// Scan a range of IDs for devices.
	///
	/// Every responding device is pinged and then asked for its model number
	/// and firmware version (three bytes at offset 0).
	/// IDs that time out are skipped; any other error aborts the scan.
	pub fn scan(&mut self, ids: impl IntoIterator<Item = u8>) -> Result<Vec<ScanResult>, TransferError<B::Error>> {
		let mut found = Vec::new();
		for id in ids {
			match self.ping(id) {
				Ok(_) => (),
				Err(e) if e.is_timeout() => {
					debug!("no response from ID {}", id);
					continue;
				},
				Err(e) => return Err(e),
			}

			match self.read(id, 0, 3, StatusReturnLevel::All) {
				Ok(Some(data)) => found.push(ScanResult {
					id,
					model: read_u16_le(&data[..2]),
					version: data[2],
				}),
				Ok(None) => continue,
				Err(e) if e.is_timeout() => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(found)
	}

	/// The shared body of [`Self::write`] and [`Self::reg_write`]:
	/// the register offset followed by the data bytes.
	fn write_registers(
		&mut self,
		id: u8,
		instruction: u8,
		offset: u8,
		data: &[u8],
		level: StatusReturnLevel,
	) -> Result<(), TransferError<B::Error>> {
		let mut parameters = Vec::with_capacity(data.len() + 1);
		parameters.push(offset);
		parameters.extend_from_slice(data);

		match self.transfer(id, instruction, &parameters, level)? {
			Some(status) => Ok(DeviceError::check(status.error)?),
			None => Ok(()),
		}
	}

	/// Encode and send one instruction, then read the status when one is due.
	///
	/// The single place that decides whether a reply is awaited:
	/// broadcasts never get one, and `level` suppresses the rest.
	fn transfer(
		&mut self,
		id: u8,
		instruction: u8,
		parameters: &[u8],
		level: StatusReturnLevel,
	) -> Result<Option<StatusPacket>, TransferError<B::Error>> {
		let message = packet::encode_instruction(id, instruction, parameters);
		self.bus.write_packet(&message).map_err(TransferError::Write)?;

		if id == packet_id::BROADCAST || !level.returns_status(instruction) {
			return Ok(None);
		}

		let status = self.bus.read_status_packet(self.read_timeout)?;
		FramingError::check_packet_id(status.id, id)?;
		Ok(Some(status))
	}
}
