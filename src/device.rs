//! Typed access to one device on the bus.

use std::sync::Arc;

use crate::bus::Bus;
use crate::client::{Client, StatusReturnLevel};
use crate::endian::{read_register_le, write_register_le};
use crate::error::{AccessError, NotWritable, ParseError, RangeError, UnknownRegister};
use crate::packet::ErrorFlags;
use crate::register::parse_integer;
use crate::registry::{DeviceType, Register};

/// A stateless proxy for one device: a device type bound to a bus address.
///
/// Register reads return `None` when the device is configured
/// not to send a status packet for them, see [`StatusReturnLevel`].
pub struct Device<'a, B: Bus> {
	client: &'a mut Client<B>,
	device_type: Arc<DeviceType>,
	id: u8,
	level: StatusReturnLevel,
}

impl<'a, B: Bus> Device<'a, B> {
	pub fn new(client: &'a mut Client<B>, device_type: Arc<DeviceType>, id: u8) -> Self {
		Self {
			client,
			device_type,
			id,
			level: StatusReturnLevel::default(),
		}
	}

	/// Tell the driver which status-return-level the device is configured with.
	///
	/// The driver can not ask the device without reading a register,
	/// so the caller decides; the default assumes every instruction is answered.
	pub fn with_status_return_level(mut self, level: StatusReturnLevel) -> Self {
		self.level = level;
		self
	}

	pub fn device_type(&self) -> &Arc<DeviceType> {
		&self.device_type
	}

	pub fn id(&self) -> u8 {
		self.id
	}

	/// Ping the device. Non-zero error flags still count as a reachable device.
	pub fn ping(&mut self) -> Result<ErrorFlags, AccessError<B::Error>> {
		Ok(self.client.ping(self.id).map_err(AccessError::Transfer)?)
	}

	/// Reset the device to its factory defaults.
	pub fn reset(&mut self) -> Result<(), AccessError<B::Error>> {
		Ok(self.client.reset(self.id, self.level).map_err(AccessError::Transfer)?)
	}

	/// Read raw bytes from a register name or a bare offset.
	pub fn read_data(&mut self, target: &str, count: u8) -> Result<Option<Vec<u8>>, AccessError<B::Error>> {
		let offset = self.locate_offset(target)?;
		Ok(self.client.read(self.id, offset, count, self.level).map_err(AccessError::Transfer)?)
	}

	/// Write raw bytes to a register name or a bare offset.
	pub fn write_data(&mut self, target: &str, data: &[u8]) -> Result<(), AccessError<B::Error>> {
		let offset = self.locate_offset(target)?;
		Ok(self.client.write(self.id, offset, data, self.level).map_err(AccessError::Transfer)?)
	}

	/// Write raw bytes, latched in the device until a broadcast ACTION.
	pub fn reg_write_data(&mut self, target: &str, data: &[u8]) -> Result<(), AccessError<B::Error>> {
		let offset = self.locate_offset(target)?;
		Ok(self.client.reg_write(self.id, offset, data, self.level).map_err(AccessError::Transfer)?)
	}

	/// Read a register and format it with its unit.
	///
	/// The name "all" reads every register and returns a tabular listing.
	pub fn get(&mut self, name: &str) -> Result<Option<String>, AccessError<B::Error>> {
		if name.eq_ignore_ascii_case("all") {
			return self.get_all();
		}

		let device_type = self.device_type.clone();
		let register = lookup(&device_type, name)?;
		let Some(raw) = self.read_register(register)? else {
			return Ok(None);
		};
		Ok(Some(register.kind.format_value(raw)))
	}

	/// Read a register and return the raw value, without unit conversion.
	pub fn get_raw(&mut self, name: &str) -> Result<Option<u16>, AccessError<B::Error>> {
		let device_type = self.device_type.clone();
		let register = lookup(&device_type, name)?;
		self.read_register(register)
	}

	/// Read every register in offset order into a tabular listing.
	pub fn get_all(&mut self) -> Result<Option<String>, AccessError<B::Error>> {
		let device_type = self.device_type.clone();
		let mut listing = String::new();
		for register in device_type.registers() {
			let Some(raw) = self.read_register(register)? else {
				return Ok(None);
			};
			if !listing.is_empty() {
				listing.push('\n');
			}
			listing.push_str(&format!("{:<24}{}", register.name, register.kind.format_value(raw)));
		}
		Ok(Some(listing))
	}

	/// Parse a value for the register kind and write it.
	pub fn set(&mut self, name: &str, value: &str) -> Result<(), AccessError<B::Error>> {
		let device_type = self.device_type.clone();
		let register = writable(&device_type, name)?;
		let raw = register.kind.parse_value(value)?;
		RangeError::check(raw, register.raw_min, register.raw_max)?;
		self.write_register(register, raw, false)
	}

	/// Like [`Self::set`], but latched in the device until a broadcast ACTION.
	pub fn deferred_set(&mut self, name: &str, value: &str) -> Result<(), AccessError<B::Error>> {
		let device_type = self.device_type.clone();
		let register = writable(&device_type, name)?;
		let raw = register.kind.parse_value(value)?;
		RangeError::check(raw, register.raw_min, register.raw_max)?;
		self.write_register(register, raw, true)
	}

	/// Write a raw integer value, bypassing unit conversion.
	///
	/// The text accepts decimal, hex and octal.
	/// Negative values and values that do not fit the register width are rejected.
	pub fn set_raw(&mut self, name: &str, value: &str) -> Result<(), AccessError<B::Error>> {
		let device_type = self.device_type.clone();
		let register = writable(&device_type, name)?;
		let raw = parse_integer(value).ok_or_else(|| ParseError::new(value, "a non-negative integer"))?;
		if raw > u32::from(register.width_max()) {
			return Err(ParseError::new(value, "an integer that fits the register width").into());
		}
		let raw = raw as u16;
		RangeError::check(raw, register.raw_min, register.raw_max)?;
		self.write_register(register, raw, false)
	}

	fn read_register(&mut self, register: &Register) -> Result<Option<u16>, AccessError<B::Error>> {
		let data = self
			.client
			.read(self.id, register.offset, register.size, self.level)
			.map_err(AccessError::Transfer)?;
		Ok(data.map(|data| read_register_le(&data)))
	}

	fn write_register(&mut self, register: &Register, raw: u16, deferred: bool) -> Result<(), AccessError<B::Error>> {
		let mut data = [0; 2];
		let data = &mut data[..register.size.into()];
		write_register_le(data, raw);
		let result = if deferred {
			self.client.reg_write(self.id, register.offset, data, self.level)
		} else {
			self.client.write(self.id, register.offset, data, self.level)
		};
		Ok(result.map_err(AccessError::Transfer)?)
	}

	/// Resolve a register name or a bare numeric offset.
	fn locate_offset(&self, target: &str) -> Result<u8, AccessError<B::Error>> {
		if let Some(register) = self.device_type.register(target) {
			return Ok(register.offset);
		}
		parse_integer(target)
			.and_then(|offset| u8::try_from(offset).ok())
			.ok_or_else(|| UnknownRegister { name: target.to_owned() }.into())
	}
}

fn lookup<'t>(device_type: &'t DeviceType, name: &str) -> Result<&'t Register, UnknownRegister> {
	device_type.register(name).ok_or_else(|| UnknownRegister { name: name.to_owned() })
}

fn writable<'t, E>(device_type: &'t DeviceType, name: &str) -> Result<&'t Register, AccessError<E>> {
	let register = lookup(device_type, name)?;
	if !register.is_writable() {
		return Err(NotWritable { name: register.name.clone() }.into());
	}
	Ok(register)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::error::{ExpectationError, TransferError};
	use crate::packet::{instruction_id, packet_id};
	use crate::registry::Registry;
	use crate::test_bus::TestBus;
	use assert2::{assert, let_assert};

	const TABLE: &str = "
		DeviceType: servo
		Model: 12
		Register: 0x03 id            1 rw 0 253
		Register: 0x19 led           1 rw 0 1 OnOff
		Register: 0x1e goal-position 2 rw 0 1023 Angle
		Register: 0x2b present-temp  1 ro Temperature
		Register: 0x30 punch         2 rw 32 1023
		EndDeviceType
	";

	fn servo_type() -> Arc<DeviceType> {
		let mut registry = Registry::new();
		registry.load_str(TABLE).unwrap();
		registry.get("servo").unwrap()
	}

	#[test]
	fn get_formats_the_register_value() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_raw([0xFF, 0xFF, 0x01, 0x04, 0x02, 0x2B, 0x01, 0xCC]);
		client.bus_mut().respond_raw([0xFF, 0xFF, 0x01, 0x03, 0x00, 0x20, 0xDB]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(Some(text)) = device.get("present-temp"));
		assert!(text == "32C");
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn set_converts_and_writes_little_endian() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::WRITE_DATA, [0x1E, 0xFF, 0x03]);
		client.bus_mut().respond_status(1, ErrorFlags::new(0), vec![]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(()) = device.set("goal-position", "300"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn set_on_a_broadcast_device_never_reads() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_raw([0xFF, 0xFF, 0xFE, 0x04, 0x03, 0x03, 0x01, 0xF6]);

		let mut device = Device::new(&mut client, servo_type(), packet_id::BROADCAST);
		let_assert!(Ok(()) = device.set("id", "1"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn out_of_range_value_writes_nothing() {
		let mut client = Client::new(TestBus::new());

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Err(AccessError::Range(e)) = device.set("punch", "1024"));
		assert!(e == RangeError { value: 1024, min: 32, max: 1023 });
		// The expectation queue must be untouched.
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn read_only_registers_reject_writes() {
		let mut client = Client::new(TestBus::new());
		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Err(AccessError::NotWritable(e)) = device.set("present-temp", "32"));
		assert!(e.name == "present-temp");
		let_assert!(Err(AccessError::UnknownRegister(_)) = device.set("no-such-register", "1"));
	}

	#[test]
	fn deferred_set_uses_reg_write() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::REG_WRITE, [0x19, 0x01]);
		client.bus_mut().respond_status(1, ErrorFlags::new(0), vec![]);
		client.bus_mut().expect_instruction(packet_id::BROADCAST, instruction_id::ACTION, []);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(()) = device.deferred_set("led", "on"));
		let_assert!(Ok(()) = client.action());
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn set_raw_bypasses_unit_conversion() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::WRITE_DATA, [0x1E, 0x00, 0x02]);
		client.bus_mut().respond_status(1, ErrorFlags::new(0), vec![]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(()) = device.set_raw("goal-position", "0x200"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn set_raw_rejects_values_beyond_the_register_width() {
		let mut client = Client::new(TestBus::new());
		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Err(AccessError::Parse(_)) = device.set_raw("led", "256"));
		let_assert!(Err(AccessError::Parse(_)) = device.set_raw("led", "-1"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn get_all_lists_registers_in_offset_order() {
		let mut client = Client::new(TestBus::new());
		let responses: [(u8, Vec<u8>); 5] = [
			(0x03, vec![1]),
			(0x19, vec![1]),
			(0x1E, vec![0xFF, 0x03]),
			(0x2B, vec![0x20]),
			(0x30, vec![0x20, 0x00]),
		];
		for (offset, data) in &responses {
			client
				.bus_mut()
				.expect_instruction(1, instruction_id::READ_DATA, [*offset, data.len() as u8]);
			client.bus_mut().respond_status(1, ErrorFlags::new(0), data.clone());
		}

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(Some(listing)) = device.get("all"));
		let lines: Vec<&str> = listing.lines().collect();
		assert!(lines.len() == 5);
		assert!(lines[0] == format!("{:<24}{}", "id", "1"));
		assert!(lines[2] == format!("{:<24}{}", "goal-position", "300.0 deg"));
		assert!(lines[3] == format!("{:<24}{}", "present-temp", "32C"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn silent_devices_read_nothing() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::READ_DATA, [0x2B, 0x01]);

		let mut device = Device::new(&mut client, servo_type(), 1).with_status_return_level(StatusReturnLevel::None);
		let_assert!(Ok(None) = device.get("present-temp"));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn read_data_accepts_bare_offsets() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::READ_DATA, [0x00, 0x03]);
		client.bus_mut().respond_status(1, ErrorFlags::new(0), vec![0x0C, 0x00, 0x18]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Ok(Some(data)) = device.read_data("0x00", 3));
		assert!(data == [0x0C, 0x00, 0x18]);
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn device_errors_propagate_from_writes() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::WRITE_DATA, [0x19, 0x01]);
		client.bus_mut().respond_status(1, ErrorFlags::new(ErrorFlags::RANGE), vec![]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Err(AccessError::Transfer(TransferError::Device(e))) = device.set("led", "on"));
		assert!(e.flags.contains(ErrorFlags::RANGE));
		assert!(client.bus_mut().finish() == Ok(()));
	}

	#[test]
	fn unexpected_reads_surface_script_failures() {
		let mut client = Client::new(TestBus::new());
		client.bus_mut().expect_instruction(1, instruction_id::READ_DATA, [0x2B, 0x01]);

		let mut device = Device::new(&mut client, servo_type(), 1);
		let_assert!(Err(AccessError::Transfer(TransferError::Read(crate::error::ReadError::Io(e)))) = device.get("present-temp"));
		assert!(e == ExpectationError::UnexpectedRead);
	}
}
