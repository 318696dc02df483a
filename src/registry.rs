//! Declarative device types: register tables loaded from text files.
//!
//! A table file describes one or more device types:
//!
//! ```text
//! # AX-12 servo
//! DeviceType: servo
//! Model: 12
//! Register: 0x03 id            1 rw 0 253
//! Register: 0x2b present-temp  1 ro Temperature
//! EndDeviceType
//! ```
//!
//! Device types are immutable after loading and shared between all
//! devices of that type.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LoadError, TableError, TableErrorKind, UnknownDeviceType};
use crate::register::{parse_integer, Access, RegisterKind};

/// Immutable metadata for one addressable field of a device type.
#[derive(Debug, Clone)]
pub struct Register {
	/// The hyphenated register name, unique within its device type.
	pub name: String,

	/// The offset of the register in the control table.
	pub offset: u8,

	/// The width in bytes, 1 or 2.
	pub size: u8,

	pub access: Access,

	/// The smallest raw value a write may carry.
	pub raw_min: u16,

	/// The largest raw value a write may carry.
	pub raw_max: u16,

	pub kind: RegisterKind,
}

impl Register {
	/// The largest raw value that fits the register width.
	pub fn width_max(&self) -> u16 {
		if self.size == 1 {
			0xFF
		} else {
			0xFFFF
		}
	}

	pub fn is_writable(&self) -> bool {
		self.access.is_writable()
	}
}

/// The register table and model number shared by all devices of one model.
#[derive(Debug)]
pub struct DeviceType {
	name: String,
	model: u16,
	/// All registers, ordered by offset.
	registers: Vec<Register>,
	/// Lower-cased register name to index in `registers`.
	by_name: HashMap<String, usize>,
}

impl DeviceType {
	fn new(name: String, model: u16, mut registers: Vec<Register>) -> Self {
		registers.sort_by_key(|register| register.offset);
		let by_name = registers
			.iter()
			.enumerate()
			.map(|(index, register)| (register.name.to_ascii_lowercase(), index))
			.collect();
		Self {
			name,
			model,
			registers,
			by_name,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The model number reported at offset 0 of the control table.
	pub fn model(&self) -> u16 {
		self.model
	}

	/// All registers in offset order.
	pub fn registers(&self) -> &[Register] {
		&self.registers
	}

	/// Look up a register by name, case-insensitively.
	pub fn register(&self, name: &str) -> Option<&Register> {
		let index = *self.by_name.get(&name.to_ascii_lowercase())?;
		Some(&self.registers[index])
	}

	/// Look up a register by its offset.
	pub fn register_at(&self, offset: u8) -> Option<&Register> {
		let index = self.registers.binary_search_by_key(&offset, |register| register.offset).ok()?;
		Some(&self.registers[index])
	}
}

/// All loaded device types, indexed by lower-cased name.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct Registry {
	types: HashMap<String, Arc<DeviceType>>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Load register tables from a string.
	pub fn load_str(&mut self, text: &str) -> Result<(), LoadError> {
		for (line, device_type) in parse_tables(text)? {
			let key = device_type.name().to_ascii_lowercase();
			if self.types.contains_key(&key) {
				return Err(TableError {
					line,
					kind: TableErrorKind::DuplicateDeviceType(device_type.name().to_owned()),
				}
				.into());
			}
			debug!("loaded device type {} (model {})", device_type.name(), device_type.model());
			self.types.insert(key, Arc::new(device_type));
		}
		Ok(())
	}

	/// Load register tables from a file.
	pub fn load_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), LoadError> {
		let text = std::fs::read_to_string(path)?;
		self.load_str(&text)
	}

	/// Look up a device type by name, case-insensitively.
	pub fn get(&self, name: &str) -> Result<Arc<DeviceType>, UnknownDeviceType> {
		self.types
			.get(&name.to_ascii_lowercase())
			.cloned()
			.ok_or_else(|| UnknownDeviceType { name: name.to_owned() })
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	/// Iterate over all loaded device types in no particular order.
	pub fn device_types(&self) -> impl Iterator<Item = &Arc<DeviceType>> {
		self.types.values()
	}
}

struct OpenBlock {
	name: String,
	start_line: usize,
	model: Option<u16>,
	registers: Vec<Register>,
}

/// Parse a table file into device types, tagged with their starting line.
fn parse_tables(text: &str) -> Result<Vec<(usize, DeviceType)>, TableError> {
	let mut types = Vec::new();
	let mut block: Option<OpenBlock> = None;

	for (index, raw_line) in text.lines().enumerate() {
		let line = index + 1;
		let content = match raw_line.split_once('#') {
			Some((content, _comment)) => content,
			None => raw_line,
		};
		let tokens: Vec<&str> = content.split_whitespace().collect();
		let Some((&directive, fields)) = tokens.split_first() else {
			continue;
		};

		let error = |kind| TableError { line, kind };

		match directive {
			"DeviceType:" => {
				if block.is_some() {
					return Err(error(TableErrorKind::NestedBlock));
				}
				let [name] = fields else {
					return Err(error(TableErrorKind::UnexpectedLine));
				};
				block = Some(OpenBlock {
					name: (*name).to_owned(),
					start_line: line,
					model: None,
					registers: Vec::new(),
				});
			},
			"Model:" => {
				let open = block.as_mut().ok_or_else(|| error(TableErrorKind::OutsideBlock))?;
				let [token] = fields else {
					return Err(error(TableErrorKind::UnexpectedLine));
				};
				let model = parse_integer(token)
					.and_then(|model| u16::try_from(model).ok())
					.ok_or_else(|| error(TableErrorKind::BadInteger((*token).to_owned())))?;
				open.model = Some(model);
			},
			"Register:" => {
				let open = block.as_mut().ok_or_else(|| error(TableErrorKind::OutsideBlock))?;
				let register = parse_register(fields, line)?;
				if open.registers.iter().any(|existing| existing.offset == register.offset) {
					return Err(error(TableErrorKind::DuplicateOffset(register.offset)));
				}
				if open.registers.iter().any(|existing| existing.name.eq_ignore_ascii_case(&register.name)) {
					return Err(error(TableErrorKind::DuplicateName(register.name)));
				}
				open.registers.push(register);
			},
			"EndDeviceType" => {
				let open = block.take().ok_or_else(|| error(TableErrorKind::OutsideBlock))?;
				let model = open.model.ok_or_else(|| error(TableErrorKind::MissingModel))?;
				types.push((open.start_line, DeviceType::new(open.name, model, open.registers)));
			},
			_ => return Err(error(TableErrorKind::UnexpectedLine)),
		}
	}

	if let Some(open) = block {
		return Err(TableError {
			line: open.start_line,
			kind: TableErrorKind::UnterminatedBlock,
		});
	}

	Ok(types)
}

fn parse_register(fields: &[&str], line: usize) -> Result<Register, TableError> {
	let error = |kind| TableError { line, kind };
	let int_field = |token: &str| {
		parse_integer(token).ok_or_else(|| error(TableErrorKind::BadInteger(token.to_owned())))
	};

	if fields.len() < 4 {
		return Err(error(TableErrorKind::UnexpectedLine));
	}
	let (offset, name, size, access) = (fields[0], fields[1], fields[2], fields[3]);
	let rest = &fields[4..];

	let offset = u8::try_from(int_field(offset)?).map_err(|_| error(TableErrorKind::BadInteger(offset.to_owned())))?;
	let size = match size {
		"1" => 1,
		"2" => 2,
		_ => return Err(error(TableErrorKind::BadSize(size.to_owned()))),
	};
	let access = match () {
		() if access.eq_ignore_ascii_case("ro") => Access::ReadOnly,
		() if access.eq_ignore_ascii_case("rw") => Access::ReadWrite,
		() => return Err(error(TableErrorKind::BadAccess(access.to_owned()))),
	};

	// What remains is an optional `raw_min raw_max` pair and an optional kind.
	let (range, kind_token) = match rest {
		[] => (None, None),
		[kind] => (None, Some(*kind)),
		[min, max] => (Some((*min, *max)), None),
		[min, max, kind] => (Some((*min, *max)), Some(*kind)),
		_ => return Err(error(TableErrorKind::UnexpectedLine)),
	};

	// An unknown kind name falls back to a plain integer register.
	let kind = kind_token.map(|token| RegisterKind::from_name(token).unwrap_or_default()).unwrap_or_default();
	if let Some(required) = kind.required_size() {
		if required != size {
			return Err(error(TableErrorKind::KindWidthMismatch { kind: kind.name(), size }));
		}
	}

	let width_max = if size == 1 { 0xFF } else { 0xFFFF };
	let (raw_min, raw_max) = match range {
		Some((min, max)) => {
			let min = u16::try_from(int_field(min)?).map_err(|_| error(TableErrorKind::BadInteger(min.to_owned())))?;
			let max = u16::try_from(int_field(max)?).map_err(|_| error(TableErrorKind::BadInteger(max.to_owned())))?;
			if max > width_max {
				return Err(error(TableErrorKind::RangeTooWide { max }));
			}
			if min > max {
				return Err(error(TableErrorKind::InvertedRange { min, max }));
			}
			(min, max)
		},
		None => (0, width_max),
	};

	Ok(Register {
		name: (*name).to_owned(),
		offset,
		size,
		access,
		raw_min,
		raw_max,
		kind,
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::{assert, let_assert};

	const SERVO_TABLE: &str = "
		# A trimmed down AX-12 control table.
		DeviceType: servo
		Model: 12
		Register: 0x00 model         2 ro
		Register: 0x03 id            1 rw 0 253
		Register: 0x04 baud-rate     1 rw 0 254 BaudRate
		Register: 0x1e goal-position 2 rw 0 1023 Angle
		Register: 0x2b present-temp  1 ro Temperature
		EndDeviceType
	";

	#[test]
	fn loads_a_device_type() {
		let mut registry = Registry::new();
		let_assert!(Ok(()) = registry.load_str(SERVO_TABLE));
		let_assert!(Ok(servo) = registry.get("Servo"));
		assert!(servo.name() == "servo");
		assert!(servo.model() == 12);
		assert!(servo.registers().len() == 5);

		let_assert!(Some(register) = servo.register("GOAL-POSITION"));
		assert!(register.offset == 0x1E);
		assert!(register.size == 2);
		assert!(register.kind == RegisterKind::Angle);
		assert!(register.is_writable());

		let_assert!(Some(register) = servo.register_at(0x2B));
		assert!(register.name == "present-temp");
		assert!(!register.is_writable());
		// Read-only registers default to the full register width.
		assert!((register.raw_min, register.raw_max) == (0, 0xFF));

		assert!(servo.register("bogus").is_none());
		assert!(servo.register_at(0x7F).is_none());
	}

	#[test]
	fn registers_are_ordered_by_offset() {
		let mut registry = Registry::new();
		let_assert!(Ok(()) = registry.load_str("
			DeviceType: scrambled
			Model: 1
			Register: 0x10 second 1 ro
			Register: 0x02 first  1 ro
			EndDeviceType
		"));
		let_assert!(Ok(device_type) = registry.get("scrambled"));
		let offsets: Vec<u8> = device_type.registers().iter().map(|register| register.offset).collect();
		assert!(offsets == [0x02, 0x10]);
	}

	#[test]
	fn unknown_kind_defaults_to_raw() {
		let mut registry = Registry::new();
		let_assert!(Ok(()) = registry.load_str("
			DeviceType: widget
			Model: 1
			Register: 0x00 mystery 1 rw 0 255 FluxCapacitor
			EndDeviceType
		"));
		let_assert!(Ok(widget) = registry.get("widget"));
		assert!(widget.register("mystery").unwrap().kind == RegisterKind::Raw);
	}

	#[test]
	fn duplicate_offset_fails_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("
			DeviceType: broken
			Model: 1
			Register: 0x00 one 1 ro
			Register: 0x00 two 1 ro
			EndDeviceType
		"));
		assert!(e.kind == TableErrorKind::DuplicateOffset(0));
		assert!(e.line == 5);
	}

	#[test]
	fn duplicate_name_fails_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("
			DeviceType: broken
			Model: 1
			Register: 0x00 twin 1 ro
			Register: 0x01 TWIN 1 ro
			EndDeviceType
		"));
		assert!(e.kind == TableErrorKind::DuplicateName(String::from("TWIN")));
	}

	#[test]
	fn unterminated_block_fails_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("DeviceType: broken\nModel: 1\n"));
		assert!(e.kind == TableErrorKind::UnterminatedBlock);
		assert!(e.line == 1);
	}

	#[test]
	fn missing_model_fails_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("DeviceType: broken\nEndDeviceType\n"));
		assert!(e.kind == TableErrorKind::MissingModel);
	}

	#[test]
	fn kind_width_conflict_fails_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("
			DeviceType: broken
			Model: 1
			Register: 0x00 angle 1 rw 0 255 Angle
			EndDeviceType
		"));
		assert!(e.kind == TableErrorKind::KindWidthMismatch { kind: "Angle", size: 1 });
	}

	#[test]
	fn range_must_fit_the_register_width() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("
			DeviceType: broken
			Model: 1
			Register: 0x00 small 1 rw 0 300
			EndDeviceType
		"));
		assert!(e.kind == TableErrorKind::RangeTooWide { max: 300 });
	}

	#[test]
	fn directives_outside_a_block_fail_the_load() {
		let mut registry = Registry::new();
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("Register: 0x00 stray 1 ro\n"));
		assert!(e.kind == TableErrorKind::OutsideBlock);
		let_assert!(Err(LoadError::Table(e)) = registry.load_str("How dare you\n"));
		assert!(e.kind == TableErrorKind::UnexpectedLine);
	}

	#[test]
	fn duplicate_device_type_fails_the_load() {
		let mut registry = Registry::new();
		let table = "DeviceType: servo\nModel: 12\nEndDeviceType\n";
		let_assert!(Ok(()) = registry.load_str(table));
		let_assert!(Err(LoadError::Table(e)) = registry.load_str(table));
		assert!(e.kind == TableErrorKind::DuplicateDeviceType(String::from("servo")));
	}

	#[test]
	fn unknown_device_type_lookup_fails() {
		let registry = Registry::new();
		let_assert!(Err(e) = registry.get("servo"));
		assert!(e.name == "servo");
	}

	#[test]
	fn integers_accept_hex_octal_and_decimal() {
		let mut registry = Registry::new();
		let_assert!(Ok(()) = registry.load_str("
			DeviceType: mixed
			Model: 0x0C
			Register: 010 in-octal 1 rw 0 0xFF
			EndDeviceType
		"));
		let_assert!(Ok(mixed) = registry.get("mixed"));
		assert!(mixed.model() == 12);
		assert!(mixed.register_at(8).is_some());
	}
}
