//! Typed register kinds: unit conversion between raw values and text.

use crate::error::ParseError;
use crate::packet::ErrorFlags;

/// Whether a register can be written by the host.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
	ReadOnly,
	ReadWrite,
}

impl Access {
	pub fn is_writable(self) -> bool {
		self == Self::ReadWrite
	}
}

/// The semantic kind of a register.
///
/// Each kind formats raw values for humans and parses them back,
/// and restricts the raw domain on top of the per-register range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum RegisterKind {
	/// A plain integer, formatted in decimal.
	#[default]
	Raw,

	/// A boolean, "on" or "off".
	OnOff,

	/// A pin direction, "input" or "output".
	Direction,

	/// A baud rate divisor: 2000000 / (raw + 1) bps.
	BaudRate,

	/// The return delay time: raw * 2 microseconds.
	ReturnDelay,

	/// A joint angle: raw * 300 / 1023 degrees.
	Angle,

	/// A rotation speed: raw * 114 / 1023 RPM.
	AngularVelocity,

	/// A temperature in whole degrees Celsius.
	Temperature,

	/// A voltage: raw / 10 volts.
	Voltage,

	/// A status-return-level: "none", "read" or "all".
	StatusReturn,

	/// A bitfield of error flag names.
	Alarm,

	/// A sign-magnitude load reading; bit 10 is the direction.
	Load,
}

impl RegisterKind {
	/// Look up a kind by the name used in register table files.
	///
	/// Matching is case-insensitive.
	pub fn from_name(name: &str) -> Option<Self> {
		let kinds = [
			Self::Raw,
			Self::OnOff,
			Self::Direction,
			Self::BaudRate,
			Self::ReturnDelay,
			Self::Angle,
			Self::AngularVelocity,
			Self::Temperature,
			Self::Voltage,
			Self::StatusReturn,
			Self::Alarm,
			Self::Load,
		];
		kinds.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(name))
	}

	/// The name of the kind as used in register table files.
	pub fn name(self) -> &'static str {
		match self {
			Self::Raw => "Raw",
			Self::OnOff => "OnOff",
			Self::Direction => "Direction",
			Self::BaudRate => "BaudRate",
			Self::ReturnDelay => "RDT",
			Self::Angle => "Angle",
			Self::AngularVelocity => "AngularVelocity",
			Self::Temperature => "Temperature",
			Self::Voltage => "Voltage",
			Self::StatusReturn => "StatusRet",
			Self::Alarm => "Alarm",
			Self::Load => "Load",
		}
	}

	/// The register width the kind requires, if it requires one.
	pub fn required_size(self) -> Option<u8> {
		match self {
			Self::Raw => None,
			Self::Angle | Self::AngularVelocity | Self::Load => Some(2),
			_ => Some(1),
		}
	}

	/// The largest raw value that is meaningful for this kind.
	pub fn max_raw(self) -> u16 {
		match self {
			Self::Raw => u16::MAX,
			Self::OnOff | Self::Direction => 1,
			Self::BaudRate | Self::ReturnDelay => 254,
			Self::Angle | Self::AngularVelocity => 1023,
			Self::Temperature | Self::Voltage => 255,
			Self::StatusReturn => 2,
			Self::Alarm => 0x7F,
			Self::Load => 0x7FF,
		}
	}

	/// Format a raw register value as human-facing text.
	pub fn format_value(self, raw: u16) -> String {
		match self {
			Self::Raw => raw.to_string(),
			Self::OnOff => String::from(if raw == 0 { "off" } else { "on" }),
			Self::Direction => String::from(if raw == 0 { "input" } else { "output" }),
			Self::BaudRate => {
				let divisor = u32::from(raw) + 1;
				format!("{} bps", (2_000_000 + divisor / 2) / divisor)
			},
			Self::ReturnDelay => format!("{} usec", u32::from(raw) * 2),
			Self::Angle => format_tenths(scale_to_tenths(raw, 3000), "deg"),
			Self::AngularVelocity => format_tenths(scale_to_tenths(raw, 1140), "RPM"),
			Self::Temperature => format!("{}C", raw),
			Self::Voltage => format!("{}.{}V", raw / 10, raw % 10),
			Self::StatusReturn => match raw {
				0 => String::from("none"),
				1 => String::from("read"),
				2 => String::from("all"),
				_ => raw.to_string(),
			},
			Self::Alarm => ErrorFlags::new(raw as u8).to_string(),
			Self::Load => {
				let direction = if raw & 0x400 != 0 { "CW" } else { "CCW" };
				format!("{} {}", direction, raw & 0x3FF)
			},
		}
	}

	/// Parse human-facing text back into a raw register value.
	///
	/// The inverse of [`Self::format_value`]; unit suffixes are optional.
	/// Input outside the raw domain of the kind is rejected.
	pub fn parse_value(self, text: &str) -> Result<u16, ParseError> {
		let text = text.trim();
		match self {
			Self::Raw => {
				let value = parse_integer(text).ok_or_else(|| ParseError::new(text, "an integer"))?;
				u16::try_from(value).map_err(|_| ParseError::new(text, "an integer that fits in 16 bits"))
			},
			Self::OnOff => match () {
				() if text.eq_ignore_ascii_case("on") => Ok(1),
				() if text.eq_ignore_ascii_case("off") => Ok(0),
				() => Err(ParseError::new(text, "\"on\" or \"off\"")),
			},
			Self::Direction => match () {
				() if text.eq_ignore_ascii_case("input") => Ok(0),
				() if text.eq_ignore_ascii_case("output") => Ok(1),
				() => Err(ParseError::new(text, "\"input\" or \"output\"")),
			},
			Self::BaudRate => {
				let text = strip_unit(text, "bps");
				let bps = parse_integer(text).filter(|&bps| bps > 0)
					.ok_or_else(|| ParseError::new(text, "a baud rate in bps"))?;
				if 2_000_000 % bps != 0 {
					return Err(ParseError::new(text, "an exact divisor of 2000000 bps"));
				}
				let raw = 2_000_000 / bps - 1;
				u16::try_from(raw).ok().filter(|&raw| raw <= 254)
					.ok_or_else(|| ParseError::new(text, "a baud rate of at least 7844 bps"))
			},
			Self::ReturnDelay => {
				let text = strip_unit(text, "usec");
				let usec = parse_integer(text).ok_or_else(|| ParseError::new(text, "a delay in usec"))?;
				if usec % 2 != 0 || usec > 508 {
					return Err(ParseError::new(text, "an even delay of at most 508 usec"));
				}
				Ok((usec / 2) as u16)
			},
			Self::Angle => {
				let text = strip_unit(text, "deg");
				let tenths = parse_tenths(text).filter(|&tenths| tenths <= 3000)
					.ok_or_else(|| ParseError::new(text, "an angle between 0.0 and 300.0 deg"))?;
				Ok(tenths_to_scale(tenths, 3000))
			},
			Self::AngularVelocity => {
				let text = strip_unit(text, "RPM");
				let tenths = parse_tenths(text).filter(|&tenths| tenths <= 1140)
					.ok_or_else(|| ParseError::new(text, "a speed between 0.0 and 114.0 RPM"))?;
				Ok(tenths_to_scale(tenths, 1140))
			},
			Self::Temperature => {
				let text = strip_unit(text, "C");
				let celsius = parse_integer(text).filter(|&celsius| celsius <= 255)
					.ok_or_else(|| ParseError::new(text, "a temperature in whole degrees Celsius"))?;
				Ok(celsius as u16)
			},
			Self::Voltage => {
				let text = strip_unit(text, "V");
				let tenths = parse_tenths(text).filter(|&tenths| tenths <= 255)
					.ok_or_else(|| ParseError::new(text, "a voltage between 0.0 and 25.5 V"))?;
				Ok(tenths as u16)
			},
			Self::StatusReturn => match () {
				() if text.eq_ignore_ascii_case("none") => Ok(0),
				() if text.eq_ignore_ascii_case("read") => Ok(1),
				() if text.eq_ignore_ascii_case("all") => Ok(2),
				() => Err(ParseError::new(text, "\"none\", \"read\" or \"all\"")),
			},
			Self::Alarm => {
				let flags = ErrorFlags::parse(text).ok_or_else(|| ParseError::new(text, "a comma separated list of error flag names"))?;
				Ok(flags.bits().into())
			},
			Self::Load => Err(ParseError::new(text, "nothing: load readings can not be written")),
		}
	}
}

/// Parse a non-negative integer in decimal, hex (`0x…`) or octal (leading `0`).
pub fn parse_integer(text: &str) -> Option<u32> {
	let text = text.trim();
	if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
		u32::from_str_radix(hex, 16).ok()
	} else if text.len() > 1 && text.starts_with('0') {
		u32::from_str_radix(&text[1..], 8).ok()
	} else {
		text.parse().ok()
	}
}

/// Parse a decimal number with at most one fractional digit into tenths.
fn parse_tenths(text: &str) -> Option<u32> {
	let (whole, fraction) = match text.split_once('.') {
		Some((whole, fraction)) => (whole, fraction),
		None => (text, "0"),
	};
	if fraction.len() != 1 {
		return None;
	}
	let whole: u32 = whole.parse().ok()?;
	let fraction: u32 = fraction.parse().ok()?;
	whole.checked_mul(10)?.checked_add(fraction)
}

fn format_tenths(tenths: u32, unit: &str) -> String {
	format!("{}.{} {}", tenths / 10, tenths % 10, unit)
}

/// Convert a raw value in `0..=1023` to tenths of a unit, rounding to nearest.
///
/// `full_scale` is the tenths value that corresponds to raw 1023.
fn scale_to_tenths(raw: u16, full_scale: u32) -> u32 {
	(u32::from(raw) * full_scale + 511) / 1023
}

/// The inverse of [`scale_to_tenths`].
///
/// Both scale factors are above one, so rounding to nearest in both
/// directions makes the conversion a lossless round trip.
fn tenths_to_scale(tenths: u32, full_scale: u32) -> u16 {
	((tenths * 1023 + full_scale / 2) / full_scale) as u16
}

/// Strip a trailing unit, case-insensitively, together with any space before it.
fn strip_unit<'a>(text: &'a str, unit: &str) -> &'a str {
	let text = text.trim();
	let Some(split) = text.len().checked_sub(unit.len()) else {
		return text;
	};
	if text.is_char_boundary(split) && text[split..].eq_ignore_ascii_case(unit) {
		text[..split].trim_end()
	} else {
		text
	}
}
