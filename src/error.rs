//! Error types for the bus, the transactor and the register model.

use crate::packet::ErrorFlags;

/// The byte stream could not be parsed as a packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FramingError {
	/// A preamble byte was followed by something other than `0xFF`.
	InvalidPreamble { byte: u8 },

	/// The length field was outside the valid range of 2 to 253.
	InvalidLength { length: u8 },

	/// A status packet arrived with a different ID than the addressed device.
	UnexpectedPacketId { actual: u8, expected: u8 },

	/// A status packet carried a different number of data bytes than requested.
	UnexpectedParameterCount { actual: usize, expected: usize },
}

impl FramingError {
	pub fn check_packet_id(actual: u8, expected: u8) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self::UnexpectedPacketId { actual, expected })
		}
	}

	pub fn check_parameter_count(actual: usize, expected: usize) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self::UnexpectedParameterCount { actual, expected })
		}
	}
}

/// The received checksum did not match the computed one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidChecksum {
	pub message: u8,
	pub computed: u8,
}

impl InvalidChecksum {
	pub fn check(message: u8, computed: u8) -> Result<(), Self> {
		if message == computed {
			Ok(())
		} else {
			Err(Self { message, computed })
		}
	}
}

/// An error from the packet decoder.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
	Framing(FramingError),
	Checksum(InvalidChecksum),
}

/// An error that can occur while reading a status packet.
#[derive(Debug)]
pub enum ReadError<E> {
	/// The transport failed.
	Io(E),

	/// No status packet arrived within the deadline.
	Timeout,

	/// The byte stream could not be framed as a packet.
	Framing(FramingError),

	/// A packet arrived but its checksum was wrong.
	Checksum(InvalidChecksum),
}

impl<E> ReadError<E> {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout)
	}
}

/// A device reported a non-zero error byte in its status packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceError {
	pub flags: ErrorFlags,
}

impl DeviceError {
	pub fn check(flags: ErrorFlags) -> Result<(), Self> {
		if flags.is_normal() {
			Ok(())
		} else {
			Err(Self { flags })
		}
	}
}

/// An error that can occur during a full write/read transaction.
#[derive(Debug)]
pub enum TransferError<E> {
	/// Writing the instruction to the transport failed.
	Write(E),

	/// Reading the status packet failed.
	Read(ReadError<E>),

	/// The device answered, but reported an error.
	Device(DeviceError),
}

impl<E> TransferError<E> {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Read(ReadError::Timeout))
	}
}

/// A register value in text form could not be parsed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseError {
	/// The rejected input.
	pub value: String,

	/// A short description of what would have been accepted.
	pub expected: &'static str,
}

impl ParseError {
	pub fn new(value: impl Into<String>, expected: &'static str) -> Self {
		Self {
			value: value.into(),
			expected,
		}
	}
}

/// A raw value fell outside the range allowed for a register.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RangeError {
	pub value: u16,
	pub min: u16,
	pub max: u16,
}

impl RangeError {
	pub fn check(value: u16, min: u16, max: u16) -> Result<(), Self> {
		if value >= min && value <= max {
			Ok(())
		} else {
			Err(Self { value, min, max })
		}
	}
}

/// A register name did not exist on the device type.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnknownRegister {
	pub name: String,
}

/// A device type name did not exist in the registry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnknownDeviceType {
	pub name: String,
}

/// An attempt was made to write a read-only register.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NotWritable {
	pub name: String,
}

/// An error from a typed register access through the device façade.
#[derive(Debug)]
pub enum AccessError<E> {
	Transfer(TransferError<E>),
	UnknownRegister(UnknownRegister),
	NotWritable(NotWritable),
	Parse(ParseError),
	Range(RangeError),
}

/// An assertion failure from the scripted test bus.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExpectationError {
	/// A packet was written but no command expectation was queued.
	UnexpectedWrite { actual: Vec<u8> },

	/// A status packet was awaited but no response directive was queued.
	UnexpectedRead,

	/// The written packet differed from the queued expectation.
	Mismatch { expected: Vec<u8>, actual: Vec<u8> },

	/// A script finished with unconsumed expectations.
	Leftover { commands: usize, responses: usize },
}

/// A register table file could not be loaded.
#[derive(Debug)]
pub enum LoadError {
	Io(std::io::Error),
	Table(TableError),
}

/// A syntax or consistency error in a register table, with its line number.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableError {
	pub line: usize,
	pub kind: TableErrorKind,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TableErrorKind {
	/// A line that matches no known directive.
	UnexpectedLine,

	/// A `Register:` or `Model:` line outside a `DeviceType:` block.
	OutsideBlock,

	/// A `DeviceType:` line inside an open block.
	NestedBlock,

	/// The block ended without a `Model:` line.
	MissingModel,

	/// The file ended with an open `DeviceType:` block.
	UnterminatedBlock,

	/// A field that should have been an integer.
	BadInteger(String),

	/// An access token other than `ro` or `rw`.
	BadAccess(String),

	/// A register size other than 1 or 2.
	BadSize(String),

	/// Two registers of one device type share an offset.
	DuplicateOffset(u8),

	/// Two registers of one device type share a name.
	DuplicateName(String),

	/// Two device types share a name.
	DuplicateDeviceType(String),

	/// The declared range does not fit in the register width.
	RangeTooWide { max: u16 },

	/// The declared minimum is above the declared maximum.
	InvertedRange { min: u16, max: u16 },

	/// The register kind requires a different width than declared.
	KindWidthMismatch { kind: &'static str, size: u8 },
}

impl From<FramingError> for DecodeError {
	fn from(other: FramingError) -> Self {
		Self::Framing(other)
	}
}

impl From<InvalidChecksum> for DecodeError {
	fn from(other: InvalidChecksum) -> Self {
		Self::Checksum(other)
	}
}

impl<E> From<DecodeError> for ReadError<E> {
	fn from(other: DecodeError) -> Self {
		match other {
			DecodeError::Framing(e) => Self::Framing(e),
			DecodeError::Checksum(e) => Self::Checksum(e),
		}
	}
}

impl<E> From<FramingError> for ReadError<E> {
	fn from(other: FramingError) -> Self {
		Self::Framing(other)
	}
}

impl<E> From<InvalidChecksum> for ReadError<E> {
	fn from(other: InvalidChecksum) -> Self {
		Self::Checksum(other)
	}
}

impl<E> From<ReadError<E>> for TransferError<E> {
	fn from(other: ReadError<E>) -> Self {
		Self::Read(other)
	}
}

impl<E> From<FramingError> for TransferError<E> {
	fn from(other: FramingError) -> Self {
		Self::Read(other.into())
	}
}

impl<E> From<DeviceError> for TransferError<E> {
	fn from(other: DeviceError) -> Self {
		Self::Device(other)
	}
}

impl<E> From<TransferError<E>> for AccessError<E> {
	fn from(other: TransferError<E>) -> Self {
		Self::Transfer(other)
	}
}

impl<E> From<UnknownRegister> for AccessError<E> {
	fn from(other: UnknownRegister) -> Self {
		Self::UnknownRegister(other)
	}
}

impl<E> From<NotWritable> for AccessError<E> {
	fn from(other: NotWritable) -> Self {
		Self::NotWritable(other)
	}
}

impl<E> From<ParseError> for AccessError<E> {
	fn from(other: ParseError) -> Self {
		Self::Parse(other)
	}
}

impl<E> From<RangeError> for AccessError<E> {
	fn from(other: RangeError) -> Self {
		Self::Range(other)
	}
}

impl From<TableError> for LoadError {
	fn from(other: TableError) -> Self {
		Self::Table(other)
	}
}

impl From<std::io::Error> for LoadError {
	fn from(other: std::io::Error) -> Self {
		Self::Io(other)
	}
}

impl std::error::Error for FramingError {}
impl std::error::Error for InvalidChecksum {}
impl std::error::Error for DecodeError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for ParseError {}
impl std::error::Error for RangeError {}
impl std::error::Error for UnknownRegister {}
impl std::error::Error for UnknownDeviceType {}
impl std::error::Error for NotWritable {}
impl std::error::Error for ExpectationError {}
impl std::error::Error for TableError {}
impl std::error::Error for LoadError {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ReadError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TransferError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for AccessError<E> {}

impl std::fmt::Display for FramingError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::InvalidPreamble { byte } => write!(f, "invalid preamble, expected 0xFF, got {:#04X}", byte),
			Self::InvalidLength { length } => write!(f, "invalid packet length: {}", length),
			Self::UnexpectedPacketId { actual, expected } => {
				write!(f, "unexpected packet ID, expected {}, got {}", expected, actual)
			},
			Self::UnexpectedParameterCount { actual, expected } => {
				write!(f, "unexpected parameter count, expected {}, got {}", expected, actual)
			},
		}
	}
}

impl std::fmt::Display for InvalidChecksum {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid checksum, message claims {:#04X}, computed {:#04X}", self.message, self.computed)
	}
}

impl std::fmt::Display for DecodeError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Framing(e) => write!(f, "{}", e),
			Self::Checksum(e) => write!(f, "{}", e),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for ReadError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Timeout => write!(f, "timed out waiting for a status packet"),
			Self::Framing(e) => write!(f, "{}", e),
			Self::Checksum(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for DeviceError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "device reported an error: {}", self.flags)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for TransferError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Write(e) => write!(f, "{}", e),
			Self::Read(e) => write!(f, "{}", e),
			Self::Device(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for ParseError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid value {:?}: expected {}", self.value, self.expected)
	}
}

impl std::fmt::Display for RangeError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "value {} outside the allowed range [{}, {}]", self.value, self.min, self.max)
	}
}

impl std::fmt::Display for UnknownRegister {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "unknown register: {}", self.name)
	}
}

impl std::fmt::Display for UnknownDeviceType {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "unknown device type: {}", self.name)
	}
}

impl std::fmt::Display for NotWritable {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "register {} is read-only", self.name)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for AccessError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Transfer(e) => write!(f, "{}", e),
			Self::UnknownRegister(e) => write!(f, "{}", e),
			Self::NotWritable(e) => write!(f, "{}", e),
			Self::Parse(e) => write!(f, "{}", e),
			Self::Range(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for ExpectationError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::UnexpectedWrite { actual } => {
				write!(f, "unexpected write, no command was queued: {:02X?}", actual)
			},
			Self::UnexpectedRead => write!(f, "unexpected read, no response was queued"),
			Self::Mismatch { expected, actual } => {
				write!(f, "command mismatch, expected {:02X?}, got {:02X?}", expected, actual)
			},
			Self::Leftover { commands, responses } => {
				write!(f, "script ended with {} queued command(s) and {} queued response(s)", commands, responses)
			},
		}
	}
}

impl std::fmt::Display for TableError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "line {}: {}", self.line, self.kind)
	}
}

impl std::fmt::Display for TableErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::UnexpectedLine => write!(f, "unrecognised directive"),
			Self::OutsideBlock => write!(f, "directive outside a DeviceType block"),
			Self::NestedBlock => write!(f, "DeviceType block inside another block"),
			Self::MissingModel => write!(f, "DeviceType block without a Model line"),
			Self::UnterminatedBlock => write!(f, "unterminated DeviceType block"),
			Self::BadInteger(token) => write!(f, "invalid integer: {}", token),
			Self::BadAccess(token) => write!(f, "invalid access (expected ro or rw): {}", token),
			Self::BadSize(token) => write!(f, "invalid register size (expected 1 or 2): {}", token),
			Self::DuplicateOffset(offset) => write!(f, "duplicate register offset {:#04X}", offset),
			Self::DuplicateName(name) => write!(f, "duplicate register name: {}", name),
			Self::DuplicateDeviceType(name) => write!(f, "duplicate device type: {}", name),
			Self::RangeTooWide { max } => write!(f, "range exceeds the register width (max {})", max),
			Self::InvertedRange { min, max } => write!(f, "range minimum {} is above maximum {}", min, max),
			Self::KindWidthMismatch { kind, size } => {
				write!(f, "register kind {} can not have size {}", kind, size)
			},
		}
	}
}

impl std::fmt::Display for LoadError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Table(e) => write!(f, "{}", e),
		}
	}
}
