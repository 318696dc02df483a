//! Host-side driver for Dynamixel/Bioloid devices on a half-duplex serial bus.
//!
//! The driver speaks the Dynamixel 1.0 wire protocol.
//! Register maps are loaded from declarative table files into a [`Registry`];
//! a [`Client`] drives the bus, and a [`Device`] gives typed access
//! to the registers of one device with unit conversion and range checking.
//!
//! The bus behind the [`Client`] is anything that implements [`Bus`]:
//! a [`SerialBus`] over a real serial port,
//! or a [`TestBus`] that replays a script and verifies every emitted byte.

mod bus;
mod checksum;
mod client;
mod decoder;
mod device;
mod endian;
mod error;
pub mod packet;
mod register;
mod registry;
mod test_bus;

pub use bus::Bus;
pub use bus::SerialBus;

pub use client::Client;
pub use client::ScanResult;
pub use client::StatusReturnLevel;
pub use client::SyncWriteData;

pub use decoder::Decoder;

pub use device::Device;

pub use error::AccessError;
pub use error::DecodeError;
pub use error::DeviceError;
pub use error::ExpectationError;
pub use error::FramingError;
pub use error::InvalidChecksum;
pub use error::LoadError;
pub use error::NotWritable;
pub use error::ParseError;
pub use error::RangeError;
pub use error::ReadError;
pub use error::TableError;
pub use error::TableErrorKind;
pub use error::TransferError;
pub use error::UnknownDeviceType;
pub use error::UnknownRegister;

pub use packet::ErrorFlags;
pub use packet::StatusPacket;

pub use register::parse_integer;
pub use register::Access;
pub use register::RegisterKind;

pub use registry::DeviceType;
pub use registry::Register;
pub use registry::Registry;

pub use test_bus::ExpectedCommand;
pub use test_bus::ScriptedResponse;
pub use test_bus::TestBus;
