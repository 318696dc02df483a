//! Dispatch of device commands like `servo 1 get present-temp`.
//!
//! Commands are dispatched through a verb table,
//! so the script runner and the command line share one grammar.

use std::fmt::Write;

use bioloid::packet::packet_id;
use bioloid::{AccessError, Bus, Client, Device, Registry, TransferError, UnknownDeviceType};

/// A failed command.
#[derive(Debug)]
pub enum CommandError<E> {
	/// The command did not match the grammar.
	Usage(&'static str),

	UnknownDeviceType(UnknownDeviceType),

	Access(AccessError<E>),
}

impl<E> From<UnknownDeviceType> for CommandError<E> {
	fn from(other: UnknownDeviceType) -> Self {
		Self::UnknownDeviceType(other)
	}
}

impl<E> From<AccessError<E>> for CommandError<E> {
	fn from(other: AccessError<E>) -> Self {
		Self::Access(other)
	}
}

impl<E> From<TransferError<E>> for CommandError<E> {
	fn from(other: TransferError<E>) -> Self {
		Self::Access(AccessError::Transfer(other))
	}
}

impl<E: std::fmt::Display> std::fmt::Display for CommandError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Usage(usage) => write!(f, "usage: {}", usage),
			Self::UnknownDeviceType(e) => write!(f, "{}", e),
			Self::Access(e) => write!(f, "{}", e),
		}
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CommandError<E> {}

type Handler<B> = fn(&mut Device<'_, B>, &[&str], &mut String) -> Result<(), CommandError<<B as Bus>::Error>>;

/// The verbs that operate on one addressed device.
fn device_verbs<B: Bus>() -> [(&'static str, Handler<B>); 10] {
	[
		("ping", ping as Handler<B>),
		("reset", reset),
		("get", get),
		("get-raw", get_raw),
		("set", set),
		("set-raw", set_raw),
		("deferred-set", deferred_set),
		("read", read),
		("write", write),
		("reg-write", reg_write),
	]
}

/// Execute one tokenized command against the bus.
///
/// Anything the command prints is appended to `output`.
pub fn execute<B: Bus>(
	client: &mut Client<B>,
	registry: &Registry,
	tokens: &[&str],
	output: &mut String,
) -> Result<(), CommandError<B::Error>> {
	match tokens {
		["action"] => {
			client.action()?;
			Ok(())
		},
		[type_name, "scan", range @ ..] => scan(client, registry, type_name, range, output),
		[type_name, id, verb, args @ ..] => {
			let device_type = registry.get(type_name)?;
			let id = parse_id(id)?;
			let mut device = Device::new(client, device_type, id);

			let verbs = device_verbs::<B>();
			let (_, handler) = verbs
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case(verb))
				.ok_or(CommandError::Usage("<type> <id> <ping|reset|get|get-raw|set|set-raw|deferred-set|read|write|reg-write> ..."))?;
			handler(&mut device, args, output)
		},
		_ => Err(CommandError::Usage("action | <type> scan [first [last]] | <type> <id> <verb> ...")),
	}
}

fn ping<B: Bus>(device: &mut Device<'_, B>, args: &[&str], output: &mut String) -> Result<(), CommandError<B::Error>> {
	no_args(args, "<type> <id> ping")?;
	let flags = device.ping()?;
	let _ = writeln!(output, "Rcvd Status: {}", flags);
	Ok(())
}

fn reset<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	no_args(args, "<type> <id> reset")?;
	Ok(device.reset()?)
}

fn get<B: Bus>(device: &mut Device<'_, B>, args: &[&str], output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [name] = args else {
		return Err(CommandError::Usage("<type> <id> get <register|all>"));
	};
	if let Some(text) = device.get(name)? {
		let _ = writeln!(output, "{}", text);
	}
	Ok(())
}

fn get_raw<B: Bus>(device: &mut Device<'_, B>, args: &[&str], output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [name] = args else {
		return Err(CommandError::Usage("<type> <id> get-raw <register>"));
	};
	if let Some(raw) = device.get_raw(name)? {
		let _ = writeln!(output, "{}", raw);
	}
	Ok(())
}

fn set<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [name, value] = args else {
		return Err(CommandError::Usage("<type> <id> set <register> <value>"));
	};
	Ok(device.set(name, value)?)
}

fn set_raw<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [name, value] = args else {
		return Err(CommandError::Usage("<type> <id> set-raw <register> <value>"));
	};
	Ok(device.set_raw(name, value)?)
}

fn deferred_set<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [name, value] = args else {
		return Err(CommandError::Usage("<type> <id> deferred-set <register> <value>"));
	};
	Ok(device.deferred_set(name, value)?)
}

fn read<B: Bus>(device: &mut Device<'_, B>, args: &[&str], output: &mut String) -> Result<(), CommandError<B::Error>> {
	let [target, count] = args else {
		return Err(CommandError::Usage("<type> <id> read <register|offset> <count>"));
	};
	let count = bioloid::parse_integer(count)
		.and_then(|count| u8::try_from(count).ok())
		.ok_or(CommandError::Usage("<type> <id> read <register|offset> <count>"))?;
	if let Some(data) = device.read_data(target, count)? {
		let hex: Vec<String> = data.iter().map(|byte| format!("{:02X}", byte)).collect();
		let _ = writeln!(output, "{}", hex.join(" "));
	}
	Ok(())
}

fn write<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	let (target, data) = parse_write_args(args, "<type> <id> write <register|offset> <byte> ...")?;
	Ok(device.write_data(target, &data)?)
}

fn reg_write<B: Bus>(device: &mut Device<'_, B>, args: &[&str], _output: &mut String) -> Result<(), CommandError<B::Error>> {
	let (target, data) = parse_write_args(args, "<type> <id> reg-write <register|offset> <byte> ...")?;
	Ok(device.reg_write_data(target, &data)?)
}

fn scan<B: Bus>(
	client: &mut Client<B>,
	registry: &Registry,
	type_name: &str,
	range: &[&str],
	output: &mut String,
) -> Result<(), CommandError<B::Error>> {
	let device_type = registry.get(type_name)?;

	let usage = "<type> scan [first [last]]";
	let parse_bound = |token: &str| {
		bioloid::parse_integer(token)
			.and_then(|id| u8::try_from(id).ok())
			.filter(|&id| id <= packet_id::MAX)
			.ok_or(CommandError::Usage(usage))
	};
	let (first, last) = match range {
		[] => (0, packet_id::MAX),
		[first] => (parse_bound(first)?, packet_id::MAX),
		[first, last] => (parse_bound(first)?, parse_bound(last)?),
		_ => return Err(CommandError::Usage(usage)),
	};

	for found in client.scan(first..=last)? {
		let name = if found.model == device_type.model() {
			device_type.name()
		} else {
			"unknown"
		};
		let _ = writeln!(output, "ID {:3}: {} (model {}, version {})", found.id, name, found.model, found.version);
	}
	Ok(())
}

fn parse_id<E>(token: &str) -> Result<u8, CommandError<E>> {
	if token.eq_ignore_ascii_case("broadcast") {
		return Ok(packet_id::BROADCAST);
	}
	bioloid::parse_integer(token)
		.and_then(|id| u8::try_from(id).ok())
		.filter(|&id| id <= packet_id::BROADCAST)
		.ok_or(CommandError::Usage("device IDs are 0-253, or 254/\"broadcast\""))
}

fn no_args<E>(args: &[&str], usage: &'static str) -> Result<(), CommandError<E>> {
	if args.is_empty() {
		Ok(())
	} else {
		Err(CommandError::Usage(usage))
	}
}

fn parse_write_args<'a, E>(args: &[&'a str], usage: &'static str) -> Result<(&'a str, Vec<u8>), CommandError<E>> {
	let [target, bytes @ ..] = args else {
		return Err(CommandError::Usage(usage));
	};
	if bytes.is_empty() {
		return Err(CommandError::Usage(usage));
	}
	let data = bytes
		.iter()
		.map(|token| {
			bioloid::parse_integer(token)
				.and_then(|byte| u8::try_from(byte).ok())
				.ok_or(CommandError::Usage(usage))
		})
		.collect::<Result<Vec<u8>, _>>()?;
	Ok((target, data))
}
