//! Runner for hardware-free test scripts.
//!
//! A script queues expected commands and scripted responses on a
//! [`TestBus`], then executes device commands and asserts on their outcome:
//!
//! ```text
//! echo reading the temperature
//! test cmd-raw FF FF 01 04 02 2B 01 CC
//! test rsp-raw FF FF 01 03 00 20 DB
//! test output "32C" servo 1 get present-temp
//! ```
//!
//! A run is clean only if every assertion held and both queues are
//! empty at the end of the script.

use bioloid::packet::instruction_id;
use bioloid::{Client, ErrorFlags, Registry, TestBus};

use crate::command;

/// A failed script, with the line that failed.
#[derive(Debug)]
pub struct ScriptFailure {
	pub line: usize,
	pub message: String,
}

impl std::fmt::Display for ScriptFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "line {}: {}", self.line, self.message)
	}
}

impl std::error::Error for ScriptFailure {}

/// Run a test script against a fresh [`TestBus`].
///
/// Returns the transcript (echo lines and command output) of a clean run.
pub fn run_script(registry: &Registry, script: &str) -> Result<String, ScriptFailure> {
	let mut client = Client::new(TestBus::new());
	let mut transcript = String::new();
	let mut last_line = 0;

	for (index, raw_line) in script.lines().enumerate() {
		let line = index + 1;
		last_line = line;
		let tokens = tokenize(raw_line);
		let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
		let fail = |message: String| ScriptFailure { line, message };

		match tokens.split_first() {
			None => continue,
			Some((&"echo", rest)) => {
				transcript.push_str(&rest.join(" "));
				transcript.push('\n');
			},
			Some((&"test", rest)) => run_test_directive(&mut client, registry, rest, &mut transcript).map_err(fail)?,
			Some(_) => {
				// A bare command must simply succeed.
				command::execute(&mut client, registry, &tokens, &mut transcript)
					.map_err(|e| fail(e.to_string()))?;
			},
		}
	}

	client.bus_mut().finish().map_err(|e| ScriptFailure {
		line: last_line,
		message: e.to_string(),
	})?;
	Ok(transcript)
}

fn run_test_directive(
	client: &mut Client<TestBus>,
	registry: &Registry,
	tokens: &[&str],
	transcript: &mut String,
) -> Result<(), String> {
	match tokens.split_first() {
		Some((&"cmd", rest)) => {
			let ((id, instruction), parameters) = match rest {
				[id, instruction, parameters @ ..] => ((parse_hex_byte(id)?, parse_instruction(instruction)?), parameters),
				_ => return Err(String::from("usage: test cmd <id_hex> <instr> <hex byte> ...")),
			};
			let parameters = parse_hex_bytes(parameters)?;
			client.bus_mut().expect_instruction(id, instruction, parameters);
			Ok(())
		},
		Some((&"cmd-raw", rest)) => {
			let bytes = parse_hex_bytes(rest)?;
			client.bus_mut().expect_raw(bytes);
			Ok(())
		},
		Some((&"rsp", rest)) => {
			let ((id, error), parameters) = match rest {
				[id, error, parameters @ ..] => ((parse_hex_byte(id)?, parse_error_flags(error)?), parameters),
				_ => return Err(String::from("usage: test rsp <id_hex> <error_name|none> <hex byte> ...")),
			};
			let parameters = parse_hex_bytes(parameters)?;
			client.bus_mut().respond_status(id, error, parameters);
			Ok(())
		},
		Some((&"rsp-raw", rest)) => {
			let bytes = parse_hex_bytes(rest)?;
			client.bus_mut().respond_raw(bytes);
			Ok(())
		},
		Some((&"rsp-timeout", [])) => {
			client.bus_mut().respond_timeout();
			Ok(())
		},
		Some((&"rsp-none", [])) => {
			client.bus_mut().respond_none();
			Ok(())
		},
		Some((&"success", command @ [_, ..])) => {
			command::execute(client, registry, command, transcript).map_err(|e| e.to_string())
		},
		Some((&"error", command @ [_, ..])) => match command::execute(client, registry, command, transcript) {
			Ok(()) => Err(String::from("expected the command to fail, but it succeeded")),
			Err(_) => Ok(()),
		},
		Some((&"output", [expected, command @ ..])) if !command.is_empty() => {
			let mut output = String::new();
			command::execute(client, registry, command, &mut output).map_err(|e| e.to_string())?;
			transcript.push_str(&output);
			if output.trim_end() != expected.trim_end() {
				return Err(format!("expected output {:?}, got {:?}", expected, output.trim_end()));
			}
			Ok(())
		},
		_ => Err(String::from(
			"usage: test <cmd|cmd-raw|rsp|rsp-raw|rsp-timeout|rsp-none|success|error|output> ...",
		)),
	}
}

fn parse_instruction(token: &str) -> Result<u8, String> {
	match token {
		"ping" => Ok(instruction_id::PING),
		"read" => Ok(instruction_id::READ_DATA),
		"write" => Ok(instruction_id::WRITE_DATA),
		"reg-write" => Ok(instruction_id::REG_WRITE),
		"action" => Ok(instruction_id::ACTION),
		"reset" => Ok(instruction_id::RESET),
		_ => Err(format!("unknown instruction: {}", token)),
	}
}

fn parse_error_flags(token: &str) -> Result<ErrorFlags, String> {
	ErrorFlags::parse(token).ok_or_else(|| format!("unknown error flags: {}", token))
}

fn parse_hex_byte(token: &str) -> Result<u8, String> {
	u8::from_str_radix(token, 16).map_err(|_| format!("invalid hex byte: {}", token))
}

fn parse_hex_bytes(tokens: &[&str]) -> Result<Vec<u8>, String> {
	tokens.iter().map(|token| parse_hex_byte(token)).collect()
}

/// Split a line into tokens, honouring double quotes and `#` comments.
fn tokenize(line: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut in_quotes = false;

	for ch in line.chars() {
		match ch {
			'"' => {
				if in_quotes {
					tokens.push(std::mem::take(&mut current));
				}
				in_quotes = !in_quotes;
			},
			'#' if !in_quotes => break,
			ch if ch.is_whitespace() && !in_quotes => {
				if !current.is_empty() {
					tokens.push(std::mem::take(&mut current));
				}
			},
			ch => current.push(ch),
		}
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	tokens
}
