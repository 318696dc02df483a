use clap::Parser;
use std::path::Path;
use std::time::Duration;

use bioloid::{Client, Registry, SerialBus};

mod command;
mod logging;
mod options;
mod script;

use options::{Command, Options};

fn main() {
	let options = Options::parse();
	logging::init(env!("CARGO_CRATE_NAME"), options.verbose);
	if let Err(()) = do_main(options) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	match &options.command {
		Command::Exec { tokens } => {
			let registry = load_registry(&options)?;
			let mut client = open_bus(&options)?;
			let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
			let mut output = String::new();
			command::execute(&mut client, &registry, &tokens, &mut output)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			print!("{}", output);
			Ok(())
		},
		Command::RunScript { script } => {
			let registry = load_registry(&options)?;
			let text = std::fs::read_to_string(script)
				.map_err(|e| log::error!("Failed to read {}: {}", script.display(), e))?;
			let transcript = script::run_script(&registry, &text)
				.map_err(|e| log::error!("{}: {}", script.display(), e))?;
			print!("{}", transcript);
			log::info!("Ok");
			Ok(())
		},
		Command::ShellCompletion { shell, output } => write_shell_completion(*shell, output.as_deref()),
	}
}

fn load_registry(options: &Options) -> Result<Registry, ()> {
	let mut registry = Registry::new();
	registry
		.load_str(include_str!("../../../../tables/servo.tbl"))
		.map_err(|e| log::error!("Invalid built-in register table: {}", e))?;
	for path in &options.table {
		registry
			.load_file(path)
			.map_err(|e| log::error!("Failed to load {}: {}", path.display(), e))?;
	}
	Ok(registry)
}

fn open_bus(options: &Options) -> Result<Client<SerialBus>, ()> {
	let bus = SerialBus::open(&options.port, options.baud_rate)
		.map_err(|e| log::error!("Failed to open serial port: {}: {}", options.port.display(), e))?;
	log::debug!("Using serial port {} with baud rate {}", options.port.display(), options.baud_rate);
	Ok(Client::with_read_timeout(bus, Duration::from_millis(options.timeout)))
}

fn write_shell_completion(shell: clap_complete::Shell, path: Option<&Path>) -> Result<(), ()> {
	use clap::CommandFactory;
	use std::io::Write;

	let mut buffer = Vec::with_capacity(4 * 1024);
	clap_complete::generate(shell, &mut Options::command(), env!("CARGO_BIN_NAME"), &mut buffer);
	if !buffer.ends_with(b"\n") {
		buffer.push(b'\n');
	}

	let path = path.unwrap_or_else(|| Path::new("-"));
	if path == Path::new("-") {
		log::debug!("Writing shell completion for {} to stdout", shell);
		let stdout = std::io::stdout();
		stdout
			.lock()
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to stdout: {}", e))?;
	} else {
		log::debug!("Writing shell completion for {} to {}", shell, path.display());
		let mut output = std::fs::File::create(path).map_err(|e| log::error!("Failed to create {}: {}", path.display(), e))?;
		output
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to {}: {}", path.display(), e))?;
	}

	Ok(())
}
