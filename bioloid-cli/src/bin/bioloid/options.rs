use std::path::PathBuf;

/// Communicate with Dynamixel/Bioloid devices on a half-duplex serial bus.
///
/// Device commands take the form `<type> <id> <verb> [args...]`,
/// for example: `servo 1 get present-temp`.
/// Most commands accept the special ID "broadcast" (254);
/// broadcasts never wait for a reply.
#[derive(clap::Parser)]
pub struct Options {
	/// Print more verbose messages. Can be used multiple times.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial port to use.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(env = "BIOLOID_PORT")]
	#[cfg_attr(target_os = "windows", clap(default_value = "COM1"))]
	#[cfg_attr(not(target_os = "windows"), clap(default_value = "/dev/ttyUSB0"))]
	pub port: PathBuf,

	/// The baud rate for the serial port.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(default_value = "1000000")]
	pub baud_rate: u32,

	/// The time to wait for a single status packet, in milliseconds.
	#[clap(long)]
	#[clap(global = true)]
	#[clap(default_value = "50")]
	pub timeout: u64,

	/// Load an additional register table file. Can be used multiple times.
	///
	/// The AX-12 "servo" table is always available.
	#[clap(long, short)]
	#[clap(global = true)]
	pub table: Vec<PathBuf>,

	#[clap(subcommand)]
	pub command: Command,
}

#[derive(clap::Parser)]
pub enum Command {
	/// Run one device command against the serial bus.
	Exec {
		/// The command tokens, e.g.: servo 1 get present-temp
		#[clap(value_name = "TOKEN")]
		#[clap(required = true)]
		tokens: Vec<String>,
	},

	/// Run a hardware-free test script against the scripted test bus.
	RunScript {
		/// The script file to run.
		#[clap(value_name = "SCRIPT")]
		script: PathBuf,
	},

	/// Write shell completions to standard output or a file.
	ShellCompletion {
		/// The shell for which to generate completions.
		#[clap(long)]
		shell: clap_complete::Shell,

		/// The file to write the generated completion file to.
		#[clap(long, short)]
		output: Option<PathBuf>,
	},
}
