/// Initialize env_logger.
///
/// Messages from other crates stay at warn and above.
/// Each `-v` raises the level for our own modules by one step:
/// info by default, then debug, then trace (wire-level byte dumps).
pub fn init(root_module: &str, verbosity: u8) {
	use std::io::Write;

	let own_level = match verbosity {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};

	let mut builder = env_logger::Builder::new();
	builder.filter_level(log::LevelFilter::Warn);
	builder.filter_module(root_module, own_level);
	builder.filter_module("bioloid", own_level);
	builder.format(|buffer, record: &log::Record| {
		// Info and debug lines are the normal output and get no prefix.
		let prefix = match record.level() {
			log::Level::Error => "Error: ",
			log::Level::Warn => "Warning: ",
			log::Level::Trace => "Trace: ",
			log::Level::Debug | log::Level::Info => return writeln!(buffer, "{}", record.args()),
		};

		let mut style = buffer.style();
		match record.level() {
			log::Level::Error => style.set_color(env_logger::fmt::Color::Red).set_bold(true),
			log::Level::Warn => style.set_color(env_logger::fmt::Color::Yellow).set_bold(true),
			_ => &mut style,
		};
		writeln!(buffer, "{}{}", style.value(prefix), record.args())
	});
	builder.init();
}
