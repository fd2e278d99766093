use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_logging(verbose: u8) {
	let default = match verbose {
		0 => "passbak=info,warn",
		1 => "passbak=debug,info",
		_ => "passbak=trace,debug",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(std::io::stderr().is_terminal())
		.with_target(false)
		.try_init();
}
