//! Locating and spawning the Playwright driver process.
//!
//! The driver is the Node.js Playwright CLI started in `run-driver` mode. It
//! is found either through `PLAYWRIGHT_DRIVER_PATH` (an unpacked driver
//! bundle: `node` plus `package/cli.js`) or through `npx` on `PATH`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{TransportParts, pipe_transport};

pub const DRIVER_PATH_ENV: &str = "PLAYWRIGHT_DRIVER_PATH";

/// Program and arguments that start the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCommand {
	pub program: PathBuf,
	pub args: Vec<String>,
}

impl DriverCommand {
	/// Resolves the driver from the environment, preferring an explicit bundle.
	pub fn locate() -> Result<Self> {
		match std::env::var_os(DRIVER_PATH_ENV) {
			Some(dir) if !dir.is_empty() => Self::from_bundle(Path::new(&dir)),
			_ => {
				let npx = which::which("npx").map_err(|e| Error::Launch(format!("npx not found on PATH ({e}); set {DRIVER_PATH_ENV}")))?;
				Ok(Self::npx(npx))
			}
		}
	}

	/// Uses an unpacked driver bundle. The bundled `node` wins over one on `PATH`.
	pub fn from_bundle(dir: &Path) -> Result<Self> {
		let cli = [dir.join("package").join("cli.js"), dir.join("cli.js")]
			.into_iter()
			.find(|candidate| candidate.is_file())
			.ok_or_else(|| Error::Launch(format!("no cli.js under {}", dir.display())))?;

		let bundled_node = dir.join(if cfg!(windows) { "node.exe" } else { "node" });
		let node = if bundled_node.is_file() {
			bundled_node
		} else {
			which::which("node").map_err(|e| Error::Launch(format!("node not found next to {} or on PATH ({e})", cli.display())))?
		};

		Ok(Self {
			program: node,
			args: vec![cli.to_string_lossy().into_owned(), "run-driver".to_string()],
		})
	}

	pub fn npx(npx: PathBuf) -> Self {
		Self {
			program: npx,
			args: vec!["--yes".to_string(), "playwright".to_string(), "run-driver".to_string()],
		}
	}
}

/// A running driver process. Killed when dropped.
#[derive(Debug)]
pub struct DriverProcess {
	child: Child,
}

impl DriverProcess {
	/// Starts the driver and wires its stdio into a transport.
	pub fn spawn(command: &DriverCommand) -> Result<(Self, TransportParts)> {
		info!(target = "passbak.runtime", program = %command.program.display(), "starting Playwright driver");

		let mut child = Command::new(&command.program)
			.args(&command.args)
			.env("PW_LANG_NAME", "rust")
			.env("PW_LANG_NAME_VERSION", env!("CARGO_PKG_VERSION"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::Launch(format!("{}: {e}", command.program.display())))?;

		let stdin = child.stdin.take().ok_or_else(|| Error::Launch("driver stdin unavailable".to_string()))?;
		let stdout = child.stdout.take().ok_or_else(|| Error::Launch("driver stdout unavailable".to_string()))?;
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(async move {
				let mut lines = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					debug!(target = "passbak.runtime", driver = %line, "driver stderr");
				}
			});
		}

		Ok((Self { child }, pipe_transport(stdin, stdout)))
	}

	pub fn id(&self) -> Option<u32> {
		self.child.id()
	}

	/// Kills the driver and reaps it.
	pub async fn shutdown(mut self) -> Result<()> {
		if let Err(err) = self.child.start_kill() {
			warn!(target = "passbak.runtime", error = %err, "driver already gone");
		}
		self.child.wait().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bundle_with_node_uses_bundled_node() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("package")).unwrap();
		std::fs::write(dir.path().join("package").join("cli.js"), "").unwrap();
		let node = dir.path().join(if cfg!(windows) { "node.exe" } else { "node" });
		std::fs::write(&node, "").unwrap();

		let command = DriverCommand::from_bundle(dir.path()).unwrap();
		assert_eq!(command.program, node);
		assert_eq!(command.args[1], "run-driver");
		assert!(command.args[0].ends_with("cli.js"));
	}

	#[test]
	fn bundle_without_cli_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let err = DriverCommand::from_bundle(dir.path()).unwrap_err();
		assert!(matches!(err, Error::Launch(msg) if msg.contains("no cli.js")));
	}

	#[test]
	fn npx_runs_the_playwright_package() {
		let command = DriverCommand::npx(PathBuf::from("/usr/bin/npx"));
		assert_eq!(command.args, ["--yes", "playwright", "run-driver"]);
	}

	#[tokio::test]
	async fn missing_program_fails_to_launch() {
		let command = DriverCommand {
			program: PathBuf::from("/nonexistent/passbak-driver"),
			args: Vec::new(),
		};
		assert!(matches!(DriverProcess::spawn(&command), Err(Error::Launch(_))));
	}
}
