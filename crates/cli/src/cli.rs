use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use passbak::{Credentials, Error, Settings, UiLocale};

#[derive(Parser, Debug)]
#[command(name = "passbak")]
#[command(about = "Scheduled Proton Pass vault export")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Account e-mail address
	#[arg(long, env = "PROTON_EMAIL")]
	pub email: Option<String>,

	/// Account password
	#[arg(long, env = "PROTON_PASSWORD", hide_env_values = true)]
	pub password: Option<String>,

	/// Cron expression (5 fields, or 6/7 with seconds) [default: "* * * * *"]
	#[arg(long, env = "CRON")]
	pub cron: Option<String>,

	/// Directory export archives are written to [default: ./backups]
	#[arg(long, env = "BACKUP_PATH", value_name = "DIR")]
	pub backup_path: Option<PathBuf>,

	/// IANA time zone the cron expression is evaluated in [default: Europe/Berlin]
	#[arg(long, env = "TZ")]
	pub tz: Option<String>,

	/// Run one export immediately and exit with its status
	#[arg(long, env = "RUN_NOW", value_parser = FalseyValueParser::new())]
	pub run_now: bool,

	/// Session snapshot file [default: playwright/.auth.json]
	#[arg(long, global = true, env = "PASSBAK_SESSION_PATH", value_name = "FILE")]
	pub session_path: Option<PathBuf>,

	/// JSON file with timeouts, settle delays, labels and other tuning
	#[arg(long, global = true, env = "PASSBAK_CONFIG", value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Language of the vault UI: en, or de for an account set to German [default: en]
	#[arg(long, env = "PASSBAK_UI_LOCALE")]
	pub ui_locale: Option<String>,

	/// Show the browser window
	#[arg(long, env = "PASSBAK_HEADED", value_parser = FalseyValueParser::new())]
	pub headed: bool,

	#[command(subcommand)]
	pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Inspect or remove the saved session snapshot
	Session {
		#[command(subcommand)]
		action: SessionAction,
	},
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
	/// Print cookie and origin counts of the snapshot
	Show,
	/// Delete the snapshot, forcing a full login on the next run
	Clear,
}

impl Cli {
	/// Defaults, then the config file, then flags and environment.
	pub fn settings(&self) -> passbak::Result<Settings> {
		let mut settings = match &self.config {
			Some(path) => Settings::from_file(path)?,
			None => Settings::default(),
		};

		if let Some(cron) = &self.cron {
			settings.cron = cron.clone();
		}
		if let Some(dir) = &self.backup_path {
			settings.backup_dir = dir.clone();
		}
		if let Some(tz) = &self.tz {
			settings.time_zone = tz.clone();
		}
		if let Some(path) = &self.session_path {
			settings.session_path = path.clone();
		}
		if let Some(locale) = &self.ui_locale {
			settings.labels = locale.parse::<UiLocale>()?.labels();
		}
		if self.headed {
			settings.browser.headless = false;
		}
		Ok(settings)
	}

	pub fn credentials(&self) -> passbak::Result<Credentials> {
		match (self.email.as_deref(), self.password.as_deref()) {
			(Some(email), Some(password)) => Credentials::new(email, password),
			_ => Err(Error::Configuration(
				"PROTON_EMAIL and PROTON_PASSWORD (or --email and --password) must be provided".to_string(),
			)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn parse(args: &[&str]) -> Cli {
		Cli::try_parse_from(std::iter::once("passbak").chain(args.iter().copied())).unwrap()
	}

	#[test]
	fn flags_override_settings() {
		let cli = parse(&[
			"--cron",
			"0 3 * * *",
			"--tz",
			"UTC",
			"--backup-path",
			"/srv/backups",
			"--session-path",
			"/srv/auth.json",
			"--ui-locale",
			"de",
			"--headed",
		]);
		let settings = cli.settings().unwrap();
		assert_eq!(settings.cron, "0 3 * * *");
		assert_eq!(settings.time_zone, "UTC");
		assert_eq!(settings.backup_dir, PathBuf::from("/srv/backups"));
		assert_eq!(settings.session_path, PathBuf::from("/srv/auth.json"));
		assert_eq!(settings.labels.authenticate, "Authentifizieren");
		assert!(!settings.browser.headless);
	}

	#[test]
	fn flags_win_over_config_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("passbak.json");
		std::fs::write(&path, r#"{"cron": "0 0 * * *", "backup_dir": "/from/file", "timeouts": {"download": 5000}}"#).unwrap();

		let cli = parse(&["--config", path.to_str().unwrap(), "--backup-path", "/from/flag", "--cron", "*/5 * * * *"]);
		let settings = cli.settings().unwrap();
		assert_eq!(settings.backup_dir, PathBuf::from("/from/flag"));
		assert_eq!(settings.cron, "*/5 * * * *");
		assert_eq!(settings.timeouts.download, Duration::from_secs(5));
	}

	#[test]
	fn unknown_locale_is_a_configuration_error() {
		let cli = parse(&["--ui-locale", "fr"]);
		assert!(cli.settings().unwrap_err().is_configuration());
	}

	#[test]
	fn explicit_credentials_are_accepted() {
		let cli = parse(&["--email", "user@example.com", "--password", "secret"]);
		assert_eq!(cli.credentials().unwrap().identifier(), "user@example.com");
	}

	#[test]
	fn session_subcommands_parse() {
		let cli = parse(&["session", "clear"]);
		assert!(matches!(
			cli.command,
			Some(Commands::Session {
				action: SessionAction::Clear
			})
		));
	}
}
