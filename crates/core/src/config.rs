//! Run configuration.
//!
//! Everything a job run needs is carried in [`Settings`] and handed to the
//! run explicitly. Defaults reproduce the behaviour of a plain deployment;
//! an optional JSON file (`PASSBAK_CONFIG`) overrides any subset of fields.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use passbak_protocol::DeviceProfile;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

pub const DEFAULT_VAULT_URL: &str = "https://pass.proton.me/u/1";
pub const DEFAULT_LANDING_PATTERN: &str = "https://pass.proton.me/u/**";
pub const DEFAULT_REAUTH_MARKER: &str = "reauth";
pub const DEFAULT_SESSION_PATH: &str = "playwright/.auth.json";
pub const DEFAULT_BACKUP_DIR: &str = "./backups";
pub const DEFAULT_CRON: &str = "* * * * *";
pub const DEFAULT_TIME_ZONE: &str = "Europe/Berlin";

/// Account identifier and secret. Lives in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	identifier: String,
	secret: String,
}

impl Credentials {
	pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
		let identifier = identifier.into();
		let secret = secret.into();
		if identifier.trim().is_empty() {
			return Err(Error::Configuration("account identifier is empty (set PROTON_EMAIL)".to_string()));
		}
		if secret.is_empty() {
			return Err(Error::Configuration("account secret is empty (set PROTON_PASSWORD)".to_string()));
		}
		Ok(Self { identifier, secret })
	}

	pub fn identifier(&self) -> &str {
		&self.identifier
	}

	pub fn secret(&self) -> &str {
		&self.secret
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("identifier", &self.identifier)
			.field("secret", &"<redacted>")
			.finish()
	}
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
	u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Upper bounds for driver waits. Values in the JSON file are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
	#[serde(deserialize_with = "millis")]
	pub action: Duration,
	#[serde(deserialize_with = "millis")]
	pub navigation: Duration,
	#[serde(deserialize_with = "millis")]
	pub landing: Duration,
	#[serde(deserialize_with = "millis")]
	pub download: Duration,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			action: Duration::from_secs(30),
			navigation: Duration::from_secs(30),
			landing: Duration::from_secs(30),
			download: Duration::from_secs(60),
		}
	}
}

/// Pauses taken after a fill or submit, before the next action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
	#[serde(deserialize_with = "millis")]
	pub reauth_fill: Duration,
	#[serde(deserialize_with = "millis")]
	pub reauth_landing: Duration,
	#[serde(deserialize_with = "millis")]
	pub login_step: Duration,
	#[serde(deserialize_with = "millis")]
	pub totp_landing: Duration,
	#[serde(deserialize_with = "millis")]
	pub export_format: Duration,
}

impl SettleDelays {
	/// No pauses at all, for tests against the fake driver.
	pub fn none() -> Self {
		Self {
			reauth_fill: Duration::ZERO,
			reauth_landing: Duration::ZERO,
			login_step: Duration::ZERO,
			totp_landing: Duration::ZERO,
			export_format: Duration::ZERO,
		}
	}
}

impl Default for SettleDelays {
	fn default() -> Self {
		Self {
			reauth_fill: Duration::from_secs(2),
			reauth_landing: Duration::from_secs(5),
			login_step: Duration::from_secs(1),
			totp_landing: Duration::from_secs(10),
			export_format: Duration::from_secs(2),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
	pub headless: bool,
	pub slow_mo_ms: u64,
	pub args: Vec<String>,
}

impl Default for BrowserOptions {
	fn default() -> Self {
		Self {
			headless: true,
			slow_mo_ms: 50,
			args: vec!["--start-maximized".to_string()],
		}
	}
}

/// Accessible names and test ids the flows locate elements by.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UiLabels {
	/// Test id of the single text input on the login and confirmation forms.
	pub text_input_test_id: String,
	pub keep_signed_in: String,
	pub continue_button: String,
	pub sign_in_button: String,
	pub authenticator_tab_test_id: String,
	/// Accessible name of the N-th code field; `{n}` is replaced by 1..=6.
	pub code_digit_field: String,

	pub theme_option: String,
	pub theme_confirm: String,
	pub more_options: String,
	pub more_options_index: usize,
	pub export_menu: String,
	pub export_format: String,
	pub export_confirm: String,
	pub authenticate: String,
}

impl UiLabels {
	pub fn english() -> Self {
		Self {
			text_input_test_id: "input-input-element".to_string(),
			keep_signed_in: "Keep me signed in".to_string(),
			continue_button: "Continue".to_string(),
			sign_in_button: "Sign in".to_string(),
			authenticator_tab_test_id: "tab-header-authenticator-app-button".to_string(),
			code_digit_field: "Enter verification code. Digit {n}.".to_string(),
			theme_option: "Dark".to_string(),
			theme_confirm: "Select".to_string(),
			more_options: "More options".to_string(),
			more_options_index: 3,
			export_menu: "Export".to_string(),
			export_format: "JSON".to_string(),
			export_confirm: "Export".to_string(),
			authenticate: "Authenticate".to_string(),
		}
	}

	/// The German vault UI. The login form is English in both locales.
	pub fn german() -> Self {
		Self {
			theme_option: "Dunkel".to_string(),
			theme_confirm: "Auswählen".to_string(),
			more_options: "Weitere Optionen".to_string(),
			export_menu: "Exportieren".to_string(),
			export_confirm: "Exportieren".to_string(),
			authenticate: "Authentifizieren".to_string(),
			..Self::english()
		}
	}

	pub fn code_digit(&self, n: usize) -> String {
		self.code_digit_field.replace("{n}", &n.to_string())
	}
}

impl Default for UiLabels {
	fn default() -> Self {
		Self::english()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiLocale {
	#[default]
	En,
	De,
}

impl UiLocale {
	pub fn labels(self) -> UiLabels {
		match self {
			Self::En => UiLabels::english(),
			Self::De => UiLabels::german(),
		}
	}
}

impl FromStr for UiLocale {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"en" => Ok(Self::En),
			"de" => Ok(Self::De),
			other => Err(Error::Configuration(format!("unsupported UI locale '{other}' (expected en or de)"))),
		}
	}
}

/// Everything a job run and the scheduler need, minus credentials.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub vault_url: String,
	/// Glob matched against the URL of the authenticated vault view.
	pub landing_pattern: String,
	/// Substring of the post-navigation URL that selects soft re-auth.
	pub reauth_marker: String,
	pub session_path: PathBuf,
	pub backup_dir: PathBuf,
	pub cron: String,
	pub time_zone: String,
	pub timeouts: Timeouts,
	pub settle: SettleDelays,
	pub browser: BrowserOptions,
	pub device: DeviceProfile,
	pub labels: UiLabels,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			vault_url: DEFAULT_VAULT_URL.to_string(),
			landing_pattern: DEFAULT_LANDING_PATTERN.to_string(),
			reauth_marker: DEFAULT_REAUTH_MARKER.to_string(),
			session_path: PathBuf::from(DEFAULT_SESSION_PATH),
			backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
			cron: DEFAULT_CRON.to_string(),
			time_zone: DEFAULT_TIME_ZONE.to_string(),
			timeouts: Timeouts::default(),
			settle: SettleDelays::default(),
			browser: BrowserOptions::default(),
			device: DeviceProfile::desktop_chrome(),
			labels: UiLabels::default(),
		}
	}
}

impl Settings {
	/// Reads a JSON settings file. Absent fields keep their defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
		serde_json::from_str(&raw).map_err(|e| Error::Configuration(format!("invalid settings in {}: {e}", path.display())))
	}
}
