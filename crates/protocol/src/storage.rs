//! Browser storage state: the session snapshot persisted between runs.
//!
//! The layout matches what the driver returns from `BrowserContext.storageState`
//! and accepts as `storageState` when creating a context, so a file written by
//! one run can be fed verbatim into the next.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
	Strict,
	Lax,
	None,
}

/// A cookie as reported by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Unix seconds; `-1` marks a session cookie.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
	/// Fields newer drivers add (partition keys and the like), kept verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: Some(domain.into()),
			path: Some("/".to_string()),
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
			extra: Map::new(),
		}
	}

	/// Whether the cookie carries an expiry that lies before `now_secs`.
	pub fn is_expired_at(&self, now_secs: f64) -> bool {
		match self.expires {
			Some(ts) if ts >= 0.0 => ts < now_secs,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
	pub name: String,
	pub value: String,
}

/// Local storage captured for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
	pub origin: String,
	#[serde(default)]
	pub local_storage: Vec<LocalStorageEntry>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Cookies plus per-origin local storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub origins: Vec<OriginState>,
}

impl StorageState {
	/// Reads a storage-state JSON document.
	pub fn from_file(path: &Path) -> io::Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&content)?)
	}

	/// Writes the document as pretty JSON, replacing whatever was at `path`.
	pub fn to_file(&self, path: &Path) -> io::Result<()> {
		let json = serde_json::to_string_pretty(self)?;
		std::fs::write(path, json)
	}
}
