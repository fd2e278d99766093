//! Parameters for launching browsers and creating contexts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::StorageState;

/// Load state a navigation or URL wait settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	Load,
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	/// No network connections for at least 500 ms.
	#[serde(rename = "networkidle")]
	NetworkIdle,
	Commit,
}

impl WaitUntil {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Load => "load",
			Self::DomContentLoaded => "domcontentloaded",
			Self::NetworkIdle => "networkidle",
			Self::Commit => "commit",
		}
	}
}

impl fmt::Display for WaitUntil {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for WaitUntil {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"load" => Ok(Self::Load),
			"domcontentloaded" => Ok(Self::DomContentLoaded),
			"networkidle" => Ok(Self::NetworkIdle),
			"commit" => Ok(Self::Commit),
			other => Err(format!("unknown load state '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

/// Emulated device a context is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
	pub user_agent: String,
	pub viewport: Viewport,
	pub device_scale_factor: f64,
	pub is_mobile: bool,
	pub has_touch: bool,
}

impl DeviceProfile {
	/// Playwright's "Desktop Chrome" descriptor.
	pub fn desktop_chrome() -> Self {
		Self {
			user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.33 Safari/537.36"
				.to_string(),
			viewport: Viewport { width: 1280, height: 720 },
			device_scale_factor: 1.0,
			is_mobile: false,
			has_touch: false,
		}
	}
}

impl Default for DeviceProfile {
	fn default() -> Self {
		Self::desktop_chrome()
	}
}

/// `BrowserType.launch` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParams {
	pub headless: bool,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
	/// Pause inserted by the driver after every action, in milliseconds.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub slow_mo: Option<f64>,
	pub timeout: f64,
}

/// `Browser.newContext` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContextParams {
	pub user_agent: String,
	pub viewport: Viewport,
	pub device_scale_factor: f64,
	pub is_mobile: bool,
	pub has_touch: bool,
	/// `accept`, `deny` or `internal-browser-default`.
	pub accept_downloads: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub storage_state: Option<StorageState>,
}

impl NewContextParams {
	pub fn new(device: &DeviceProfile, storage_state: Option<StorageState>) -> Self {
		Self {
			user_agent: device.user_agent.clone(),
			viewport: device.viewport,
			device_scale_factor: device.device_scale_factor,
			is_mobile: device.is_mobile,
			has_touch: device.has_touch,
			accept_downloads: "accept",
			storage_state,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wait_until_uses_driver_spelling() {
		assert_eq!(serde_json::to_value(WaitUntil::NetworkIdle).unwrap(), "networkidle");
		assert_eq!(serde_json::to_value(WaitUntil::DomContentLoaded).unwrap(), "domcontentloaded");
		assert_eq!("networkidle".parse::<WaitUntil>().unwrap(), WaitUntil::NetworkIdle);
		assert!("idle".parse::<WaitUntil>().is_err());
	}

	#[test]
	fn context_params_flatten_device_profile() {
		let params = NewContextParams::new(&DeviceProfile::desktop_chrome(), None);
		let json = serde_json::to_value(&params).unwrap();
		assert_eq!(json["viewport"]["width"], 1280);
		assert_eq!(json["deviceScaleFactor"], 1.0);
		assert_eq!(json["acceptDownloads"], "accept");
		assert!(json.get("storageState").is_none());
	}

	#[test]
	fn launch_params_omit_empty_args() {
		let params = LaunchParams {
			headless: true,
			args: Vec::new(),
			slow_mo: None,
			timeout: 30000.0,
		};
		let json = serde_json::to_value(&params).unwrap();
		assert!(json.get("args").is_none());
		assert!(json.get("slowMo").is_none());
		assert_eq!(json["headless"], true);
	}
}
