//! Browser capabilities the flows are written against.
//!
//! [`PlaywrightDriver`](crate::playwright::PlaywrightDriver) implements these
//! over a live driver connection; [`FakeBrowser`](crate::fake::FakeBrowser)
//! implements them in memory for tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use passbak_protocol::{DeviceProfile, StorageState, WaitUntil};

use crate::error::DriverError;
use crate::locator::Locator;
use crate::url_pattern::UrlPattern;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Parameters of a fresh browser context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
	pub device: DeviceProfile,
	/// Session snapshot to seed cookies and local storage from.
	pub storage_state: Option<StorageState>,
	/// Bound applied to every fill, click and check on pages of the context.
	pub action_timeout: Duration,
}

impl Default for ContextOptions {
	fn default() -> Self {
		Self {
			device: DeviceProfile::desktop_chrome(),
			storage_state: None,
			action_timeout: Duration::from_secs(30),
		}
	}
}

/// A launched browser that hands out isolated contexts.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
	async fn new_context(&self, options: ContextOptions) -> DriverResult<Box<dyn BrowserContext>>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>>;

	/// Current cookies and local storage of the context.
	async fn storage_state(&self) -> DriverResult<StorageState>;

	async fn close(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
	async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()>;

	/// URL of the main frame as of the last processed navigation.
	fn url(&self) -> String;

	async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()>;

	async fn click(&self, locator: &Locator) -> DriverResult<()>;

	async fn check(&self, locator: &Locator) -> DriverResult<()>;

	/// Number of elements currently matching, without waiting.
	async fn count(&self, locator: &Locator) -> DriverResult<usize>;

	/// Waits until the main frame URL matches and, when given, the load state
	/// is reached.
	async fn wait_for_url(&self, pattern: &UrlPattern, wait_until: Option<WaitUntil>, timeout: Duration) -> DriverResult<()>;

	async fn wait_for_timeout(&self, duration: Duration);

	/// Starts listening for the next download.
	///
	/// Call before the action that triggers the download; a download fired
	/// before this call is not observed.
	fn expect_download(&self) -> Box<dyn PendingDownload>;
}

/// A registered download listener.
#[async_trait]
pub trait PendingDownload: Send {
	async fn wait(self: Box<Self>, timeout: Duration) -> DriverResult<Box<dyn Download>>;
}

#[async_trait]
pub trait Download: Send + Sync {
	fn suggested_filename(&self) -> &str;

	/// Copies the downloaded file to `path`.
	async fn save_as(&self, path: &Path) -> DriverResult<()>;
}
