//! In-memory browser for exercising the flows without a driver.
//!
//! Every page interaction is recorded as a [`Call`]. Navigation lands on
//! [`FakeConfig::start_url`]; a URL wait succeeds when
//! [`FakeConfig::landing_url`] matches the pattern. Clicking
//! [`FakeConfig::download_trigger`] fires a download at once, delivered only
//! to listeners registered before the click.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use passbak_protocol::{Cookie, StorageState, WaitUntil};
use tokio::sync::oneshot;

use crate::driver::{BrowserContext, BrowserDriver, ContextOptions, Download, DriverResult, Page, PendingDownload};
use crate::error::DriverError;
use crate::locator::Locator;
use crate::url_pattern::UrlPattern;

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	NewContext { seeded: bool },
	NewPage,
	Goto { url: String, wait_until: WaitUntil },
	Fill { selector: String, value: String },
	Click { selector: String },
	Check { selector: String },
	Count { selector: String },
	WaitForUrl { pattern: String, wait_until: Option<WaitUntil> },
	WaitForTimeout(Duration),
	ExpectDownload,
	SaveAs(PathBuf),
	StorageState,
	CloseContext,
}

#[derive(Debug, Clone)]
pub struct FakeConfig {
	pub start_url: String,
	/// URL the page reaches after authenticating; `None` makes URL waits time out.
	pub landing_url: Option<String>,
	pub download_trigger: Locator,
	pub download_body: Vec<u8>,
	pub suggested_filename: String,
	pub storage_state: StorageState,
	/// Locators that match nothing.
	pub missing: Vec<Locator>,
	/// Locators whose interactions fail with a timeout.
	pub failing: Vec<Locator>,
}

impl Default for FakeConfig {
	fn default() -> Self {
		Self {
			start_url: "https://account.proton.me/login".to_string(),
			landing_url: Some("https://pass.proton.me/u/1".to_string()),
			download_trigger: Locator::role("button", "Authenticate"),
			download_body: b"PK\x05\x06".to_vec(),
			suggested_filename: "Proton Pass_export.zip".to_string(),
			storage_state: StorageState {
				cookies: vec![Cookie::new("Session-Id", "fresh", ".proton.me")],
				origins: Vec::new(),
			},
			missing: Vec::new(),
			failing: Vec::new(),
		}
	}
}

#[derive(Default)]
struct State {
	calls: Vec<Call>,
	url: String,
	seeded_states: Vec<Option<StorageState>>,
	listeners: Vec<oneshot::Sender<FakeDownload>>,
	closed_contexts: usize,
}

struct Shared {
	config: FakeConfig,
	state: Mutex<State>,
}

impl Shared {
	fn record(&self, call: Call) {
		self.state.lock().calls.push(call);
	}

	fn interact(&self, locator: &Locator, call: Call) -> DriverResult<()> {
		self.record(call);
		if self.config.failing.contains(locator) || self.config.missing.contains(locator) {
			return Err(DriverError::Timeout(format!("waiting for {locator}")));
		}
		Ok(())
	}
}

/// Cloning shares the recorded state.
#[derive(Clone)]
pub struct FakeBrowser {
	shared: Arc<Shared>,
}

impl FakeBrowser {
	pub fn new(config: FakeConfig) -> Self {
		Self {
			shared: Arc::new(Shared {
				config,
				state: Mutex::new(State::default()),
			}),
		}
	}

	pub fn calls(&self) -> Vec<Call> {
		self.shared.state.lock().calls.clone()
	}

	/// Values filled into elements matching `locator`, in order.
	pub fn fills_into(&self, locator: &Locator) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				Call::Fill { selector, value } if selector == locator.selector() => Some(value),
				_ => None,
			})
			.collect()
	}

	/// Storage state each context was created with.
	pub fn seeded_states(&self) -> Vec<Option<StorageState>> {
		self.shared.state.lock().seeded_states.clone()
	}

	pub fn closed_contexts(&self) -> usize {
		self.shared.state.lock().closed_contexts
	}
}

impl std::fmt::Debug for FakeBrowser {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FakeBrowser").field("calls", &self.shared.state.lock().calls.len()).finish()
	}
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
	async fn new_context(&self, options: ContextOptions) -> DriverResult<Box<dyn BrowserContext>> {
		let mut state = self.shared.state.lock();
		state.calls.push(Call::NewContext {
			seeded: options.storage_state.is_some(),
		});
		state.seeded_states.push(options.storage_state);
		Ok(Box::new(FakeContext {
			shared: Arc::clone(&self.shared),
		}))
	}
}

struct FakeContext {
	shared: Arc<Shared>,
}

#[async_trait]
impl BrowserContext for FakeContext {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
		let mut state = self.shared.state.lock();
		state.calls.push(Call::NewPage);
		state.url = "about:blank".to_string();
		Ok(Box::new(FakePage {
			shared: Arc::clone(&self.shared),
		}))
	}

	async fn storage_state(&self) -> DriverResult<StorageState> {
		self.shared.record(Call::StorageState);
		Ok(self.shared.config.storage_state.clone())
	}

	async fn close(&self) -> DriverResult<()> {
		let mut state = self.shared.state.lock();
		state.calls.push(Call::CloseContext);
		state.closed_contexts += 1;
		state.listeners.clear();
		Ok(())
	}
}

struct FakePage {
	shared: Arc<Shared>,
}

#[async_trait]
impl Page for FakePage {
	async fn goto(&self, url: &str, wait_until: WaitUntil, _timeout: Duration) -> DriverResult<()> {
		let mut state = self.shared.state.lock();
		state.calls.push(Call::Goto {
			url: url.to_string(),
			wait_until,
		});
		state.url = self.shared.config.start_url.clone();
		Ok(())
	}

	fn url(&self) -> String {
		self.shared.state.lock().url.clone()
	}

	async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
		self.shared.interact(
			locator,
			Call::Fill {
				selector: locator.selector().to_string(),
				value: value.to_string(),
			},
		)
	}

	async fn click(&self, locator: &Locator) -> DriverResult<()> {
		self.shared.interact(
			locator,
			Call::Click {
				selector: locator.selector().to_string(),
			},
		)?;
		if *locator == self.shared.config.download_trigger {
			let listeners = std::mem::take(&mut self.shared.state.lock().listeners);
			for listener in listeners {
				let _ = listener.send(FakeDownload {
					body: self.shared.config.download_body.clone(),
					suggested_filename: self.shared.config.suggested_filename.clone(),
				});
			}
		}
		Ok(())
	}

	async fn check(&self, locator: &Locator) -> DriverResult<()> {
		self.shared.interact(
			locator,
			Call::Check {
				selector: locator.selector().to_string(),
			},
		)
	}

	async fn count(&self, locator: &Locator) -> DriverResult<usize> {
		self.shared.record(Call::Count {
			selector: locator.selector().to_string(),
		});
		Ok(if self.shared.config.missing.contains(locator) { 0 } else { 1 })
	}

	async fn wait_for_url(&self, pattern: &UrlPattern, wait_until: Option<WaitUntil>, timeout: Duration) -> DriverResult<()> {
		let mut state = self.shared.state.lock();
		state.calls.push(Call::WaitForUrl {
			pattern: pattern.to_string(),
			wait_until,
		});
		match &self.shared.config.landing_url {
			Some(landing) if pattern.matches(landing) => {
				state.url = landing.clone();
				Ok(())
			}
			_ => Err(DriverError::Timeout(format!("url {pattern} not reached within {}ms", timeout.as_millis()))),
		}
	}

	async fn wait_for_timeout(&self, duration: Duration) {
		self.shared.record(Call::WaitForTimeout(duration));
	}

	fn expect_download(&self) -> Box<dyn PendingDownload> {
		let (tx, rx) = oneshot::channel();
		let mut state = self.shared.state.lock();
		state.calls.push(Call::ExpectDownload);
		state.listeners.push(tx);
		Box::new(FakePendingDownload {
			shared: Arc::clone(&self.shared),
			rx,
		})
	}
}

struct FakePendingDownload {
	shared: Arc<Shared>,
	rx: oneshot::Receiver<FakeDownload>,
}

#[async_trait]
impl PendingDownload for FakePendingDownload {
	async fn wait(self: Box<Self>, timeout: Duration) -> DriverResult<Box<dyn Download>> {
		let Self { shared, rx } = *self;
		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(download)) => Ok(Box::new(RecordedDownload { shared, download })),
			Ok(Err(_)) => Err(DriverError::TargetClosed("page closed before download".to_string())),
			Err(_) => Err(DriverError::Timeout(format!("download not started within {}ms", timeout.as_millis()))),
		}
	}
}

#[derive(Debug, Clone)]
struct FakeDownload {
	body: Vec<u8>,
	suggested_filename: String,
}

struct RecordedDownload {
	shared: Arc<Shared>,
	download: FakeDownload,
}

#[async_trait]
impl Download for RecordedDownload {
	fn suggested_filename(&self) -> &str {
		&self.download.suggested_filename
	}

	async fn save_as(&self, path: &Path) -> DriverResult<()> {
		self.shared.record(Call::SaveAs(path.to_path_buf()));
		tokio::fs::write(path, &self.download.body).await?;
		Ok(())
	}
}
