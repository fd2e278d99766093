//! [`BrowserDriver`] over a live Playwright driver connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use passbak_protocol::{DownloadEvent, Event, LaunchParams, NewContextParams, StorageState, WaitUntil, guid_field};
use passbak_runtime::{Connection, DEFAULT_TIMEOUT_MS, DriverCommand, DriverProcess, spawn_run};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserOptions;
use crate::driver::{BrowserContext, BrowserDriver, ContextOptions, Download, DriverResult, Page, PendingDownload};
use crate::error::DriverError;
use crate::locator::Locator;
use crate::url_pattern::UrlPattern;

fn millis(duration: Duration) -> f64 {
	duration.as_secs_f64() * 1000.0
}

fn required_guid(value: &Value, field: &str) -> DriverResult<String> {
	guid_field(value, field).ok_or_else(|| DriverError::Protocol(format!("response missing '{field}'")))
}

/// A Chromium instance launched through the Playwright driver.
///
/// Created once per process and shared by every job run.
pub struct PlaywrightDriver {
	connection: Arc<Connection>,
	browser: String,
	process: Mutex<Option<DriverProcess>>,
	reader: JoinHandle<()>,
}

impl PlaywrightDriver {
	/// Starts the driver, performs the handshake and launches Chromium.
	pub async fn launch(options: &BrowserOptions) -> DriverResult<Self> {
		let command = DriverCommand::locate()?;
		let (process, parts) = DriverProcess::spawn(&command)?;
		let connection = Arc::new(Connection::new(parts));
		let reader = spawn_run(&connection);

		let playwright = connection.initialize().await?;
		let chromium = required_guid(&connection.initializer(&playwright)?, "chromium")?;

		let params = LaunchParams {
			headless: options.headless,
			args: options.args.clone(),
			slow_mo: (options.slow_mo_ms > 0).then_some(options.slow_mo_ms as f64),
			timeout: DEFAULT_TIMEOUT_MS,
		};
		let launched = connection.send_message(&chromium, "launch", serde_json::to_value(&params)?).await?;
		let browser = required_guid(&launched, "browser")?;
		info!(target = "passbak.browser", headless = options.headless, pid = ?process.id(), "chromium launched");

		Ok(Self {
			connection,
			browser,
			process: Mutex::new(Some(process)),
			reader,
		})
	}

	/// Wraps an already launched browser on `connection`.
	pub fn with_connection(connection: Arc<Connection>, browser: impl Into<String>) -> Self {
		let reader = spawn_run(&connection);
		Self {
			connection,
			browser: browser.into(),
			process: Mutex::new(None),
			reader,
		}
	}

	/// Closes the browser and stops the driver process.
	pub async fn close(self) -> DriverResult<()> {
		if let Err(err) = self.connection.send_message(&self.browser, "close", json!({})).await {
			warn!(target = "passbak.browser", error = %err, "browser close failed");
		}
		let process = self.process.lock().take();
		if let Some(process) = process {
			process.shutdown().await?;
		}
		self.reader.abort();
		Ok(())
	}
}

impl std::fmt::Debug for PlaywrightDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PlaywrightDriver")
			.field("browser", &self.browser)
			.field("connection", &self.connection)
			.finish()
	}
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
	async fn new_context(&self, options: ContextOptions) -> DriverResult<Box<dyn BrowserContext>> {
		let params = NewContextParams::new(&options.device, options.storage_state);
		let result = self.connection.send_message(&self.browser, "newContext", serde_json::to_value(&params)?).await?;
		let guid = required_guid(&result, "context")?;
		debug!(target = "passbak.browser", context = %guid, "context created");
		Ok(Box::new(PlaywrightContext {
			connection: Arc::clone(&self.connection),
			guid,
			action_timeout: options.action_timeout,
		}))
	}
}

struct PlaywrightContext {
	connection: Arc<Connection>,
	guid: String,
	action_timeout: Duration,
}

#[async_trait]
impl BrowserContext for PlaywrightContext {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
		let result = self.connection.send_message(&self.guid, "newPage", json!({})).await?;
		let guid = required_guid(&result, "page")?;
		let main_frame = required_guid(&self.connection.initializer(&guid)?, "mainFrame")?;
		Ok(Box::new(PlaywrightPage {
			connection: Arc::clone(&self.connection),
			guid,
			main_frame,
			action_timeout: self.action_timeout,
		}))
	}

	async fn storage_state(&self) -> DriverResult<StorageState> {
		let result = self.connection.send_message(&self.guid, "storageState", json!({})).await?;
		Ok(StorageState::deserialize(&result)?)
	}

	async fn close(&self) -> DriverResult<()> {
		self.connection.send_message(&self.guid, "close", json!({})).await?;
		Ok(())
	}
}

struct PlaywrightPage {
	connection: Arc<Connection>,
	guid: String,
	main_frame: String,
	action_timeout: Duration,
}

impl PlaywrightPage {
	async fn frame_call(&self, method: &str, params: Value) -> DriverResult<Value> {
		self.connection.send_message(&self.main_frame, method, params).await
	}

	async fn action(&self, method: &str, locator: &Locator, extra: Option<(&str, &str)>) -> DriverResult<()> {
		let mut params = json!({
			"selector": locator.selector(),
			"strict": true,
			"timeout": millis(self.action_timeout),
		});
		if let Some((key, value)) = extra {
			params[key] = Value::from(value);
		}
		debug!(target = "passbak.browser", method, selector = %locator, "frame action");
		self.frame_call(method, params).await?;
		Ok(())
	}
}

#[async_trait]
impl Page for PlaywrightPage {
	async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> DriverResult<()> {
		self.frame_call("goto", json!({ "url": url, "waitUntil": wait_until, "timeout": millis(timeout) }))
			.await?;
		Ok(())
	}

	fn url(&self) -> String {
		self.connection.frame(&self.main_frame).map(|frame| frame.url).unwrap_or_default()
	}

	async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
		self.action("fill", locator, Some(("value", value))).await
	}

	async fn click(&self, locator: &Locator) -> DriverResult<()> {
		self.action("click", locator, None).await
	}

	async fn check(&self, locator: &Locator) -> DriverResult<()> {
		self.action("check", locator, None).await
	}

	async fn count(&self, locator: &Locator) -> DriverResult<usize> {
		let result = self.frame_call("queryCount", json!({ "selector": locator.selector() })).await?;
		result["value"]
			.as_u64()
			.map(|n| n as usize)
			.ok_or_else(|| DriverError::Protocol("queryCount result missing 'value'".to_string()))
	}

	async fn wait_for_url(&self, pattern: &UrlPattern, wait_until: Option<WaitUntil>, timeout: Duration) -> DriverResult<()> {
		let what = match wait_until {
			Some(state) => format!("url {pattern} with load state {state}"),
			None => format!("url {pattern}"),
		};
		self.connection
			.wait_for_frame(&self.main_frame, &what, timeout, |frame| {
				pattern.matches(&frame.url) && wait_until.is_none_or(|state| frame.load_states.contains(&state))
			})
			.await?;
		Ok(())
	}

	async fn wait_for_timeout(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}

	fn expect_download(&self) -> Box<dyn PendingDownload> {
		Box::new(PlaywrightPendingDownload {
			connection: Arc::clone(&self.connection),
			page: self.guid.clone(),
			events: self.connection.subscribe(),
		})
	}
}

struct PlaywrightPendingDownload {
	connection: Arc<Connection>,
	page: String,
	events: broadcast::Receiver<Event>,
}

#[async_trait]
impl PendingDownload for PlaywrightPendingDownload {
	async fn wait(self: Box<Self>, timeout: Duration) -> DriverResult<Box<dyn Download>> {
		let Self { connection, page, mut events } = *self;
		let event = connection.wait_for_event(&mut events, &page, "download", timeout).await?;
		let download = DownloadEvent::deserialize(&event.params)?;
		debug!(target = "passbak.browser", url = %download.url, suggested = %download.suggested_filename, "download started");
		Ok(Box::new(PlaywrightDownload {
			connection,
			artifact: download.artifact.guid,
			suggested_filename: download.suggested_filename,
		}))
	}
}

struct PlaywrightDownload {
	connection: Arc<Connection>,
	artifact: String,
	suggested_filename: String,
}

#[async_trait]
impl Download for PlaywrightDownload {
	fn suggested_filename(&self) -> &str {
		&self.suggested_filename
	}

	async fn save_as(&self, path: &Path) -> DriverResult<()> {
		// The driver resolves paths against its own working directory.
		let path = std::path::absolute(path)?;
		self.connection
			.send_message(&self.artifact, "saveAs", json!({ "path": path.to_string_lossy() }))
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use passbak_runtime::{FakeTransportBuilder, FakeTransportController};

	fn id(sent: &Value) -> u32 {
		sent["id"].as_u64().unwrap() as u32
	}

	fn created(parent: &str, kind: &str, guid: &str, initializer: Value) -> Value {
		json!({"guid": parent, "method": "__create__", "params": {"type": kind, "guid": guid, "initializer": initializer}})
	}

	fn driver() -> (PlaywrightDriver, FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));
		(PlaywrightDriver::with_connection(connection, "browser@1"), controller)
	}

	async fn open_page(driver: &PlaywrightDriver, controller: &FakeTransportController) -> (Box<dyn BrowserContext>, Box<dyn Page>) {
		let (context, ()) = tokio::join!(driver.new_context(ContextOptions::default()), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["guid"], "browser@1");
			assert_eq!(sent["method"], "newContext");
			assert_eq!(sent["params"]["acceptDownloads"], "accept");
			controller.inject(created("browser@1", "BrowserContext", "context@1", json!({})));
			controller.inject_response(id(&sent), json!({"context": {"guid": "context@1"}}));
		});
		let context = context.unwrap();

		let (page, ()) = tokio::join!(context.new_page(), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["method"], "newPage");
			controller.inject(created("context@1", "Page", "page@1", json!({"mainFrame": {"guid": "frame@1"}})));
			controller.inject(created("page@1", "Frame", "frame@1", json!({"url": "about:blank", "loadStates": []})));
			controller.inject_response(id(&sent), json!({"page": {"guid": "page@1"}}));
		});
		(context, page.unwrap())
	}

	#[tokio::test]
	async fn actions_target_the_main_frame_with_strict_selectors() {
		let (driver, controller) = driver();
		let (_context, page) = open_page(&driver, &controller).await;

		let locator = Locator::test_id("input-input-element");
		let (filled, ()) = tokio::join!(page.fill(&locator, "user@example.com"), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["guid"], "frame@1");
			assert_eq!(sent["method"], "fill");
			assert_eq!(sent["params"]["selector"], locator.selector());
			assert_eq!(sent["params"]["strict"], true);
			assert_eq!(sent["params"]["value"], "user@example.com");
			assert_eq!(sent["params"]["timeout"], 30000.0);
			controller.inject_response(id(&sent), json!({}));
		});
		filled.unwrap();

		let checkbox = Locator::role("checkbox", "Keep me signed in");
		let (count, ()) = tokio::join!(page.count(&checkbox), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["method"], "queryCount");
			controller.inject_response(id(&sent), json!({"value": 0}));
		});
		assert_eq!(count.unwrap(), 0);
	}

	#[tokio::test]
	async fn url_wait_follows_frame_events() {
		let (driver, controller) = driver();
		let (_context, page) = open_page(&driver, &controller).await;
		let landing = UrlPattern::glob("https://pass.proton.me/u/**").unwrap();

		let (reached, ()) = tokio::join!(page.wait_for_url(&landing, Some(WaitUntil::NetworkIdle), Duration::from_secs(5)), async {
			controller.inject_event("frame@1", "navigated", json!({"url": "https://pass.proton.me/u/1"}));
			controller.inject_event("frame@1", "loadstate", json!({"add": "networkidle"}));
		});
		reached.unwrap();
		assert_eq!(page.url(), "https://pass.proton.me/u/1");

		let err = page.wait_for_url(&UrlPattern::glob("https://example.com/**").unwrap(), None, Duration::from_millis(20)).await.unwrap_err();
		assert!(err.is_timeout());
	}

	#[tokio::test]
	async fn download_registered_before_click_is_saved_to_an_absolute_path() {
		let (driver, controller) = driver();
		let (_context, page) = open_page(&driver, &controller).await;

		let pending = page.expect_download();
		let button = Locator::role("button", "Authenticate");
		let (clicked, ()) = tokio::join!(page.click(&button), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["method"], "click");
			controller.inject(created("browser@1", "Artifact", "artifact@1", json!({})));
			controller.inject_event(
				"page@1",
				"download",
				json!({"url": "blob:https://pass.proton.me/x", "suggestedFilename": "export.zip", "artifact": {"guid": "artifact@1"}}),
			);
			controller.inject_response(id(&sent), json!({}));
		});
		clicked.unwrap();

		let download = pending.wait(Duration::from_secs(5)).await.unwrap();
		assert_eq!(download.suggested_filename(), "export.zip");

		let (saved, ()) = tokio::join!(download.save_as(Path::new("backups/out.zip")), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["guid"], "artifact@1");
			assert_eq!(sent["method"], "saveAs");
			assert!(Path::new(sent["params"]["path"].as_str().unwrap()).is_absolute());
			controller.inject_response(id(&sent), json!({}));
		});
		saved.unwrap();
	}

	#[tokio::test]
	async fn storage_state_and_close_use_the_context() {
		let (driver, controller) = driver();
		let (context, _page) = open_page(&driver, &controller).await;

		let (state, ()) = tokio::join!(context.storage_state(), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["guid"], "context@1");
			assert_eq!(sent["method"], "storageState");
			controller.inject_response(id(&sent), json!({"cookies": [{"name": "a", "value": "b", "domain": ".proton.me", "path": "/"}], "origins": []}));
		});
		assert_eq!(state.unwrap().cookies[0].name, "a");

		let (closed, ()) = tokio::join!(context.close(), async {
			let sent = controller.next_sent().await;
			assert_eq!(sent["method"], "close");
			controller.inject_response(id(&sent), json!({}));
		});
		closed.unwrap();
	}
}
