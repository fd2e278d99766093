//! JSON-RPC connection to the Playwright driver.
//!
//! The connection correlates responses with pending requests, keeps a
//! registry of the remote objects the driver announces through `__create__`,
//! tracks URL and load state for every frame, and fans events out to
//! subscribers.
//!
//! # Message flow
//!
//! 1. [`Connection::send_message`] allocates an id, parks a oneshot sender and
//!    writes the request.
//! 2. [`Connection::run`] reads inbound messages in order. Lifecycle events
//!    update the registry before any later response is delivered, so a caller
//!    that receives `{"page": {"guid": ...}}` can immediately look the page up.
//! 3. Every processed event bumps a change counter; waiters re-check their
//!    condition on each bump until it holds or their deadline passes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use passbak_protocol::{CreateParams, Event, Message, Request, WaitUntil, guid_field};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

const EVENT_BUFFER: usize = 256;

/// A remote object announced by the driver.
#[derive(Debug, Clone)]
pub struct RemoteObject {
	pub type_name: String,
	pub parent: String,
	pub initializer: Value,
}

/// Client-side view of a frame, maintained from `navigated` and `loadstate`
/// events.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
	pub url: String,
	pub load_states: HashSet<WaitUntil>,
}

impl FrameState {
	fn from_initializer(initializer: &Value) -> Self {
		let url = initializer["url"].as_str().unwrap_or_default().to_string();
		let load_states = initializer["loadStates"]
			.as_array()
			.map(|states| states.iter().filter_map(|s| s.as_str()?.parse().ok()).collect())
			.unwrap_or_default();
		Self { url, load_states }
	}
}

/// Connection to a running driver.
///
/// Shared behind an `Arc`; [`run`](Self::run) must be spawned once before
/// any request can complete.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	objects: RwLock<HashMap<String, RemoteObject>>,
	frames: RwLock<HashMap<String, FrameState>>,
	changes: watch::Sender<u64>,
	events: broadcast::Sender<Event>,
	closed: AtomicBool,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let (changes, _) = watch::channel(0);
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		Self {
			last_id: AtomicU32::new(0),
			callbacks: Mutex::new(HashMap::new()),
			sender: tokio::sync::Mutex::new(parts.sender),
			receiver: Mutex::new(Some(parts.receiver)),
			message_rx: Mutex::new(Some(parts.message_rx)),
			objects: RwLock::new(HashMap::new()),
			frames: RwLock::new(HashMap::new()),
			changes,
			events,
			closed: AtomicBool::new(false),
		}
	}

	/// Sends `method` to the object `guid` and waits for its response.
	pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);

		let request = Request {
			id,
			guid: guid.to_string(),
			method: method.to_string(),
			params,
		};
		trace!(target = "passbak.runtime", id, guid, method, "sending request");

		let sent = match serde_json::to_value(&request) {
			Ok(value) => self.sender.lock().await.send(value).await,
			Err(err) => Err(err.into()),
		};
		if let Err(err) = sent {
			self.callbacks.lock().remove(&id);
			return Err(err);
		}

		rx.await.map_err(|_| Error::ChannelClosed)?
	}

	/// Performs the `initialize` handshake and returns the guid of the root
	/// `Playwright` object.
	pub async fn initialize(&self) -> Result<String> {
		let result = self.send_message("", "initialize", json!({ "sdkLanguage": "javascript" })).await?;
		guid_field(&result, "playwright").ok_or_else(|| Error::Protocol("initialize result missing 'playwright'".to_string()))
	}

	/// Reads and dispatches inbound messages until the transport closes.
	pub async fn run(&self) {
		let receiver = self.receiver.lock().take();
		let message_rx = self.message_rx.lock().take();
		let (Some(receiver), Some(mut message_rx)) = (receiver, message_rx) else {
			error!(target = "passbak.runtime", "connection loop started twice");
			return;
		};

		let reader = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				error!(target = "passbak.runtime", error = %err, "transport read failed");
			}
		});

		while let Some(value) = message_rx.recv().await {
			match serde_json::from_value::<Message>(value) {
				Ok(message) => {
					if let Err(err) = self.dispatch(message) {
						warn!(target = "passbak.runtime", error = %err, "dropping message");
					}
				}
				Err(err) => error!(target = "passbak.runtime", error = %err, "unparseable message from driver"),
			}
		}

		debug!(target = "passbak.runtime", "driver connection closed");
		self.closed.store(true, Ordering::SeqCst);
		self.callbacks.lock().clear();
		self.changes.send_modify(|n| *n += 1);
		let _ = reader.await;
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self
					.callbacks
					.lock()
					.remove(&response.id)
					.ok_or_else(|| Error::Protocol(format!("no pending request for response id={}", response.id)))?;

				let result = match response.error {
					Some(wrapper) => Err(Error::from(wrapper.error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => {
				let applied = self.apply_event(&event);
				self.changes.send_modify(|n| *n += 1);
				let _ = self.events.send(event);
				applied
			}
		}
	}

	fn apply_event(&self, event: &Event) -> Result<()> {
		match event.method.as_str() {
			"__create__" => {
				let created = CreateParams::deserialize(&event.params)?;
				trace!(target = "passbak.runtime", guid = %created.guid, kind = %created.type_name, "object created");
				if created.type_name == "Frame" {
					self.frames.write().insert(created.guid.clone(), FrameState::from_initializer(&created.initializer));
				}
				self.objects.write().insert(
					created.guid,
					RemoteObject {
						type_name: created.type_name,
						parent: event.guid.clone(),
						initializer: created.initializer,
					},
				);
			}
			"__adopt__" => {
				if let Some(child) = event.params["guid"].as_str() {
					if let Some(object) = self.objects.write().get_mut(child) {
						object.parent = event.guid.clone();
					}
				}
			}
			"__dispose__" => self.dispose(&event.guid),
			"navigated" => {
				if let (Some(frame), Some(url)) = (self.frames.write().get_mut(&event.guid), event.params["url"].as_str()) {
					frame.url = url.to_string();
				}
			}
			"loadstate" => {
				if let Some(frame) = self.frames.write().get_mut(&event.guid) {
					if let Some(state) = event.params["add"].as_str().and_then(|s| s.parse().ok()) {
						frame.load_states.insert(state);
					}
					if let Some(state) = event.params["remove"].as_str().and_then(|s| s.parse::<WaitUntil>().ok()) {
						frame.load_states.remove(&state);
					}
				}
			}
			_ => {}
		}
		Ok(())
	}

	/// Drops `guid` and everything parented under it.
	fn dispose(&self, guid: &str) {
		let mut objects = self.objects.write();
		let mut frames = self.frames.write();
		let mut pending = vec![guid.to_string()];
		while let Some(current) = pending.pop() {
			objects.remove(&current);
			frames.remove(&current);
			pending.extend(objects.iter().filter(|(_, object)| object.parent == current).map(|(child, _)| child.clone()));
		}
	}

	pub fn object(&self, guid: &str) -> Option<RemoteObject> {
		self.objects.read().get(guid).cloned()
	}

	/// Initializer of a registered object.
	pub fn initializer(&self, guid: &str) -> Result<Value> {
		self.object(guid)
			.map(|object| object.initializer)
			.ok_or_else(|| Error::Protocol(format!("unknown object {guid}")))
	}

	pub fn frame(&self, guid: &str) -> Option<FrameState> {
		self.frames.read().get(guid).cloned()
	}

	/// Subscribes to events processed from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	/// Waits until `predicate` holds for the frame `guid`, re-checking after
	/// every processed event.
	pub async fn wait_for_frame<F>(&self, guid: &str, what: &str, timeout: Duration, predicate: F) -> Result<FrameState>
	where
		F: Fn(&FrameState) -> bool,
	{
		let deadline = Instant::now() + timeout;
		let mut changes = self.changes.subscribe();
		loop {
			if let Some(state) = self.frame(guid) {
				if predicate(&state) {
					return Ok(state);
				}
			}
			if self.is_closed() {
				return Err(Error::ChannelClosed);
			}
			match tokio::time::timeout_at(deadline, changes.changed()).await {
				Ok(Ok(())) => {}
				Ok(Err(_)) => return Err(Error::ChannelClosed),
				Err(_) => return Err(Error::wait_elapsed(what, timeout)),
			}
		}
	}

	/// Waits on a subscription for the next `method` event from `guid`.
	///
	/// The subscription must have been taken before the action that triggers
	/// the event, otherwise the event can be missed.
	pub async fn wait_for_event(&self, events: &mut broadcast::Receiver<Event>, guid: &str, method: &str, timeout: Duration) -> Result<Event> {
		let deadline = Instant::now() + timeout;
		loop {
			match tokio::time::timeout_at(deadline, events.recv()).await {
				Ok(Ok(event)) if event.guid == guid && event.method == method => return Ok(event),
				Ok(Ok(_)) => {}
				Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
					warn!(target = "passbak.runtime", skipped, "event subscriber lagged");
				}
				Ok(Err(broadcast::error::RecvError::Closed)) => return Err(Error::ChannelClosed),
				Err(_) => return Err(Error::wait_elapsed(format!("'{method}' event"), timeout)),
			}
		}
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("objects", &self.objects.read().len())
			.field("pending", &self.callbacks.lock().len())
			.field("closed", &self.is_closed())
			.finish()
	}
}

/// Spawns the read loop of `connection` on the current runtime.
pub fn spawn_run(connection: &Arc<Connection>) -> tokio::task::JoinHandle<()> {
	let connection = Arc::clone(connection);
	tokio::spawn(async move { connection.run().await })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake_transport::FakeTransportBuilder;
	use passbak_protocol::{ErrorPayload, ErrorWrapper, Response};

	fn connection() -> (Arc<Connection>, crate::fake_transport::FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		(Arc::new(Connection::new(parts)), controller)
	}

	fn frame_created(guid: &str, url: &str) -> Value {
		json!({
			"guid": "page@1",
			"method": "__create__",
			"params": {"type": "Frame", "guid": guid, "initializer": {"url": url, "loadStates": ["load"]}}
		})
	}

	#[tokio::test]
	async fn responses_correlate_by_id_in_any_order() {
		let (connection, controller) = connection();
		spawn_run(&connection);

		let first = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_message("page@1", "goto", json!({"url": "https://a"})).await }
		});
		let a = controller.next_sent().await;
		let second = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_message("page@2", "goto", json!({"url": "https://b"})).await }
		});
		let b = controller.next_sent().await;

		controller.inject_response(b["id"].as_u64().unwrap() as u32, json!({"url": "https://b"}));
		controller.inject_response(a["id"].as_u64().unwrap() as u32, json!({"url": "https://a"}));

		assert_eq!(first.await.unwrap().unwrap()["url"], "https://a");
		assert_eq!(second.await.unwrap().unwrap()["url"], "https://b");
	}

	#[tokio::test]
	async fn driver_errors_surface_as_typed_errors() {
		let (connection, controller) = connection();
		spawn_run(&connection);

		let call = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_message("frame@1", "click", json!({"selector": "#missing"})).await }
		});
		let sent = controller.next_sent().await;
		controller.inject_error(sent["id"].as_u64().unwrap() as u32, "TimeoutError", "waiting for #missing");

		assert!(call.await.unwrap().unwrap_err().is_timeout());
	}

	#[test]
	fn unknown_response_id_is_rejected() {
		let (connection, _controller) = connection();
		let err = connection
			.dispatch(Message::Response(Response {
				id: 99,
				result: None,
				error: Some(ErrorWrapper {
					error: ErrorPayload {
						message: "late".to_string(),
						name: None,
						stack: None,
					},
				}),
			}))
			.unwrap_err();
		assert!(err.to_string().contains("id=99"));
	}

	#[tokio::test]
	async fn created_objects_are_registered_before_the_response() {
		let (connection, controller) = connection();
		spawn_run(&connection);

		let call = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_message("context@1", "newPage", json!({})).await }
		});
		let sent = controller.next_sent().await;
		controller.inject(json!({
			"guid": "context@1",
			"method": "__create__",
			"params": {"type": "Page", "guid": "page@7", "initializer": {"mainFrame": {"guid": "frame@7"}}}
		}));
		controller.inject_response(sent["id"].as_u64().unwrap() as u32, json!({"page": {"guid": "page@7"}}));

		let result = call.await.unwrap().unwrap();
		let page = guid_field(&result, "page").unwrap();
		let object = connection.object(&page).unwrap();
		assert_eq!(object.type_name, "Page");
		assert_eq!(object.parent, "context@1");
		assert_eq!(guid_field(&object.initializer, "mainFrame").as_deref(), Some("frame@7"));
	}

	#[tokio::test]
	async fn frame_state_follows_navigation_and_load_events() {
		let (connection, controller) = connection();
		spawn_run(&connection);

		controller.inject(frame_created("frame@1", "about:blank"));
		controller.inject(json!({"guid": "frame@1", "method": "navigated", "params": {"url": "https://pass.proton.me/u/1"}}));
		controller.inject(json!({"guid": "frame@1", "method": "loadstate", "params": {"remove": "load"}}));
		controller.inject(json!({"guid": "frame@1", "method": "loadstate", "params": {"add": "networkidle"}}));

		let state = connection
			.wait_for_frame("frame@1", "network idle", Duration::from_secs(1), |f| f.load_states.contains(&WaitUntil::NetworkIdle))
			.await
			.unwrap();
		assert_eq!(state.url, "https://pass.proton.me/u/1");
		assert!(!state.load_states.contains(&WaitUntil::Load));
	}

	#[tokio::test]
	async fn frame_wait_times_out_without_matching_event() {
		let (connection, controller) = connection();
		spawn_run(&connection);
		controller.inject(frame_created("frame@1", "https://account.proton.me/login"));

		let err = connection
			.wait_for_frame("frame@1", "landing url", Duration::from_millis(50), |f| f.url.contains("/u/"))
			.await
			.unwrap_err();
		assert!(err.is_timeout());
	}

	#[tokio::test]
	async fn dispose_removes_descendants() {
		let (connection, controller) = connection();
		spawn_run(&connection);
		controller.inject(json!({
			"guid": "browser@1",
			"method": "__create__",
			"params": {"type": "BrowserContext", "guid": "context@1", "initializer": {}}
		}));
		controller.inject(json!({
			"guid": "context@1",
			"method": "__create__",
			"params": {"type": "Page", "guid": "page@1", "initializer": {}}
		}));
		controller.inject(frame_created("frame@1", "about:blank"));
		controller.inject(json!({"guid": "context@1", "method": "__dispose__", "params": {}}));

		let mut changes = connection.changes.subscribe();
		while connection.object("context@1").is_some() {
			changes.changed().await.unwrap();
		}
		assert!(connection.object("page@1").is_none());
		assert!(connection.frame("frame@1").is_none());
	}

	#[tokio::test]
	async fn subscribed_events_are_delivered_and_filtered() {
		let (connection, controller) = connection();
		spawn_run(&connection);
		let mut events = connection.subscribe();

		controller.inject(json!({"guid": "page@2", "method": "download", "params": {}}));
		controller.inject(json!({"guid": "page@1", "method": "console", "params": {}}));
		controller.inject(json!({"guid": "page@1", "method": "download", "params": {"url": "blob:x"}}));

		let event = connection.wait_for_event(&mut events, "page@1", "download", Duration::from_secs(1)).await.unwrap();
		assert_eq!(event.params["url"], "blob:x");
	}

	#[tokio::test]
	async fn pending_requests_fail_when_driver_goes_away() {
		let (connection, controller) = connection();
		let loop_task = spawn_run(&connection);

		let call = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_message("page@1", "close", json!({})).await }
		});
		controller.next_sent().await;
		drop(controller);

		assert!(matches!(call.await.unwrap(), Err(Error::ChannelClosed)));
		loop_task.await.unwrap();
		assert!(connection.is_closed());
	}
}
