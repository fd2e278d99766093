//! In-memory transport for exercising the connection without a driver.
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let connection = Arc::new(Connection::new(parts));
//! spawn_run(&connection);
//!
//! let call = tokio::spawn(async move { connection.send_message("frame@1", "click", json!({})).await });
//! let sent = controller.next_sent().await;
//! controller.inject_response(sent["id"].as_u64().unwrap() as u32, json!({}));
//! ```

use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::transport::{Transport, TransportParts, TransportReceiver};

#[derive(Debug, Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Returns the parts for a [`Connection`](crate::connection::Connection)
	/// and a controller playing the driver's side.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();

		let parts = TransportParts {
			sender: Box::new(FakeSender { sent: sent_tx }),
			receiver: Box::new(FakeReceiver { inbound_rx, message_tx }),
			message_rx,
		};
		let controller = FakeTransportController {
			inbound_tx,
			sent: Mutex::new(sent_rx),
		};
		(parts, controller)
	}
}

/// Driver side of a fake transport. Dropping it closes the connection.
#[derive(Debug)]
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<Value>,
	sent: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl FakeTransportController {
	/// Delivers a raw message to the connection.
	pub fn inject(&self, message: Value) {
		let _ = self.inbound_tx.send(message);
	}

	pub fn inject_response(&self, id: u32, result: Value) {
		self.inject(json!({ "id": id, "result": result }));
	}

	pub fn inject_error(&self, id: u32, name: &str, message: &str) {
		self.inject(json!({ "id": id, "error": { "error": { "message": message, "name": name } } }));
	}

	pub fn inject_event(&self, guid: &str, method: &str, params: Value) {
		self.inject(json!({ "guid": guid, "method": method, "params": params }));
	}

	/// Waits for the next request the connection writes.
	///
	/// Returns `Value::Null` once the connection side is gone.
	pub async fn next_sent(&self) -> Value {
		self.sent.lock().await.recv().await.unwrap_or(Value::Null)
	}
}

struct FakeSender {
	sent: mpsc::UnboundedSender<Value>,
}

impl Transport for FakeSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let _ = self.sent.send(message);
		Box::pin(async { Ok(()) })
	}
}

struct FakeReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
