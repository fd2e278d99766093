//! JSON-RPC envelopes exchanged with the Playwright driver.
//!
//! Requests carry an `id`; the driver answers with a response bearing the same
//! `id`. Messages without an `id` are events emitted by remote objects,
//! including the lifecycle events `__create__`, `__dispose__` and `__adopt__`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the driver.
///
/// ```json
/// { "id": 7, "guid": "frame@1c2d", "method": "fill", "params": { "selector": "#q", "value": "x" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub id: u32,
	/// Target object, `""` for the root connection object.
	pub guid: String,
	pub method: String,
	pub params: Value,
}

/// Response to a [`Request`]. Exactly one of `result` or `error` is set, and a
/// void call may omit both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Error details reported by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	/// `TimeoutError`, `TargetClosedError`, or absent for generic failures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Event emitted by a remote object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub guid: String,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Inbound message, told apart by the presence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
}

/// Payload of a `__create__` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
	#[serde(rename = "type")]
	pub type_name: String,
	pub guid: String,
	#[serde(default)]
	pub initializer: Value,
}

/// Payload of a `download` page event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
	pub url: String,
	pub suggested_filename: String,
	pub artifact: GuidRef,
}

/// Reference to a remote object as it appears inside results and initializers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRef {
	pub guid: String,
}

/// Pulls `value[field].guid` out of a result or initializer.
pub fn guid_field(value: &Value, field: &str) -> Option<String> {
	value.get(field)?.get("guid")?.as_str().map(str::to_string)
}
