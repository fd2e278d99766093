//! Errors raised while talking to the Playwright driver.

use std::time::Duration;

use passbak_protocol::ErrorPayload;

/// Driver-level failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// An operation did not reach its expected state within its bound.
	#[error("timed out: {0}")]
	Timeout(String),

	/// The page, context or browser went away mid-operation.
	#[error("target closed: {0}")]
	TargetClosed(String),

	/// The driver rejected a call or sent something unexpected.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The connection dropped before a response arrived.
	#[error("driver connection closed")]
	ChannelClosed,

	/// The driver process could not be located or started.
	#[error("failed to launch Playwright driver: {0}")]
	Launch(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	pub(crate) fn wait_elapsed(what: impl std::fmt::Display, bound: Duration) -> Self {
		Self::Timeout(format!("{what} not reached within {}ms", bound.as_millis()))
	}
}

impl From<ErrorPayload> for Error {
	fn from(payload: ErrorPayload) -> Self {
		match payload.name.as_deref() {
			Some("TimeoutError") => Self::Timeout(payload.message),
			Some("TargetClosedError") => Self::TargetClosed(payload.message),
			_ => Self::Protocol(payload.message),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	fn payload(name: Option<&str>) -> ErrorPayload {
		ErrorPayload {
			message: "boom".to_string(),
			name: name.map(str::to_string),
			stack: None,
		}
	}

	#[test]
	fn payload_names_map_to_variants() {
		assert!(Error::from(payload(Some("TimeoutError"))).is_timeout());
		assert!(matches!(Error::from(payload(Some("TargetClosedError"))), Error::TargetClosed(_)));
		assert!(matches!(Error::from(payload(None)), Error::Protocol(_)));
	}

	#[test]
	fn wait_elapsed_names_the_bound() {
		let err = Error::wait_elapsed("url https://a/**", Duration::from_millis(1500));
		assert!(err.is_timeout());
		assert_eq!(err.to_string(), "timed out: url https://a/** not reached within 1500ms");
	}
}
