//! Playwright driver lifecycle and JSON-RPC plumbing for passbak.
//!
//! * [`driver`] locates and spawns the Node.js driver.
//! * [`transport`] frames messages over the driver's stdio.
//! * [`connection`] correlates requests, tracks remote objects and frames,
//!   and fans out events.
//! * [`fake_transport`] stands in for the driver in tests.

pub mod connection;
pub mod driver;
pub mod error;
pub mod fake_transport;
pub mod transport;

/// Default bound for driver operations, matching Playwright's own default.
pub const DEFAULT_TIMEOUT_MS: f64 = 30000.0;

pub use connection::{Connection, FrameState, RemoteObject, spawn_run};
pub use driver::{DriverCommand, DriverProcess};
pub use error::{Error, Result};
pub use fake_transport::{FakeTransportBuilder, FakeTransportController};
pub use transport::{Transport, TransportParts, TransportReceiver, pipe_transport};
