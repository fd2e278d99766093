//! Message transport to the Playwright driver.
//!
//! The driver speaks JSON over its stdio pipes, each message framed by a
//! 4-byte little-endian length prefix. A transport is split into a sending
//! half, owned by the connection, and a receiving half that runs as its own
//! task and forwards decoded messages into a channel.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::Result;

/// Upper bound on a single framed message; anything larger is a corrupt stream.
const MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024;

/// Sending half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of a transport, consumed by its read loop.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// The pieces a [`Connection`](crate::connection::Connection) is built from.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Builds a length-prefixed pipe transport over a writer (driver stdin) and a
/// reader (driver stdout).
pub fn pipe_transport<W, R>(writer: W, reader: R) -> TransportParts
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	let (message_tx, message_rx) = mpsc::unbounded_channel();
	TransportParts {
		sender: Box::new(PipeSender { writer }),
		receiver: Box::new(PipeReceiver { reader, message_tx }),
		message_rx,
	}
}

struct PipeSender<W> {
	writer: W,
}

impl<W> Transport for PipeSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let bytes = serde_json::to_vec(&message)?;
			let len = u32::try_from(bytes.len()).map_err(|_| crate::Error::Protocol(format!("outgoing message too large: {} bytes", bytes.len())))?;
			self.writer.write_all(&len.to_le_bytes()).await?;
			self.writer.write_all(&bytes).await?;
			self.writer.flush().await?;
			Ok(())
		})
	}
}

struct PipeReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for PipeReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			loop {
				let mut header = [0u8; 4];
				match self.reader.read_exact(&mut header).await {
					Ok(_) => {}
					Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
					Err(err) => return Err(err.into()),
				}

				let len = u32::from_le_bytes(header) as usize;
				if len > MAX_MESSAGE_BYTES {
					return Err(crate::Error::Protocol(format!("incoming message of {len} bytes exceeds limit")));
				}

				let mut body = vec![0u8; len];
				self.reader.read_exact(&mut body).await?;

				let message: Value = serde_json::from_slice(&body)?;
				if self.message_tx.send(message).is_err() {
					return Ok(());
				}
			}
		})
	}
}
