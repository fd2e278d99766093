//! One-time codes for the authenticator step of a full login.

use std::fmt;
use std::io::{BufRead, Write};

use async_trait::async_trait;

use crate::error::{DriverError, Error, Result};

pub const CODE_LENGTH: usize = 6;

/// A validated one-time code. Only obtainable through [`OneTimeCode::parse`].
#[derive(Clone, PartialEq, Eq)]
pub struct OneTimeCode(String);

impl OneTimeCode {
	/// Accepts exactly six characters once surrounding whitespace (including
	/// the line terminator of a terminal read) is stripped.
	pub fn parse(raw: &str) -> Result<Self> {
		let code = raw.trim();
		let len = code.chars().count();
		if len != CODE_LENGTH {
			return Err(Error::Validation(format!("one-time code must be {CODE_LENGTH} characters, got {len}")));
		}
		Ok(Self(code.to_string()))
	}

	/// The code split into one string per character, in entry order.
	pub fn digits(&self) -> impl Iterator<Item = String> + '_ {
		self.0.chars().map(String::from)
	}
}

impl fmt::Debug for OneTimeCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("OneTimeCode(******)")
	}
}

/// Where the authenticator code comes from.
///
/// Implementations may block indefinitely; this is the one unbounded wait in
/// a run.
#[async_trait]
pub trait OneTimeCodeSource: Send + Sync {
	/// Returns the raw, unvalidated input.
	async fn request_code(&self) -> Result<String>;
}

/// Prompts on stdout and reads a line from stdin.
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
	prompt: String,
}

impl TerminalPrompt {
	pub fn new(prompt: impl Into<String>) -> Self {
		Self { prompt: prompt.into() }
	}
}

impl Default for TerminalPrompt {
	fn default() -> Self {
		Self::new("Enter TOTP: ")
	}
}

#[async_trait]
impl OneTimeCodeSource for TerminalPrompt {
	async fn request_code(&self) -> Result<String> {
		let prompt = self.prompt.clone();
		let read = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
			let mut stdout = std::io::stdout();
			stdout.write_all(prompt.as_bytes())?;
			stdout.flush()?;
			let mut line = String::new();
			std::io::stdin().lock().read_line(&mut line)?;
			Ok(line)
		})
		.await
		.map_err(|e| std::io::Error::other(e.to_string()));

		read.and_then(|inner| inner).map_err(|e| Error::Authentication {
			step: "reading one-time code",
			source: DriverError::Io(e),
		})
	}
}

/// Always answers with the same input. For tests and scripted runs.
#[derive(Debug, Clone)]
pub struct StaticCode(pub String);

#[async_trait]
impl OneTimeCodeSource for StaticCode {
	async fn request_code(&self) -> Result<String> {
		Ok(self.0.clone())
	}
}
