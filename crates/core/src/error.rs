use std::path::PathBuf;

pub use passbak_runtime::Error as DriverError;

/// Failure of a job run or of startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Missing or unusable settings. Fatal at startup.
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("authentication failed during {step}: {source}")]
	Authentication {
		step: &'static str,
		#[source]
		source: DriverError,
	},

	/// Malformed user input, rejected before anything is submitted.
	#[error("validation error: {0}")]
	Validation(String),

	#[error("export failed during {step}: {source}")]
	Export {
		step: &'static str,
		#[source]
		source: DriverError,
	},

	/// Context or page acquisition, navigation, or teardown failed.
	#[error("browser error: {0}")]
	Browser(#[from] DriverError),

	#[error("session snapshot {path}: {source}")]
	SessionStore {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl Error {
	pub(crate) fn auth(step: &'static str) -> impl FnOnce(DriverError) -> Self {
		move |source| Self::Authentication { step, source }
	}

	pub(crate) fn export(step: &'static str) -> impl FnOnce(DriverError) -> Self {
		move |source| Self::Export { step, source }
	}

	pub fn is_configuration(&self) -> bool {
		matches!(self, Self::Configuration(_))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
