//! Session snapshot persistence.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use passbak_protocol::StorageState;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Stores the browser storage state that lets a run skip the login form.
#[derive(Debug, Clone)]
pub struct SessionStore {
	path: PathBuf,
}

/// What `session show` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
	pub path: PathBuf,
	pub present: bool,
	pub cookies: usize,
	pub expired_cookies: usize,
	pub origins: usize,
}

impl SessionStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Loads the snapshot.
	///
	/// A missing file means no session. So does an unparseable one: it is
	/// logged and left for the next full login to overwrite.
	pub fn load(&self) -> Result<Option<StorageState>> {
		match StorageState::from_file(&self.path) {
			Ok(state) => {
				debug!(target = "passbak.session", path = %self.path.display(), cookies = state.cookies.len(), "loaded session snapshot");
				Ok(Some(state))
			}
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(err) if matches!(err.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof) => {
				warn!(target = "passbak.session", path = %self.path.display(), error = %err, "ignoring unreadable session snapshot");
				Ok(None)
			}
			Err(source) => Err(self.io_error(source)),
		}
	}

	/// Replaces the snapshot.
	///
	/// The document goes to a sibling temp file first and is renamed over the
	/// target, so readers see either the old or the new snapshot.
	pub fn save(&self, state: &StorageState) -> Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
		}

		let tmp = self.temp_path();
		let written = state.to_file(&tmp).and_then(|()| std::fs::rename(&tmp, &self.path));
		if let Err(source) = written {
			let _ = std::fs::remove_file(&tmp);
			return Err(self.io_error(source));
		}

		debug!(target = "passbak.session", path = %self.path.display(), cookies = state.cookies.len(), origins = state.origins.len(), "saved session snapshot");
		Ok(())
	}

	/// Removes the snapshot. Returns whether there was one.
	pub fn clear(&self) -> Result<bool> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(source) => Err(self.io_error(source)),
		}
	}

	pub fn summary(&self, now: DateTime<Utc>) -> Result<SessionSummary> {
		let state = self.load()?;
		let now_secs = now.timestamp() as f64;
		Ok(SessionSummary {
			path: self.path.clone(),
			present: state.is_some(),
			cookies: state.as_ref().map_or(0, |s| s.cookies.len()),
			expired_cookies: state.as_ref().map_or(0, |s| s.cookies.iter().filter(|c| c.is_expired_at(now_secs)).count()),
			origins: state.as_ref().map_or(0, |s| s.origins.len()),
		})
	}

	fn temp_path(&self) -> PathBuf {
		let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "session".to_string());
		self.path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
	}

	fn io_error(&self, source: io::Error) -> Error {
		Error::SessionStore {
			path: self.path.clone(),
			source,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use passbak_protocol::{Cookie, LocalStorageEntry, OriginState};

	fn state() -> StorageState {
		let mut expired = Cookie::new("old", "1", ".proton.me");
		expired.expires = Some(1.0);
		StorageState {
			cookies: vec![Cookie::new("Session-Id", "abc", ".proton.me"), expired],
			origins: vec![OriginState {
				origin: "https://pass.proton.me".to_string(),
				local_storage: vec![LocalStorageEntry {
					name: "ps-0".to_string(),
					value: "{}".to_string(),
				}],
				extra: Default::default(),
			}],
		}
	}

	#[test]
	fn missing_snapshot_is_no_session() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::new(dir.path().join("playwright/.auth.json"));
		assert_eq!(store.load().unwrap(), None);
		assert!(!store.clear().unwrap());
	}

	#[test]
	fn save_creates_parents_and_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::new(dir.path().join("playwright/.auth.json"));
		store.save(&state()).unwrap();
		assert_eq!(store.load().unwrap(), Some(state()));
	}

	#[test]
	fn repeated_saves_leave_one_clean_file() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::new(dir.path().join(".auth.json"));
		store.save(&state()).unwrap();
		store.save(&state()).unwrap();

		assert_eq!(store.load().unwrap(), Some(state()));
		let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
		assert_eq!(entries, [std::ffi::OsString::from(".auth.json")]);
	}

	#[test]
	fn corrupt_snapshot_is_treated_as_absent() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".auth.json");
		std::fs::write(&path, "{\"cookies\": [").unwrap();
		assert_eq!(SessionStore::new(&path).load().unwrap(), None);

		std::fs::write(&path, "").unwrap();
		assert_eq!(SessionStore::new(&path).load().unwrap(), None);
	}

	#[test]
	fn summary_counts_expired_cookies() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::new(dir.path().join(".auth.json"));
		store.save(&state()).unwrap();

		let summary = store.summary(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap();
		assert!(summary.present);
		assert_eq!(summary.cookies, 2);
		assert_eq!(summary.expired_cookies, 1);
		assert_eq!(summary.origins, 1);

		assert!(store.clear().unwrap());
		assert!(!store.summary(Utc::now()).unwrap().present);
	}
}
