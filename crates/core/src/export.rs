//! Vault export flow.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::clock::Clock;
use crate::config::{Credentials, SettleDelays, Timeouts, UiLabels};
use crate::driver::Page;
use crate::error::{DriverError, Error, Result};
use crate::locator::{Locator, TextMatch};

const ARTIFACT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A saved export archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
	pub path: PathBuf,
	pub suggested_filename: String,
	pub saved_at: DateTime<Utc>,
}

/// Where an archive saved at `at` goes: `{dir}/{UTC, second precision}.zip`.
///
/// Two saves within the same second map to the same path and the later one
/// overwrites the earlier.
pub fn artifact_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
	dir.join(format!("{}.zip", at.format(ARTIFACT_TIME_FORMAT)))
}

pub struct Exporter<'a> {
	pub credentials: &'a Credentials,
	pub labels: &'a UiLabels,
	pub settle: SettleDelays,
	pub timeouts: Timeouts,
	pub backup_dir: &'a Path,
	pub clock: &'a dyn Clock,
}

impl Exporter<'_> {
	/// Walks the export dialog from the authenticated vault view and saves
	/// the resulting archive.
	pub async fn export(&self, page: &dyn Page) -> Result<ExportArtifact> {
		info!(target = "passbak.export", "exporting vault");
		let labels = self.labels;

		page.click(&Locator::css("div").with_exact_text(&labels.theme_option).first())
			.await
			.map_err(Error::export("choosing theme"))?;
		page.click(&Locator::role("button", &labels.theme_confirm))
			.await
			.map_err(Error::export("confirming theme"))?;

		page.click(&Locator::role("button", &labels.more_options).nth(labels.more_options_index))
			.await
			.map_err(Error::export("opening settings menu"))?;
		page.click(&Locator::role("button", &labels.export_menu))
			.await
			.map_err(Error::export("opening export"))?;
		page.click(&Locator::text(&labels.export_format, TextMatch::Exact))
			.await
			.map_err(Error::export("choosing format"))?;
		page.wait_for_timeout(self.settle.export_format).await;
		page.click(&Locator::role("button", &labels.export_confirm))
			.await
			.map_err(Error::export("starting export"))?;

		// The export is re-authorised with the secret even inside a fresh session.
		page.fill(&Locator::test_id(&labels.text_input_test_id), self.credentials.secret())
			.await
			.map_err(Error::export("confirming secret"))?;

		let pending = page.expect_download();
		page.click(&Locator::role("button", &labels.authenticate))
			.await
			.map_err(Error::export("authorising export"))?;
		let download = pending.wait(self.timeouts.download).await.map_err(Error::export("waiting for download"))?;

		std::fs::create_dir_all(self.backup_dir).map_err(|e| Error::Export {
			step: "creating backup directory",
			source: DriverError::Io(e),
		})?;
		let saved_at = self.clock.now();
		let path = artifact_path(self.backup_dir, saved_at);
		download.save_as(&path).await.map_err(Error::export("saving archive"))?;

		info!(target = "passbak.export", path = %path.display(), suggested = download.suggested_filename(), "vault exported");
		Ok(ExportArtifact {
			path,
			suggested_filename: download.suggested_filename().to_string(),
			saved_at,
		})
	}
}
