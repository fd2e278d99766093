//! One scheduled export: open a context, authenticate, export, close.

use std::sync::Arc;

use async_trait::async_trait;
use passbak_protocol::WaitUntil;
use tracing::{info, warn};

use crate::auth::{AuthRegime, Authenticator};
use crate::clock::Clock;
use crate::config::{Credentials, Settings};
use crate::driver::{BrowserContext, BrowserDriver, ContextOptions};
use crate::error::Result;
use crate::export::{ExportArtifact, Exporter};
use crate::otp::OneTimeCodeSource;
use crate::session::SessionStore;
use crate::url_pattern::UrlPattern;

/// Terminal state of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
	ReauthenticatedAndExported,
	AuthenticatedAndExported,
}

impl From<AuthRegime> for JobOutcome {
	fn from(regime: AuthRegime) -> Self {
		match regime {
			AuthRegime::Reauth => Self::ReauthenticatedAndExported,
			AuthRegime::FullAuth => Self::AuthenticatedAndExported,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
	pub outcome: JobOutcome,
	pub artifact: ExportArtifact,
}

/// Something the scheduler fires.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
	async fn fire(&self) -> Result<()>;
}

/// Sequences job runs against an injected browser.
///
/// Each [`execute`](Self::execute) owns a fresh context and page for its
/// whole duration and closes the context on every exit path.
pub struct JobRun {
	browser: Arc<dyn BrowserDriver>,
	settings: Settings,
	credentials: Credentials,
	store: SessionStore,
	landing: UrlPattern,
	codes: Arc<dyn OneTimeCodeSource>,
	clock: Arc<dyn Clock>,
}

impl JobRun {
	pub fn new(
		browser: Arc<dyn BrowserDriver>,
		settings: Settings,
		credentials: Credentials,
		codes: Arc<dyn OneTimeCodeSource>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let landing = UrlPattern::glob(&settings.landing_pattern)?;
		let store = SessionStore::new(settings.session_path.clone());
		Ok(Self {
			browser,
			settings,
			credentials,
			store,
			landing,
			codes,
			clock,
		})
	}

	pub async fn execute(&self) -> Result<JobReport> {
		info!(target = "passbak.job", "starting job run");
		let storage_state = self.store.load()?;
		let context = self
			.browser
			.new_context(ContextOptions {
				device: self.settings.device.clone(),
				storage_state,
				action_timeout: self.settings.timeouts.action,
			})
			.await?;

		let result = self.drive(context.as_ref()).await;

		if let Err(err) = context.close().await {
			warn!(target = "passbak.job", error = %err, "failed to close browser context");
		}
		result
	}

	async fn drive(&self, context: &dyn BrowserContext) -> Result<JobReport> {
		let page = context.new_page().await?;
		page.goto(&self.settings.vault_url, WaitUntil::NetworkIdle, self.settings.timeouts.navigation).await?;

		let url = page.url();
		let regime = AuthRegime::select(&url, &self.settings.reauth_marker);
		info!(target = "passbak.job", %url, %regime, "vault navigation settled");

		Authenticator {
			credentials: &self.credentials,
			labels: &self.settings.labels,
			landing: &self.landing,
			settle: self.settings.settle,
			timeouts: self.settings.timeouts,
			store: &self.store,
			codes: self.codes.as_ref(),
		}
		.authenticate(regime, context, page.as_ref())
		.await?;

		let artifact = Exporter {
			credentials: &self.credentials,
			labels: &self.settings.labels,
			settle: self.settings.settle,
			timeouts: self.settings.timeouts,
			backup_dir: &self.settings.backup_dir,
			clock: self.clock.as_ref(),
		}
		.export(page.as_ref())
		.await?;

		Ok(JobReport {
			outcome: regime.into(),
			artifact,
		})
	}
}

#[async_trait]
impl ScheduledJob for JobRun {
	async fn fire(&self) -> Result<()> {
		let report = self.execute().await?;
		info!(target = "passbak.job", outcome = ?report.outcome, artifact = %report.artifact.path.display(), "job run finished");
		Ok(())
	}
}
