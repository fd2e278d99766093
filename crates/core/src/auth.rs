//! Authentication state machine.
//!
//! After navigating to the vault, the page URL decides which of two regimes
//! runs, once, with no fallback between them:
//!
//! * [`AuthRegime::Reauth`]: the session is partly expired and only the
//!   secret is asked for again.
//! * [`AuthRegime::FullAuth`]: identifier, secret and an authenticator code.
//!
//! Both end by persisting a fresh session snapshot.

use std::fmt;

use passbak_protocol::WaitUntil;
use tracing::{debug, info};

use crate::config::{Credentials, SettleDelays, Timeouts, UiLabels};
use crate::driver::{BrowserContext, Page};
use crate::error::{Error, Result};
use crate::locator::Locator;
use crate::otp::{OneTimeCode, OneTimeCodeSource};
use crate::session::SessionStore;
use crate::url_pattern::UrlPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRegime {
	Reauth,
	FullAuth,
}

impl AuthRegime {
	/// Picks the regime from the URL reached after navigation.
	pub fn select(url: &str, reauth_marker: &str) -> Self {
		if url.contains(reauth_marker) {
			Self::Reauth
		} else {
			Self::FullAuth
		}
	}
}

impl fmt::Display for AuthRegime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Reauth => "reauth",
			Self::FullAuth => "full-auth",
		})
	}
}

/// Drives one regime to completion against a page.
pub struct Authenticator<'a> {
	pub credentials: &'a Credentials,
	pub labels: &'a UiLabels,
	pub landing: &'a UrlPattern,
	pub settle: SettleDelays,
	pub timeouts: Timeouts,
	pub store: &'a SessionStore,
	pub codes: &'a dyn OneTimeCodeSource,
}

impl Authenticator<'_> {
	pub async fn authenticate(&self, regime: AuthRegime, context: &dyn BrowserContext, page: &dyn Page) -> Result<()> {
		info!(target = "passbak.auth", %regime, "authenticating");
		match regime {
			AuthRegime::Reauth => self.reauth(page).await?,
			AuthRegime::FullAuth => self.full_auth(page).await?,
		}
		self.persist_session(context).await?;
		info!(target = "passbak.auth", %regime, "authenticated");
		Ok(())
	}

	async fn reauth(&self, page: &dyn Page) -> Result<()> {
		let secret_input = Locator::test_id(&self.labels.text_input_test_id);
		page.fill(&secret_input, self.credentials.secret()).await.map_err(Error::auth("entering secret"))?;
		page.wait_for_timeout(self.settle.reauth_fill).await;
		page.click(&Locator::role("button", &self.labels.sign_in_button))
			.await
			.map_err(Error::auth("submitting secret"))?;

		page.wait_for_url(self.landing, Some(WaitUntil::NetworkIdle), self.timeouts.landing)
			.await
			.map_err(Error::auth("waiting for vault"))?;
		page.wait_for_timeout(self.settle.reauth_landing).await;
		Ok(())
	}

	async fn full_auth(&self, page: &dyn Page) -> Result<()> {
		let text_input = Locator::test_id(&self.labels.text_input_test_id);

		page.fill(&text_input, self.credentials.identifier())
			.await
			.map_err(Error::auth("entering identifier"))?;
		let keep_signed_in = Locator::role("checkbox", &self.labels.keep_signed_in);
		if page.count(&keep_signed_in).await.map_err(Error::auth("looking up keep-signed-in"))? > 0 {
			page.check(&keep_signed_in).await.map_err(Error::auth("checking keep-signed-in"))?;
		} else {
			debug!(target = "passbak.auth", "no keep-signed-in checkbox");
		}
		page.click(&Locator::role("button", &self.labels.continue_button))
			.await
			.map_err(Error::auth("submitting identifier"))?;
		page.wait_for_timeout(self.settle.login_step).await;

		page.fill(&text_input, self.credentials.secret()).await.map_err(Error::auth("entering secret"))?;
		page.wait_for_timeout(self.settle.login_step).await;
		page.click(&Locator::role("button", &self.labels.sign_in_button))
			.await
			.map_err(Error::auth("submitting secret"))?;

		page.click(&Locator::test_id(&self.labels.authenticator_tab_test_id))
			.await
			.map_err(Error::auth("selecting authenticator app"))?;

		let raw = self.codes.request_code().await?;
		let code = OneTimeCode::parse(&raw)?;

		for (index, digit) in code.digits().enumerate() {
			let field = Locator::role("textbox", &self.labels.code_digit(index + 1));
			page.fill(&field, &digit).await.map_err(Error::auth("entering one-time code"))?;
		}

		page.wait_for_url(self.landing, None, self.timeouts.landing)
			.await
			.map_err(Error::auth("waiting for vault"))?;
		page.wait_for_timeout(self.settle.totp_landing).await;
		Ok(())
	}

	async fn persist_session(&self, context: &dyn BrowserContext) -> Result<()> {
		let state = context.storage_state().await.map_err(Error::auth("capturing session"))?;
		self.store.save(&state)
	}
}
