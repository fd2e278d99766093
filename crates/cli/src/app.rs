//! Wiring of settings, browser, job and scheduler.

use std::sync::Arc;

use anyhow::{Context, Result};
use passbak::{CronSchedule, JobRun, PlaywrightDriver, Scheduler, SessionStore, Settings, SystemClock, TerminalPrompt, shutdown_channel};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, SessionAction};

pub async fn run(cli: Cli) -> Result<()> {
	let settings = cli.settings()?;
	match cli.command {
		Some(Commands::Session { action }) => session(action, &settings),
		None => schedule(&cli, settings).await,
	}
}

fn session(action: SessionAction, settings: &Settings) -> Result<()> {
	let store = SessionStore::new(settings.session_path.clone());
	match action {
		SessionAction::Show => {
			let summary = store.summary(chrono::Utc::now())?;
			if !summary.present {
				println!("No session snapshot at {}", summary.path.display());
				return Ok(());
			}
			println!("Session snapshot: {}", summary.path.display());
			println!("  Cookies: {} ({} expired)", summary.cookies, summary.expired_cookies);
			println!("  Origins with localStorage: {}", summary.origins);
		}
		SessionAction::Clear => {
			if store.clear()? {
				println!("Removed session snapshot {}", store.path().display());
			} else {
				println!("No session snapshot at {}", store.path().display());
			}
		}
	}
	Ok(())
}

async fn schedule(cli: &Cli, settings: Settings) -> Result<()> {
	// Everything that can be rejected up front is, before a browser starts.
	let credentials = cli.credentials()?;
	let schedule = CronSchedule::parse(&settings.cron, &settings.time_zone)?;

	let browser = Arc::new(PlaywrightDriver::launch(&settings.browser).await.context("failed to launch browser")?);
	let clock = Arc::new(SystemClock);
	let job = JobRun::new(browser.clone(), settings, credentials, Arc::new(TerminalPrompt::default()), clock.clone())?;

	let result = if cli.run_now {
		Scheduler::fire_now(&job).await.map_err(anyhow::Error::from)
	} else {
		let (shutdown_tx, shutdown_rx) = shutdown_channel();
		let signals = tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				info!(target = "passbak", "shutdown requested, finishing current run");
				shutdown_tx.shutdown();
			}
			if tokio::signal::ctrl_c().await.is_ok() {
				std::process::exit(130);
			}
		});
		info!(target = "passbak", "job scheduled, press Ctrl+C to stop");
		Scheduler::new(schedule, clock).run(&job, shutdown_rx).await;
		signals.abort();
		Ok(())
	};

	drop(job);
	match Arc::try_unwrap(browser) {
		Ok(browser) => {
			if let Err(err) = browser.close().await {
				warn!(target = "passbak", error = %err, "browser shutdown failed");
			}
		}
		Err(_) => warn!(target = "passbak", "browser still referenced at exit"),
	}
	result
}
