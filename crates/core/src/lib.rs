//! Scheduled, unattended export of a Proton Pass vault.
//!
//! A [`JobRun`] opens a browser context seeded with the last session
//! snapshot, navigates to the vault, authenticates through whichever
//! [`AuthRegime`] the landing URL calls for, persists a fresh snapshot and
//! exports the vault to a timestamped archive. A [`Scheduler`] fires job runs
//! on a cron schedule, one at a time.
//!
//! The browser is reached through the [`driver`] traits:
//! [`PlaywrightDriver`] drives Chromium through the Playwright driver,
//! [`fake::FakeBrowser`] records interactions in memory.

pub mod auth;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod fake;
pub mod job;
pub mod locator;
pub mod otp;
pub mod playwright;
pub mod schedule;
pub mod session;
pub mod url_pattern;

pub use auth::{AuthRegime, Authenticator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BrowserOptions, Credentials, SettleDelays, Settings, Timeouts, UiLabels, UiLocale};
pub use driver::{BrowserContext, BrowserDriver, ContextOptions, Download, Page, PendingDownload};
pub use error::{DriverError, Error, Result};
pub use export::{ExportArtifact, Exporter, artifact_path};
pub use job::{JobOutcome, JobReport, JobRun, ScheduledJob};
pub use locator::{Locator, TextMatch};
pub use otp::{OneTimeCode, OneTimeCodeSource, StaticCode, TerminalPrompt};
pub use passbak_protocol::{DeviceProfile, StorageState, WaitUntil};
pub use playwright::PlaywrightDriver;
pub use schedule::{CronSchedule, Scheduler, SchedulerSummary, ShutdownSender, ShutdownToken, shutdown_channel};
pub use session::{SessionStore, SessionSummary};
pub use url_pattern::UrlPattern;
