//! Cron-driven scheduling of job runs.
//!
//! Runs never overlap: the loop sleeps until the next fire time, runs the job
//! to completion, then looks for the next fire time strictly after the
//! current instant. Ticks that passed while a run was in flight are skipped.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::job::ScheduledJob;

/// A cron expression bound to a time zone.
///
/// Five-field expressions (minute precision) get their seconds pinned to 0;
/// six and seven field expressions (with seconds, optionally years) are taken
/// as they are.
#[derive(Debug, Clone)]
pub struct CronSchedule {
	expression: String,
	schedule: cron::Schedule,
	tz: Tz,
}

impl CronSchedule {
	pub fn parse(expression: &str, time_zone: &str) -> Result<Self> {
		let tz = Tz::from_str(time_zone).map_err(|e| Error::Configuration(format!("unknown time zone '{time_zone}': {e}")))?;

		let fields = expression.split_whitespace().count();
		let normalized = match fields {
			5 => format!("0 {}", expression.trim()),
			6 | 7 => expression.trim().to_string(),
			n => {
				return Err(Error::Configuration(format!("cron expression '{expression}' has {n} fields, expected 5, 6 or 7")));
			}
		};
		let schedule = cron::Schedule::from_str(&normalized).map_err(|e| Error::Configuration(format!("invalid cron expression '{expression}': {e}")))?;

		Ok(Self {
			expression: expression.trim().to_string(),
			schedule,
			tz,
		})
	}

	pub fn expression(&self) -> &str {
		&self.expression
	}

	pub fn time_zone(&self) -> Tz {
		self.tz
	}

	/// First fire time strictly after `after`.
	pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		self.schedule.after(&after.with_timezone(&self.tz)).next().map(|t| t.with_timezone(&Utc))
	}

	/// Fire times in `(from, to]`.
	pub fn ticks_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
		self.schedule
			.after(&from.with_timezone(&self.tz))
			.take_while(|t| t.with_timezone(&Utc) <= to)
			.count()
	}
}

/// Shutdown signal for the scheduler loop.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
	rx: watch::Receiver<bool>,
}

impl ShutdownToken {
	pub fn is_shutdown(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves once shutdown is requested or the sender is gone.
	pub async fn wait(&mut self) {
		let _ = self.rx.wait_for(|stop| *stop).await;
	}
}

#[derive(Debug)]
pub struct ShutdownSender {
	tx: watch::Sender<bool>,
}

impl ShutdownSender {
	pub fn shutdown(&self) {
		let _ = self.tx.send(true);
	}
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
	let (tx, rx) = watch::channel(false);
	(ShutdownSender { tx }, ShutdownToken { rx })
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
	pub runs: usize,
	pub failures: usize,
	pub skipped_ticks: usize,
}

pub struct Scheduler {
	schedule: CronSchedule,
	clock: Arc<dyn Clock>,
}

impl Scheduler {
	pub fn new(schedule: CronSchedule, clock: Arc<dyn Clock>) -> Self {
		Self { schedule, clock }
	}

	/// Fires `job` on every tick until `shutdown` is signalled.
	///
	/// Failed runs are logged and do not end the loop. A shutdown requested
	/// during a run takes effect once that run has finished.
	pub async fn run(&self, job: &dyn ScheduledJob, mut shutdown: ShutdownToken) -> SchedulerSummary {
		let mut summary = SchedulerSummary::default();
		let mut last_fire: Option<DateTime<Utc>> = None;
		info!(target = "passbak.schedule", cron = %self.schedule.expression(), tz = %self.schedule.time_zone(), "scheduler started");

		loop {
			if shutdown.is_shutdown() {
				break;
			}

			let now = self.clock.now();
			let from = last_fire.map_or(now, |last| last.max(now));
			let Some(next) = self.schedule.next_after(from) else {
				warn!(target = "passbak.schedule", "cron expression has no future fire times");
				break;
			};
			let wait = (next - now).to_std().unwrap_or_default();
			info!(target = "passbak.schedule", next = %next.with_timezone(&self.schedule.time_zone()), "next run scheduled");

			tokio::select! {
				_ = tokio::time::sleep(wait) => {}
				_ = shutdown.wait() => break,
			}

			last_fire = Some(next);
			summary.runs += 1;
			if let Err(err) = job.fire().await {
				summary.failures += 1;
				error!(target = "passbak.schedule", error = %err, "job run failed");
			}

			let skipped = self.schedule.ticks_between(next, self.clock.now());
			if skipped > 0 {
				summary.skipped_ticks += skipped;
				warn!(target = "passbak.schedule", skipped, "run outlasted scheduled ticks, skipping them");
			}
		}

		info!(target = "passbak.schedule", runs = summary.runs, failures = summary.failures, "scheduler stopped");
		summary
	}

	/// Runs `job` once, right away.
	pub async fn fire_now(job: &dyn ScheduledJob) -> Result<()> {
		info!(target = "passbak.schedule", "running job immediately");
		job.fire().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use async_trait::async_trait;
	use chrono::TimeZone;
	use parking_lot::Mutex;

	fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
	}

	#[test]
	fn five_field_expressions_fire_on_the_minute() {
		let schedule = CronSchedule::parse("* * * * *", "UTC").unwrap();
		assert_eq!(schedule.next_after(at(0, 0, 30)), Some(at(0, 1, 0)));
		assert_eq!(schedule.next_after(at(0, 1, 0)), Some(at(0, 2, 0)));
	}

	#[test]
	fn time_zone_shifts_fire_times() {
		// 03:00 in Berlin is 02:00 UTC in winter.
		let schedule = CronSchedule::parse("0 3 * * *", "Europe/Berlin").unwrap();
		assert_eq!(schedule.next_after(at(0, 0, 0)), Some(at(2, 0, 0)));
	}

	#[test]
	fn six_field_expressions_keep_seconds() {
		let schedule = CronSchedule::parse("*/15 * * * * *", "UTC").unwrap();
		assert_eq!(schedule.next_after(at(0, 0, 1)), Some(at(0, 0, 15)));
	}

	#[test]
	fn bad_input_is_a_configuration_error() {
		assert!(CronSchedule::parse("* * * * *", "Mars/Olympus").unwrap_err().is_configuration());
		assert!(CronSchedule::parse("* * *", "UTC").unwrap_err().is_configuration());
		assert!(CronSchedule::parse("61 * * * *", "UTC").unwrap_err().is_configuration());
	}

	#[test]
	fn ticks_between_is_half_open() {
		let schedule = CronSchedule::parse("* * * * *", "UTC").unwrap();
		assert_eq!(schedule.ticks_between(at(0, 1, 0), at(0, 3, 0)), 2);
		assert_eq!(schedule.ticks_between(at(0, 1, 0), at(0, 1, 59)), 0);
	}

	/// Advances the clock by `duration` per run and fails the runs listed.
	struct SlowJob {
		clock: Arc<FixedClock>,
		duration: chrono::Duration,
		fail_on: Vec<usize>,
		stop_after: usize,
		fired: Mutex<usize>,
		shutdown: ShutdownSender,
	}

	#[async_trait]
	impl ScheduledJob for SlowJob {
		async fn fire(&self) -> Result<()> {
			let n = {
				let mut fired = self.fired.lock();
				*fired += 1;
				*fired
			};
			self.clock.advance(self.duration);
			if n >= self.stop_after {
				self.shutdown.shutdown();
			}
			if self.fail_on.contains(&n) {
				return Err(Error::Validation("boom".to_string()));
			}
			Ok(())
		}
	}

	#[tokio::test(start_paused = true)]
	async fn long_runs_skip_missed_ticks() {
		let clock = Arc::new(FixedClock::new(at(0, 0, 30)));
		let (tx, rx) = shutdown_channel();
		let job = SlowJob {
			clock: Arc::clone(&clock),
			duration: chrono::Duration::seconds(150),
			fail_on: Vec::new(),
			stop_after: 2,
			fired: Mutex::new(0),
			shutdown: tx,
		};
		let scheduler = Scheduler::new(CronSchedule::parse("* * * * *", "UTC").unwrap(), clock);

		let summary = scheduler.run(&job, rx).await;
		assert_eq!(summary.runs, 2);
		assert_eq!(summary.failures, 0);
		// 00:01 runs until 00:03:00 (skips 00:02, 00:03); 00:04 runs until 00:06:30.
		assert_eq!(summary.skipped_ticks, 4);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_runs_do_not_stop_the_loop() {
		let clock = Arc::new(FixedClock::new(at(0, 0, 0)));
		let (tx, rx) = shutdown_channel();
		let job = SlowJob {
			clock: Arc::clone(&clock),
			duration: chrono::Duration::seconds(1),
			fail_on: vec![1],
			stop_after: 3,
			fired: Mutex::new(0),
			shutdown: tx,
		};
		let scheduler = Scheduler::new(CronSchedule::parse("* * * * *", "UTC").unwrap(), clock);

		let summary = scheduler.run(&job, rx).await;
		assert_eq!(summary.runs, 3);
		assert_eq!(summary.failures, 1);
		assert_eq!(summary.skipped_ticks, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_interrupts_the_wait() {
		let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(at(0, 0, 0)));
		let (tx, rx) = shutdown_channel();
		let scheduler = Scheduler::new(CronSchedule::parse("0 0 1 1 *", "UTC").unwrap(), clock);
		let job = SlowJob {
			clock: Arc::new(FixedClock::new(at(0, 0, 0))),
			duration: chrono::Duration::zero(),
			fail_on: Vec::new(),
			stop_after: usize::MAX,
			fired: Mutex::new(0),
			shutdown: shutdown_channel().0,
		};

		let run = scheduler.run(&job, rx);
		tokio::pin!(run);
		tokio::select! {
			biased;
			_ = &mut run => panic!("scheduler returned before shutdown"),
			_ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
		}
		tx.shutdown();
		assert_eq!(run.await, SchedulerSummary::default());
	}
}
