// Time source, injectable for tests

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock (production)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
	now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(now) }
	}

	pub fn advance(&self, by: chrono::Duration) {
		*self.now.lock() += by;
	}
}

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock()
	}
}
