//! [`Rate`] – fixed-frequency pacing for the simulation loop.
//!
//! Each call to [`Rate::sleep`] blocks until the next deadline and then
//! advances the deadline by one period.  Deadlines chain from each other, not
//! from the wake-up time, so small oversleeps do not accumulate into drift.
//!
//! When the caller overruns (a tick took longer than a period) `sleep`
//! returns immediately.  If it has fallen more than [`MAX_LAG_PERIODS`]
//! periods behind, the schedule is re-anchored on the current instant
//! instead of trying to catch up with a burst of back-to-back ticks.
//!
//! # Example
//!
//! ```rust
//! use simbridge_runtime::rate::Rate;
//! use std::time::Instant;
//!
//! let mut rate = Rate::new(200.0).unwrap();
//! let start = Instant::now();
//! for _ in 0..4 {
//!     rate.sleep();
//! }
//! assert!(start.elapsed() >= rate.period() * 3);
//! ```

use std::thread;
use std::time::{Duration, Instant};

use simbridge_types::BridgeError;

/// How many whole periods the loop may lag before the schedule is reset.
pub const MAX_LAG_PERIODS: u32 = 2;

/// Blocking fixed-rate pacer.
#[derive(Debug, Clone)]
pub struct Rate {
    period: Duration,
    next: Instant,
}

impl Rate {
    /// Pace at `hz` ticks per second.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `hz` is not a positive finite
    /// number.
    pub fn new(hz: f64) -> Result<Self, BridgeError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(BridgeError::Config(format!(
                "rate must be a positive number of hertz, got {hz}"
            )));
        }
        let period = Duration::try_from_secs_f64(1.0 / hz)
            .map_err(|e| BridgeError::Config(format!("rate {hz} Hz: {e}")))?;
        Self::from_period(period)
    }

    /// Pace with an explicit period.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for a zero period.
    pub fn from_period(period: Duration) -> Result<Self, BridgeError> {
        if period.is_zero() {
            return Err(BridgeError::Config("rate period must be non-zero".into()));
        }
        Ok(Self {
            period,
            next: Instant::now() + period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Re-anchor the schedule so the next deadline is one period from now.
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.period;
    }

    /// Block until the next deadline.  Returns the time actually slept.
    pub fn sleep(&mut self) -> Duration {
        let now = Instant::now();
        let slept = if self.next > now {
            let wait = self.next - now;
            thread::sleep(wait);
            wait
        } else {
            Duration::ZERO
        };

        self.next += self.period;
        let now = Instant::now();
        if now > self.next && now - self.next > self.period * MAX_LAG_PERIODS {
            self.next = now + self.period;
        }
        slept
    }
}
