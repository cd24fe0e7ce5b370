use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inclusive range of seconds a politeness delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (low, high) = if self.min_secs <= self.max_secs {
            (self.min_secs, self.max_secs)
        } else {
            (self.max_secs, self.min_secs)
        };
        let low = low.max(0.0);
        let high = high.max(0.0);
        if high <= low {
            return Duration::from_secs_f64(low);
        }
        Duration::from_secs_f64(rng.gen_range(low..=high))
    }
}

/// Delay ranges that make up the crawl-politeness contract of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayPlan {
    pub after_candidate: DelayRange,
    pub between_queries: DelayRange,
    pub between_categories: DelayRange,
    pub after_search_page: DelayRange,
    pub after_search_error: DelayRange,
    pub retry_backoff: DelayRange,
}

pub trait Pacer {
    fn pause(&self, range: DelayRange, reason: &str);
}

/// Sleeps the calling thread for a random duration from the range.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, range: DelayRange, reason: &str) {
        let delay = range.sample(&mut rand::thread_rng());
        debug!(reason, delay_ms = delay.as_millis() as u64, "pausing");
        thread::sleep(delay);
    }
}

/// Skips every delay. Only for tests and dry runs against local fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacer for NoDelay {
    fn pause(&self, _range: DelayRange, _reason: &str) {}
}

/// Cooperative stop request shared with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
