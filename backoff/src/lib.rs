//! Jittered exponential backoff.
//!
//! [`Backoff`] yields a sequence of wait durations for retry loops: each
//! duration is drawn uniformly between the initial backoff and the previous
//! duration multiplied by `base`, capped at `max_backoff`. Randomizing the
//! whole interval rather than adding noise to a fixed schedule keeps
//! concurrent retriers from synchronizing on the same cadence.

use std::time::Duration;

use rand::prelude::*;

/// Configuration for [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Initial backoff.
    pub init_backoff: Duration,

    /// Maximum backoff.
    pub max_backoff: Duration,

    /// Multiplier for the upper bound of the next backoff interval.
    pub base: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            base: 2.0,
        }
    }
}

/// Produces the backoff sequence described by a [`BackoffConfig`].
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl Backoff {
    /// Create a new [`Backoff`] drawing jitter from the thread-local rng.
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a [`Backoff`] with the optional rng used to pick durations,
    /// allowing tests to pin the sequence.
    pub fn new_with_rng(
        config: &BackoffConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            // base < 1 would shrink the window below the initial backoff
            base: config.base.max(1.0),
            rng,
        }
    }

    /// Returns the next backoff duration to wait for.
    pub fn next(&mut self) -> Duration {
        let range = self.init_backoff..(self.next_backoff_secs * self.base);

        // An empty range means the schedule cannot grow (e.g. base of 1)
        let sampled = if range.is_empty() {
            self.next_backoff_secs
        } else {
            match self.rng.as_mut() {
                Some(rng) => rng.gen_range(range),
                None => thread_rng().gen_range(range),
            }
        };

        self.next_backoff_secs = sampled.min(self.max_backoff_secs);
        Duration::from_secs_f64(self.next_backoff_secs)
    }
}
