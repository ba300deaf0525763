// src/pipeline/backoff.rs

//! Per-source exponential backoff.
//!
//! State is process-local: a restart forgets every window, which makes all
//! sources eligible on the first tick. Delays grow only while a window is
//! still recorded; once it elapses the entry is dropped and the next failure
//! starts again at the floor.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::BackoffConfig;

#[derive(Debug, Clone, Copy)]
struct BackoffEntry {
    next_eligible_at: DateTime<Utc>,
    delay: Duration,
}

/// Tracks which sources are inside a retry window.
#[derive(Debug, Clone)]
pub struct BackoffTracker {
    floor: Duration,
    ceiling: Duration,
    factor: f64,
    entries: HashMap<String, BackoffEntry>,
}

impl Default for BackoffTracker {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffTracker {
    pub fn new(floor: Duration, ceiling: Duration, factor: f64) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            factor: if factor.is_finite() && factor >= 1.0 {
                factor
            } else {
                1.0
            },
            entries: HashMap::new(),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.floor(), config.ceiling(), config.factor)
    }

    /// Time left before `id` may be fetched again. An elapsed window is
    /// removed and reported as zero.
    pub fn remaining(&mut self, id: &str, now: DateTime<Utc>) -> Duration {
        let Some(entry) = self.entries.get(id) else {
            return Duration::ZERO;
        };
        if entry.next_eligible_at > now {
            return (entry.next_eligible_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
        }
        self.entries.remove(id);
        Duration::ZERO
    }

    /// Record a failure and return the delay now in force.
    ///
    /// A positive `suggested` delay is used as-is. Otherwise the delay is the
    /// floor when no window is recorded, or the recorded delay times the
    /// factor. The ceiling applies in both cases.
    pub fn schedule(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
        suggested: Option<Duration>,
    ) -> Duration {
        let delay = match suggested.filter(|d| !d.is_zero()) {
            Some(suggested) => suggested,
            None => match self.entries.get(id) {
                Some(prev) => Duration::try_from_secs_f64(prev.delay.as_secs_f64() * self.factor)
                    .unwrap_or(self.ceiling),
                None => self.floor,
            },
        }
        .min(self.ceiling);

        let next_eligible_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries.insert(
            id.to_string(),
            BackoffEntry {
                next_eligible_at,
                delay,
            },
        );
        delay
    }

    /// Clear any window for `id`.
    pub fn reset(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Number of sources with a recorded window.
    pub fn active(&self) -> usize {
        self.entries.len()
    }
}
