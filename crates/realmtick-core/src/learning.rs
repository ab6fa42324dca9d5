//! Outcome learning: actions that keep failing lose weight, actions that
//! work gain a little.
//!
//! Invariant: `successes ≤ attempts`, at most [`RECENT_FAILURES_CAP`]
//! failure timestamps are kept, and the multiplier stays within the
//! configured bounds.

use crate::config::LearningBounds;
use crate::error::Result;
use crate::keys;
use crate::kv::{self, KvStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RECENT_FAILURES_CAP: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStat {
    pub attempts: u32,
    pub successes: u32,
    #[serde(default)]
    pub recent_failures: Vec<DateTime<Utc>>,
}

impl LearningStat {
    /// Failure rate over the newest attempts, counting only failures inside
    /// the window.
    pub fn recent_failure_rate(&self, bounds: &LearningBounds, now: DateTime<Utc>) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        let cutoff = now - Duration::seconds(bounds.failure_window_secs);
        let recent = self.recent_failures.iter().filter(|t| **t > cutoff).count();
        let sample = self.attempts.min(RECENT_FAILURES_CAP as u32) as f64;
        (recent as f64 / sample).min(1.0)
    }

    /// Linear from `max` (no recent failures) down to `min` (all failing).
    pub fn multiplier(&self, bounds: &LearningBounds, now: DateTime<Utc>) -> f64 {
        if self.attempts == 0 {
            return 1.0;
        }
        let (lo, hi) = (bounds.min.min(bounds.max), bounds.min.max(bounds.max));
        let rate = self.recent_failure_rate(bounds, now);
        (hi - (hi - lo) * rate).clamp(lo, hi)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearningStats {
    stats: BTreeMap<String, LearningStat>,
}

impl LearningStats {
    pub fn get(&self, action: &str) -> Option<&LearningStat> {
        self.stats.get(action)
    }

    pub fn multiplier(&self, action: &str, bounds: &LearningBounds, now: DateTime<Utc>) -> f64 {
        self.stats
            .get(action)
            .map(|s| s.multiplier(bounds, now))
            .unwrap_or(1.0)
    }

    /// Count a selection of `action`.
    pub fn record_attempt(&mut self, action: &str) {
        self.stats.entry(action.to_string()).or_default().attempts += 1;
    }

    /// Record the outcome of the last attempt of `action`.
    pub fn record_outcome(&mut self, action: &str, success: bool, now: DateTime<Utc>) {
        let stat = self.stats.entry(action.to_string()).or_default();
        if success {
            stat.successes = (stat.successes + 1).min(stat.attempts);
        } else {
            stat.recent_failures.push(now);
            if stat.recent_failures.len() > RECENT_FAILURES_CAP {
                let excess = stat.recent_failures.len() - RECENT_FAILURES_CAP;
                stat.recent_failures.drain(..excess);
            }
        }
    }
}

/// [`LearningStats`] persistence under `learning:{entityId}`.
#[derive(Clone)]
pub struct LearningStore {
    kv: Arc<dyn KvStore>,
}

impl LearningStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self, entity_id: &str) -> Result<LearningStats> {
        kv::get_json(self.kv.as_ref(), &keys::learning_key(entity_id))
    }

    /// Count one attempt of `action` and its outcome in a single atomic
    /// update.
    pub fn record(
        &self,
        entity_id: &str,
        action: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        kv::update_json(
            self.kv.as_ref(),
            &keys::learning_key(entity_id),
            |_: &LearningStats| true,
            |stats: &mut LearningStats| {
                stats.record_attempt(action);
                stats.record_outcome(action, success, now);
            },
        )
    }
}
