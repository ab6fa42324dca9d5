//! Per-entity usage counters that dampen repeated actions.
//!
//! Invariant: `0 ≤ count ≤ window` for every entry, and entries whose count
//! reaches zero are removed rather than kept at zero.

use crate::config::FatigueConfig;
use crate::error::Result;
use crate::keys;
use crate::kv::{self, KvStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lower bound of the fatigue multiplier for non-exempt actions.
pub const MIN_MULTIPLIER: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatigueEntry {
    pub count: u32,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FatigueMap {
    entries: BTreeMap<String, FatigueEntry>,
}

impl FatigueMap {
    pub fn count(&self, action: &str) -> u32 {
        self.entries.get(action).map(|e| e.count).unwrap_or(0)
    }

    pub fn entries(&self) -> &BTreeMap<String, FatigueEntry> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `1 − min(0.9, count/window × strength)`, or exactly 1.0 for exempt
    /// actions.
    pub fn multiplier(&self, action: &str, cfg: &FatigueConfig) -> f64 {
        if cfg.is_exempt(action) || cfg.window == 0 {
            return 1.0;
        }
        let load = self.count(action) as f64 / cfg.window as f64 * cfg.strength.max(0.0);
        1.0 - load.min(1.0 - MIN_MULTIPLIER)
    }

    /// Count one execution of `action`, saturating at `window`.
    pub fn record_use(&mut self, action: &str, window: u32, now: DateTime<Utc>) {
        let entry = self
            .entries
            .entry(action.to_string())
            .or_insert(FatigueEntry {
                count: 0,
                last_used_at: now,
            });
        entry.count = (entry.count + 1).min(window);
        entry.last_used_at = now;
        if entry.count == 0 {
            self.entries.remove(action);
        }
    }

    /// One decay step: every count drops by `max(1, floor(count × rate))`.
    /// Returns how many entries reached zero and were removed.
    pub fn decay(&mut self, rate: f64) -> usize {
        let before = self.entries.len();
        for entry in self.entries.values_mut() {
            let step = ((entry.count as f64 * rate).floor() as u32).max(1);
            entry.count = entry.count.saturating_sub(step);
        }
        self.entries.retain(|_, e| e.count > 0);
        before - self.entries.len()
    }
}

/// [`FatigueMap`] persistence under `fatigue:{entityId}`.
#[derive(Clone)]
pub struct FatigueStore {
    kv: Arc<dyn KvStore>,
}

impl FatigueStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self, entity_id: &str) -> Result<FatigueMap> {
        kv::get_json(self.kv.as_ref(), &keys::fatigue_key(entity_id))
    }

    pub fn record_use(
        &self,
        entity_id: &str,
        action: &str,
        cfg: &FatigueConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        kv::update_json(
            self.kv.as_ref(),
            &keys::fatigue_key(entity_id),
            |map: &FatigueMap| !map.is_empty(),
            |map: &mut FatigueMap| map.record_use(action, cfg.window, now),
        )
    }

    /// Decay one entity's counters. Returns the number of entries removed.
    pub fn decay(&self, entity_id: &str, rate: f64) -> Result<usize> {
        kv::update_json(
            self.kv.as_ref(),
            &keys::fatigue_key(entity_id),
            |map: &FatigueMap| !map.is_empty(),
            |map: &mut FatigueMap| map.decay(rate),
        )
    }
}
