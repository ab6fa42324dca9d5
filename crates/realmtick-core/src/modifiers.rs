//! Time-bounded score modifiers (buffs, debuffs, event bonuses).

use crate::error::Result;
use crate::keys;
use crate::kv::{self, KvStore};
use crate::types::ActionCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveModifier {
    pub code: String,
    /// Additive contribution; `0.25` means +25%.
    pub multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Restricts the modifier to one category. `None` applies to all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ActionCategory>,
}

impl ActiveModifier {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t > now).unwrap_or(true)
    }

    fn applies_to(&self, category: ActionCategory) -> bool {
        self.category.map(|c| c == category).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierSet {
    modifiers: Vec<ActiveModifier>,
}

impl ModifierSet {
    pub fn iter(&self) -> impl Iterator<Item = &ActiveModifier> {
        self.modifiers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Add or replace the modifier with the same code.
    pub fn upsert(&mut self, modifier: ActiveModifier) {
        self.modifiers.retain(|m| m.code != modifier.code);
        self.modifiers.push(modifier);
    }

    pub fn remove(&mut self, code: &str) -> bool {
        let before = self.modifiers.len();
        self.modifiers.retain(|m| m.code != code);
        before != self.modifiers.len()
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.modifiers.retain(|m| m.is_live(now));
    }

    /// `max(0, 1 + Σ multiplier)` over live modifiers applying to `category`.
    pub fn combined(&self, category: ActionCategory, now: DateTime<Utc>) -> f64 {
        let sum: f64 = self
            .modifiers
            .iter()
            .filter(|m| m.is_live(now) && m.applies_to(category))
            .map(|m| m.multiplier)
            .sum();
        (1.0 + sum).max(0.0)
    }
}

/// [`ModifierSet`] persistence under `modifiers:{entityId}`. Expired entries
/// are dropped on every read.
#[derive(Clone)]
pub struct ModifierStore {
    kv: Arc<dyn KvStore>,
}

impl ModifierStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self, entity_id: &str, now: DateTime<Utc>) -> Result<ModifierSet> {
        let mut set: ModifierSet = kv::get_json(self.kv.as_ref(), &keys::modifiers_key(entity_id))?;
        set.prune(now);
        Ok(set)
    }

    pub fn add(&self, entity_id: &str, modifier: ActiveModifier, now: DateTime<Utc>) -> Result<()> {
        self.update(entity_id, now, |set| set.upsert(modifier))
    }

    pub fn remove(&self, entity_id: &str, code: &str, now: DateTime<Utc>) -> Result<bool> {
        self.update(entity_id, now, |set| set.remove(code))
    }

    fn update<R>(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut ModifierSet) -> R,
    ) -> Result<R> {
        kv::update_json(
            self.kv.as_ref(),
            &keys::modifiers_key(entity_id),
            |set: &ModifierSet| !set.is_empty(),
            |set: &mut ModifierSet| {
                set.prune(now);
                f(set)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::Duration;

    fn modifier(code: &str, mult: f64, category: Option<ActionCategory>) -> ActiveModifier {
        ActiveModifier {
            code: code.into(),
            multiplier: mult,
            expires_at: None,
            category,
        }
    }

    #[test]
    fn combined_sums_matching_modifiers() {
        let now = Utc::now();
        let mut set = ModifierSet::default();
        set.upsert(modifier("blessed", 0.25, None));
        set.upsert(modifier("market-day", 0.5, Some(ActionCategory::Trade)));
        assert!((set.combined(ActionCategory::Trade, now) - 1.75).abs() < 1e-9);
        assert!((set.combined(ActionCategory::Rest, now) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn combined_never_negative() {
        let now = Utc::now();
        let mut set = ModifierSet::default();
        set.upsert(modifier("cursed", -3.0, None));
        assert_eq!(set.combined(ActionCategory::Explore, now), 0.0);
    }

    #[test]
    fn expired_modifiers_are_ignored() {
        let now = Utc::now();
        let mut set = ModifierSet::default();
        let mut m = modifier("haste", 1.0, None);
        m.expires_at = Some(now - Duration::seconds(1));
        set.upsert(m);
        assert_eq!(set.combined(ActionCategory::Travel, now), 1.0);
    }

    #[test]
    fn upsert_replaces_same_code() {
        let mut set = ModifierSet::default();
        set.upsert(modifier("blessed", 0.25, None));
        set.upsert(modifier("blessed", 0.5, None));
        assert_eq!(set.iter().count(), 1);
        assert_eq!(set.iter().next().unwrap().multiplier, 0.5);
    }

    #[test]
    fn store_prunes_on_load() {
        let store = ModifierStore::new(Arc::new(MemoryKv::new()));
        let now = Utc::now();
        let mut short = modifier("haste", 0.3, None);
        short.expires_at = Some(now + Duration::seconds(10));
        store.add("hero", short, now).unwrap();
        store.add("hero", modifier("blessed", 0.1, None), now).unwrap();
        assert_eq!(store.load("hero", now).unwrap().iter().count(), 2);
        let later = now + Duration::seconds(11);
        assert_eq!(store.load("hero", later).unwrap().iter().count(), 1);
        assert!(store.remove("hero", "blessed", later).unwrap());
    }
}
