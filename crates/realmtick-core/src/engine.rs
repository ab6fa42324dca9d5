//! Decision engine: gate → score → pick.
//!
//! ```text
//! total = base(rule) × profile × fatigue × modifier × learning
//!       × raw weight × category multiplier × recent-category bias
//! ```
//!
//! Ranked lists are cached for a short TTL per
//! `(entity, candidate count, status)`; the pipeline invalidates an entity
//! right after performing an action for it.

use crate::behavior::BehaviorTree;
use crate::cache::TtlCache;
use crate::catalog::{ActionCatalog, ActionState, CatalogEntry};
use crate::clock::Clock;
use crate::config::{DecisionConfig, FatigueConfig};
use crate::error::Result;
use crate::fatigue::FatigueMap;
use crate::game_data::GameData;
use crate::learning::LearningStats;
use crate::modifiers::ModifierSet;
use crate::profile::ProfileRegistry;
use crate::rules::RuleSet;
use crate::types::{ActionCategory, Entity, EntityStatus};
use crate::world::WorldState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Branch name reported when the behavior tree is disabled.
pub const FLAT_BRANCH: &str = "flat";

/// Everything the engine reads for one decision. Nothing here is mutated.
pub struct DecisionInput<'a> {
    pub entity: &'a Entity,
    pub world: &'a WorldState,
    pub game: &'a GameData,
    pub fatigue: &'a FatigueMap,
    pub modifiers: &'a ModifierSet,
    pub learning: &'a LearningStats,
    pub now: DateTime<Utc>,
}

impl DecisionInput<'_> {
    fn state(&self) -> ActionState<'_> {
        ActionState {
            entity: self.entity,
            world: self.world,
            game: self.game,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub rule: &'static str,
    pub base: f64,
    pub profile: f64,
    pub fatigue: f64,
    pub modifier: f64,
    pub learning: f64,
    pub raw: f64,
    pub category: f64,
    pub recent: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.base
            * self.profile
            * self.fatigue
            * self.modifier
            * self.learning
            * self.raw
            * self.category
            * self.recent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAction {
    pub action_id: String,
    pub category: ActionCategory,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action_id: String,
    pub category: ActionCategory,
    /// Gate branch that produced the decision.
    pub branch: &'static str,
    pub score: f64,
    /// All scored candidates of the winning branch, best first.
    pub ranked: Vec<ScoredAction>,
}

type ScoreKey = (String, usize, EntityStatus);

pub struct DecisionEngine {
    catalog: Arc<ActionCatalog>,
    rules: RuleSet,
    tree: BehaviorTree,
    profiles: ProfileRegistry,
    decision: DecisionConfig,
    fatigue: FatigueConfig,
    cache: Mutex<TtlCache<ScoreKey, Vec<ScoredAction>>>,
}

impl DecisionEngine {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        profiles: ProfileRegistry,
        decision: DecisionConfig,
        fatigue: FatigueConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_millis(decision.score_cache_ms);
        Self {
            catalog,
            rules: RuleSet::default(),
            tree: BehaviorTree::default(),
            profiles,
            decision,
            fatigue,
            cache: Mutex::new(TtlCache::new(ttl, clock)),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_tree(mut self, tree: BehaviorTree) -> Self {
        self.tree = tree;
        self
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn fatigue_config(&self) -> &FatigueConfig {
        &self.fatigue
    }

    fn cache(&self) -> MutexGuard<'_, TtlCache<ScoreKey, Vec<ScoredAction>>> {
        // A poisoned cache only holds stale scores; keep using it.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every cached ranking of `entity_id`.
    pub fn invalidate_entity(&self, entity_id: &str) {
        self.cache().invalidate_where(|(id, _, _)| id == entity_id);
    }

    // -----------------------------------------------------------------------
    // Gate
    // -----------------------------------------------------------------------

    /// Choose an action. `None` means no branch produced a performable,
    /// positively scored action this tick.
    pub fn decide(&self, input: &DecisionInput<'_>) -> Result<Option<Decision>> {
        if !self.decision.behavior_tree {
            let candidates = self.performable(input, |_| true);
            return self.rank_and_pick(input, FLAT_BRANCH, &candidates);
        }
        for branch in self.tree.branches() {
            if !(branch.condition)(input, &self.decision) {
                continue;
            }
            let candidates = self.performable(input, |entry| (branch.allows)(entry, input));
            if let Some(decision) = self.rank_and_pick(input, branch.id, &candidates)? {
                return Ok(Some(decision));
            }
        }
        Ok(None)
    }

    /// [`decide`](Self::decide) plus the catalog entry whose `perform` the
    /// caller should run.
    pub fn pick(&self, input: &DecisionInput<'_>) -> Result<Option<(&CatalogEntry, Decision)>> {
        let Some(decision) = self.decide(input)? else {
            return Ok(None);
        };
        let entry = self.catalog.require(&decision.action_id)?;
        Ok(Some((entry, decision)))
    }

    fn performable(
        &self,
        input: &DecisionInput<'_>,
        allow: impl Fn(&CatalogEntry) -> bool,
    ) -> Vec<&CatalogEntry> {
        let state = input.state();
        self.catalog
            .entries()
            .iter()
            .filter(|entry| allow(entry) && entry.action.can_perform(&state))
            .collect()
    }

    fn rank_and_pick(
        &self,
        input: &DecisionInput<'_>,
        branch: &'static str,
        candidates: &[&CatalogEntry],
    ) -> Result<Option<Decision>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let ranked = self.score(input, candidates)?;
        let Some(best) = ranked.first().filter(|s| s.score > 0.0) else {
            return Ok(None);
        };
        Ok(Some(Decision {
            action_id: best.action_id.clone(),
            category: best.category,
            branch,
            score: best.score,
            ranked: ranked.clone(),
        }))
    }

    // -----------------------------------------------------------------------
    // Score
    // -----------------------------------------------------------------------

    /// Score `candidates` and sort them best first. Ties keep candidate
    /// (catalog) order.
    pub fn score(
        &self,
        input: &DecisionInput<'_>,
        candidates: &[&CatalogEntry],
    ) -> Result<Vec<ScoredAction>> {
        let key: ScoreKey = (input.entity.id.clone(), candidates.len(), input.entity.status);
        if let Some(cached) = self.cache().get(&key) {
            // Same count can come from a different branch; only reuse a
            // ranking over the same candidates.
            let same = cached
                .iter()
                .all(|s| candidates.iter().any(|c| c.id == s.action_id));
            if same {
                return Ok(cached);
            }
        }

        let rule = self.rules.first_match(input.world)?;
        let state = input.state();
        let mut scored: Vec<ScoredAction> = candidates
            .iter()
            .map(|entry| {
                let breakdown = ScoreBreakdown {
                    rule: rule.id,
                    base: rule.apply(entry.category).base,
                    profile: self
                        .profiles
                        .affinity(input.entity.profile.as_deref(), entry.category),
                    fatigue: input.fatigue.multiplier(&entry.id, &self.fatigue),
                    modifier: input.modifiers.combined(entry.category, input.now),
                    learning: input.learning.multiplier(
                        &entry.id,
                        &self.decision.learning,
                        input.now,
                    ),
                    raw: entry.action.weight(&state).max(0.0),
                    category: self.decision.category_multiplier(entry.category).max(0.0),
                    recent: self.recent_bias(input.entity, entry.category),
                };
                ScoredAction {
                    action_id: entry.id.clone(),
                    category: entry.category,
                    score: breakdown.total(),
                    breakdown,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        self.cache().insert(key, scored.clone());
        Ok(scored)
    }

    /// Dampen categories that dominate the newest history entries.
    pub fn recent_bias(&self, entity: &Entity, category: ActionCategory) -> f64 {
        let bias = &self.decision.recent_bias;
        let same = entity
            .history
            .iter()
            .rev()
            .take(bias.window)
            .filter(|h| h.category == category)
            .count();
        if same >= bias.heavy_count {
            bias.heavy_factor
        } else if same >= bias.light_count {
            bias.light_factor
        } else {
            1.0
        }
    }
}
