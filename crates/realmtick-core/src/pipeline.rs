//! One decision-and-effect step for one entity.
//!
//! Derives the world state, asks the engine for an action, performs it and
//! records the consequences the engine reads next time: learning stats,
//! fatigue, history and the last-action timestamp. Persisting the entity
//! and emitting records is the worker's job.

use crate::catalog::{ActionContext, ChronicleNote};
use crate::engine::{Decision, DecisionEngine, DecisionInput};
use crate::error::Result;
use crate::fatigue::FatigueStore;
use crate::game_data::GameData;
use crate::kv::KvStore;
use crate::learning::LearningStore;
use crate::modifiers::ModifierStore;
use crate::types::Entity;
use crate::world::WorldState;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub entity: Entity,
    pub decision: Option<Decision>,
    pub log_lines: Vec<String>,
    pub chronicle: Vec<ChronicleNote>,
    pub success: bool,
}

#[derive(Clone)]
pub struct TickPipeline {
    engine: Arc<DecisionEngine>,
    fatigue: FatigueStore,
    modifiers: ModifierStore,
    learning: LearningStore,
}

impl TickPipeline {
    pub fn new(engine: Arc<DecisionEngine>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            engine,
            fatigue: FatigueStore::new(kv.clone()),
            modifiers: ModifierStore::new(kv.clone()),
            learning: LearningStore::new(kv),
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn fatigue(&self) -> &FatigueStore {
        &self.fatigue
    }

    pub fn modifiers(&self) -> &ModifierStore {
        &self.modifiers
    }

    /// Decide without performing or recording anything.
    pub fn preview(
        &self,
        entity: &Entity,
        game: &GameData,
        now: DateTime<Utc>,
    ) -> Result<Option<Decision>> {
        let world = WorldState::derive(entity, game, now);
        let fatigue = self.fatigue.load(&entity.id)?;
        let modifiers = self.modifiers.load(&entity.id, now)?;
        let learning = self.learning.load(&entity.id)?;
        let input = DecisionInput {
            entity,
            world: &world,
            game,
            fatigue: &fatigue,
            modifiers: &modifiers,
            learning: &learning,
            now,
        };
        self.engine.decide(&input)
    }

    pub fn run_tick(
        &self,
        mut entity: Entity,
        game: &GameData,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<TickOutcome> {
        let world = WorldState::derive(&entity, game, now);
        let fatigue = self.fatigue.load(&entity.id)?;
        let modifiers = self.modifiers.load(&entity.id, now)?;
        let learning = self.learning.load(&entity.id)?;

        let picked = {
            let input = DecisionInput {
                entity: &entity,
                world: &world,
                game,
                fatigue: &fatigue,
                modifiers: &modifiers,
                learning: &learning,
                now,
            };
            self.engine.pick(&input)?
        };

        let Some((entry, decision)) = picked else {
            debug!(entity_id = %entity.id, status = %entity.status, "no action this tick");
            entity.updated_at = now;
            return Ok(TickOutcome {
                log_lines: vec![format!("{} bides their time.", entity.name)],
                entity,
                decision: None,
                chronicle: Vec::new(),
                success: true,
            });
        };

        debug!(
            entity_id = %entity.id,
            action = %entry.id,
            branch = decision.branch,
            score = decision.score,
            "action picked"
        );

        let outcome = {
            let mut ctx = ActionContext {
                entity: &mut entity,
                world: &world,
                game,
                rng,
                now,
            };
            entry.action.perform(&mut ctx)?
        };
        self.learning
            .record(&entity.id, &entry.id, outcome.success, now)?;
        self.fatigue
            .record_use(&entity.id, &entry.id, self.engine.fatigue_config(), now)?;

        entity.push_history(&entry.id, entry.category, now);
        entity.last_action_at = Some(now);
        entity.updated_at = now;
        self.engine.invalidate_entity(&entity.id);

        Ok(TickOutcome {
            entity,
            decision: Some(decision),
            log_lines: outcome.log_lines,
            chronicle: outcome.chronicle,
            success: outcome.success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::default_catalog;
    use crate::clock::ManualClock;
    use crate::config::{DecisionConfig, FatigueConfig};
    use crate::kv::MemoryKv;
    use crate::learning::LearningStats;
    use crate::profile::ProfileRegistry;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn pipeline() -> (TickPipeline, Arc<dyn KvStore>) {
        let clock = Arc::new(ManualClock::new(noon()));
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::with_clock(clock.clone()));
        let engine = DecisionEngine::new(
            Arc::new(default_catalog().unwrap()),
            ProfileRegistry::builtin(),
            DecisionConfig::default(),
            FatigueConfig::default(),
            clock,
        );
        (TickPipeline::new(Arc::new(engine), kv.clone()), kv)
    }

    #[test]
    fn tick_records_history_fatigue_and_learning() {
        let (pipeline, kv) = pipeline();
        let game = GameData::builtin();
        let hero = Entity::new("hero", "eu", "Hero", "town", noon());
        let mut rng = StdRng::seed_from_u64(1);
        let out = pipeline.run_tick(hero, &game, noon(), &mut rng).unwrap();

        let decision = out.decision.expect("town at noon always has something to do");
        assert_eq!(out.entity.history.len(), 1);
        assert_eq!(out.entity.history[0].action, decision.action_id);
        assert_eq!(out.entity.last_action_at, Some(noon()));
        assert!(!out.log_lines.is_empty());

        let fatigue = pipeline.fatigue().load("hero").unwrap();
        assert_eq!(fatigue.count(&decision.action_id), 1);
        let learning: LearningStats =
            crate::kv::get_json(kv.as_ref(), &crate::keys::learning_key("hero")).unwrap();
        assert_eq!(learning.get(&decision.action_id).unwrap().attempts, 1);
    }

    #[test]
    fn preview_has_no_side_effects() {
        let (pipeline, _kv) = pipeline();
        let game = GameData::builtin();
        let hero = Entity::new("hero", "eu", "Hero", "town", noon());
        assert!(pipeline.preview(&hero, &game, noon()).unwrap().is_some());
        assert!(pipeline.fatigue().load("hero").unwrap().is_empty());
    }

    #[test]
    fn same_seed_replays_same_outcome() {
        let (a, _) = pipeline();
        let (b, _) = pipeline();
        let game = GameData::builtin();
        let mut hero = Entity::new("hero", "eu", "Hero", "forest", noon());
        hero.last_action_at = Some(noon());
        let out_a = a
            .run_tick(hero.clone(), &game, noon(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let out_b = b
            .run_tick(hero, &game, noon(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(out_a.entity, out_b.entity);
        assert_eq!(out_a.log_lines, out_b.log_lines);
    }
}
