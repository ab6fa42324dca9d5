use crate::game_data::GameData;
use crate::types::Entity;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Stamina ratio under which an entity counts as tired.
pub const TIRED_STAMINA_RATIO: f64 = 0.35;

/// Normalized snapshot of an entity's situation. Priority rules and gate
/// conditions read only this, never the raw entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub health_ratio: f64,
    pub stamina_ratio: f64,
    pub in_combat: bool,
    pub location_safe: bool,
    pub overencumbered: bool,
    pub quest_available: bool,
    pub tired: bool,
    pub npcs_open: bool,
    pub has_market: bool,
}

impl WorldState {
    /// Derive the snapshot from the entity and static data. An entity
    /// standing at an unknown location is treated as unsafe and NPC-less.
    pub fn derive(entity: &Entity, game: &GameData, now: DateTime<Utc>) -> Self {
        let loc = game.locations.get(&entity.location);
        let npcs_here = loc.map(|l| l.npcs).unwrap_or(false);
        let stamina_ratio = entity.stamina_ratio();
        Self {
            health_ratio: entity.health_ratio(),
            stamina_ratio,
            in_combat: entity.is_in_combat(),
            location_safe: loc.map(|l| l.safe).unwrap_or(false),
            overencumbered: entity.carried_weight > entity.carry_capacity,
            quest_available: entity.active_quest.is_none()
                && loc.map(|l| l.quest_board).unwrap_or(false),
            tired: stamina_ratio < TIRED_STAMINA_RATIO,
            npcs_open: npcs_here && game.npcs_open_at(now.hour()),
            has_market: loc.map(|l| l.market).unwrap_or(false),
        }
    }
}
