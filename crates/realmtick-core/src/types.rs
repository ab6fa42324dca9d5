use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many history entries an entity keeps. The recent-category bias only
/// looks at the last 8; the rest is context for digests and debugging.
pub const HISTORY_CAP: usize = 20;

// ---------------------------------------------------------------------------
// EntityStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Idle,
    InCombat,
    Dead,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Idle => "idle",
            EntityStatus::InCombat => "in_combat",
            EntityStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Combat,
    Recovery,
    Rest,
    Travel,
    Explore,
    Trade,
    Quest,
    Social,
    Craft,
}

impl ActionCategory {
    pub fn all() -> &'static [ActionCategory] {
        &[
            ActionCategory::Combat,
            ActionCategory::Recovery,
            ActionCategory::Rest,
            ActionCategory::Travel,
            ActionCategory::Explore,
            ActionCategory::Trade,
            ActionCategory::Quest,
            ActionCategory::Social,
            ActionCategory::Craft,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Combat => "combat",
            ActionCategory::Recovery => "recovery",
            ActionCategory::Rest => "rest",
            ActionCategory::Travel => "travel",
            ActionCategory::Explore => "explore",
            ActionCategory::Trade => "trade",
            ActionCategory::Quest => "quest",
            ActionCategory::Social => "social",
            ActionCategory::Craft => "craft",
        }
    }

    /// Categories whose actions need an open NPC to deal with.
    pub fn needs_npcs(self) -> bool {
        matches!(
            self,
            ActionCategory::Trade | ActionCategory::Quest | ActionCategory::Social
        )
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown action category '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub category: ActionCategory,
    pub at: DateTime<Utc>,
}

/// The simulated character. Owned by the entity store; the tick pipeline
/// receives a copy, mutates it and hands it back for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub realm_id: String,
    pub name: String,
    /// Only active entities are scheduled.
    #[serde(default = "default_active")]
    pub active: bool,
    pub status: EntityStatus,
    pub location: String,
    pub level: u32,
    pub xp: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub stamina: i32,
    pub max_stamina: i32,
    pub gold: u32,
    #[serde(default)]
    pub carried_weight: u32,
    pub carry_capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_quest: Option<String>,
    /// Fights won since the active quest was taken.
    #[serde(default)]
    pub quest_kills: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enemy: Option<Enemy>,
    /// Play-style profile code (see `profile`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Entity {
    /// A fresh level-1 character standing idle at `location`.
    pub fn new(
        id: impl Into<String>,
        realm_id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            realm_id: realm_id.into(),
            name: name.into(),
            active: true,
            status: EntityStatus::Idle,
            location: location.into(),
            level: 1,
            xp: 0,
            hp: 100,
            max_hp: 100,
            stamina: 100,
            max_stamina: 100,
            gold: 25,
            carried_weight: 0,
            carry_capacity: 50,
            active_quest: None,
            quest_kills: 0,
            enemy: None,
            profile: None,
            history: Vec::new(),
            last_action_at: Some(now),
            arrived_at: None,
            created_at: now,
            updated_at: now,
            last_processed_at: None,
        }
    }

    pub fn is_in_combat(&self) -> bool {
        self.status == EntityStatus::InCombat
    }

    pub fn is_dead(&self) -> bool {
        self.status == EntityStatus::Dead
    }

    pub fn health_ratio(&self) -> f64 {
        ratio(self.hp, self.max_hp)
    }

    pub fn stamina_ratio(&self) -> f64 {
        ratio(self.stamina, self.max_stamina)
    }

    /// Record an executed action, keeping the newest [`HISTORY_CAP`] entries.
    pub fn push_history(&mut self, action: &str, category: ActionCategory, at: DateTime<Utc>) {
        self.history.push(HistoryEntry {
            action: action.to_string(),
            category,
            at,
        });
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            status: self.status,
            location: self.location.clone(),
            hp: self.hp,
        }
    }
}

fn ratio(value: i32, max: i32) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    (value.max(0) as f64 / max as f64).clamp(0.0, 1.0)
}

/// The scheduler's view of an entity: enough to track cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEntity {
    pub id: String,
    pub realm_id: String,
    pub in_combat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub status: EntityStatus,
    pub location: String,
    pub hp: i32,
}

// ---------------------------------------------------------------------------
// Tick output records
// ---------------------------------------------------------------------------

/// One time-ordered event line produced by a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub entity_id: String,
    pub realm_id: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ActionCategory>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub entity_id: String,
    pub realm_id: String,
    pub at: DateTime<Utc>,
    /// Short machine tag: "level_up", "death", "quest_complete", "digest", ...
    pub kind: String,
    pub text: String,
}

/// Point-in-time summary kept for history views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub realm_id: String,
    pub taken_at: DateTime<Utc>,
    pub status: EntityStatus,
    pub location: String,
    pub level: u32,
    pub xp: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub gold: u32,
}

impl EntitySnapshot {
    pub fn of(entity: &Entity, taken_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity.id.clone(),
            realm_id: entity.realm_id.clone(),
            taken_at,
            status: entity.status,
            location: entity.location.clone(),
            level: entity.level,
            xp: entity.xp,
            hp: entity.hp,
            max_hp: entity.max_hp,
            gold: entity.gold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped_and_keeps_newest() {
        let now = Utc::now();
        let mut e = Entity::new("hero", "eu", "Hero", "town", now);
        for i in 0..(HISTORY_CAP + 5) {
            e.push_history(&format!("a{i}"), ActionCategory::Explore, now);
        }
        assert_eq!(e.history.len(), HISTORY_CAP);
        assert_eq!(e.history.last().unwrap().action, format!("a{}", HISTORY_CAP + 4));
        assert_eq!(e.history[0].action, "a5");
    }

    #[test]
    fn ratios_are_clamped() {
        let mut e = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        e.hp = -20;
        assert_eq!(e.health_ratio(), 0.0);
        e.max_stamina = 0;
        assert_eq!(e.stamina_ratio(), 0.0);
    }

    #[test]
    fn category_parses_from_str() {
        assert_eq!("trade".parse::<ActionCategory>(), Ok(ActionCategory::Trade));
        assert!("dance".parse::<ActionCategory>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&EntityStatus::InCombat).unwrap();
        assert_eq!(json, "\"in_combat\"");
    }
}
