//! Static game content consumed by the decision engine.
//!
//! Content authoring lives elsewhere; this module only fixes the shape the
//! engine reads and ships a small built-in world so the system runs without
//! external data. A YAML file in the same shape replaces it.

use crate::error::{Result, TickError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub name: String,
    pub hp: i32,
    pub attack: i32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub xp: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub safe: bool,
    #[serde(default)]
    pub market: bool,
    #[serde(default)]
    pub quest_board: bool,
    #[serde(default)]
    pub npcs: bool,
    /// Chance (0..1) that arriving or exploring here starts a fight.
    #[serde(default)]
    pub danger: f64,
    #[serde(default)]
    pub neighbors: Vec<String>,
    #[serde(default)]
    pub enemies: Vec<EnemyTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    pub locations: BTreeMap<String, Location>,
    pub respawn_location: String,
    /// Hour (UTC, 0-23) at which NPCs open for business.
    #[serde(default = "default_open_hour")]
    pub npc_open_hour: u32,
    /// Hour (UTC, 0-23) at which NPCs close.
    #[serde(default = "default_close_hour")]
    pub npc_close_hour: u32,
}

fn default_open_hour() -> u32 {
    6
}

fn default_close_hour() -> u32 {
    22
}

impl GameData {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let game: GameData = serde_yaml::from_str(&data)?;
        game.check()?;
        Ok(game)
    }

    pub fn location(&self, id: &str) -> Result<&Location> {
        self.locations
            .get(id)
            .ok_or_else(|| TickError::LocationNotFound(id.to_string()))
    }

    /// Whether NPCs are open at `hour` (UTC).
    pub fn npcs_open_at(&self, hour: u32) -> bool {
        if self.npc_open_hour <= self.npc_close_hour {
            hour >= self.npc_open_hour && hour < self.npc_close_hour
        } else {
            hour >= self.npc_open_hour || hour < self.npc_close_hour
        }
    }

    fn check(&self) -> Result<()> {
        self.location(&self.respawn_location)?;
        for loc in self.locations.values() {
            for n in &loc.neighbors {
                if !self.locations.contains_key(n) {
                    return Err(TickError::InvalidConfig(format!(
                        "location '{}' lists unknown neighbor '{n}'",
                        loc.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// A four-location world: a safe town, a market village, and two
    /// increasingly dangerous wilds.
    pub fn builtin() -> Self {
        let wolf = EnemyTemplate {
            name: "Grey Wolf".into(),
            hp: 30,
            attack: 6,
            gold: 4,
            xp: 12,
        };
        let bandit = EnemyTemplate {
            name: "Bandit".into(),
            hp: 45,
            attack: 9,
            gold: 15,
            xp: 20,
        };
        let troll = EnemyTemplate {
            name: "Cave Troll".into(),
            hp: 90,
            attack: 14,
            gold: 40,
            xp: 55,
        };
        let locations = [
            Location {
                id: "town".into(),
                name: "Brindle Town".into(),
                safe: true,
                market: true,
                quest_board: true,
                npcs: true,
                danger: 0.0,
                neighbors: vec!["village".into(), "forest".into()],
                enemies: vec![],
            },
            Location {
                id: "village".into(),
                name: "Millbrook".into(),
                safe: true,
                market: true,
                quest_board: false,
                npcs: true,
                danger: 0.0,
                neighbors: vec!["town".into(), "forest".into()],
                enemies: vec![],
            },
            Location {
                id: "forest".into(),
                name: "Whisperwood".into(),
                safe: false,
                market: false,
                quest_board: false,
                npcs: false,
                danger: 0.35,
                neighbors: vec!["town".into(), "village".into(), "caves".into()],
                enemies: vec![wolf, bandit.clone()],
            },
            Location {
                id: "caves".into(),
                name: "Hollow Deep".into(),
                safe: false,
                market: false,
                quest_board: false,
                npcs: false,
                danger: 0.6,
                neighbors: vec!["forest".into()],
                enemies: vec![bandit, troll],
            },
        ];
        Self {
            locations: locations.into_iter().map(|l| (l.id.clone(), l)).collect(),
            respawn_location: "town".into(),
            npc_open_hour: default_open_hour(),
            npc_close_hour: default_close_hour(),
        }
    }
}

/// Where the worker gets its static data from. Loaded once and cached.
pub trait GameDataSource: Send + Sync {
    fn load(&self) -> Result<GameData>;
}

pub struct BuiltinGameData;

impl GameDataSource for BuiltinGameData {
    fn load(&self) -> Result<GameData> {
        Ok(GameData::builtin())
    }
}

pub struct YamlGameData {
    pub path: std::path::PathBuf,
}

impl GameDataSource for YamlGameData {
    fn load(&self) -> Result<GameData> {
        GameData::load(&self.path)
    }
}
