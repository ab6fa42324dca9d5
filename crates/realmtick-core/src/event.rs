use crate::types::{Entity, EntitySummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel every per-tick update is published on.
pub const ENTITY_UPDATES_CHANNEL: &str = "entity-updates";

/// Realtime summary published after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub realm_id: String,
    pub entity_id: String,
    pub tick_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub summary: EntitySummary,
}

impl RealtimeEvent {
    pub fn for_entity(entity: &Entity, tick_at: i64, correlation_id: Option<String>) -> Self {
        Self {
            realm_id: entity.realm_id.clone(),
            entity_id: entity.id.clone(),
            tick_at,
            correlation_id,
            updated_at: entity.updated_at,
            summary: entity.summary(),
        }
    }
}
