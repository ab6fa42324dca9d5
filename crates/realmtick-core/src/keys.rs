//! Key shapes in the shared key-value namespace.

use crate::error::{Result, TickError};

pub const LEADER_KEY: &str = "leader:key";

/// Producer-side dedup guard for one entity in one coarse time bucket.
pub fn guard_key(entity_id: &str, time_bucket: i64) -> String {
    format!("guard:{entity_id}:{time_bucket}")
}

/// Worker-side idempotency guard for one scheduled tick.
pub fn tick_key(realm_id: &str, entity_id: &str, scheduled_at_ms: i64) -> String {
    format!("tick:{realm_id}:{entity_id}:{scheduled_at_ms}")
}

pub fn snapshot_lock_key(realm_id: &str, entity_id: &str) -> String {
    format!("snapshot-lock:{realm_id}:{entity_id}")
}

pub fn hot_cache_key(entity_id: &str) -> String {
    format!("hot:{entity_id}")
}

pub fn fatigue_key(entity_id: &str) -> String {
    format!("fatigue:{entity_id}")
}

pub fn learning_key(entity_id: &str) -> String {
    format!("learning:{entity_id}")
}

pub fn modifiers_key(entity_id: &str) -> String {
    format!("modifiers:{entity_id}")
}

/// Entity and realm ids are embedded in `:`-separated keys and in
/// `/`-separated store keys, so neither separator may appear in them.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains(':') {
        return Err(TickError::InvalidEntityId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(guard_key("hero", 42), "guard:hero:42");
        assert_eq!(tick_key("eu", "hero", 1700), "tick:eu:hero:1700");
        assert_eq!(snapshot_lock_key("eu", "hero"), "snapshot-lock:eu:hero");
    }

    #[test]
    fn ids_with_separators_are_rejected() {
        assert!(validate_id("hero-1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a:b").is_err());
    }
}
