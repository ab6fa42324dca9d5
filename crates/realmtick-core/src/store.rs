//! Persistent entity store: the single source of truth for entity state,
//! plus the append-only log, chronicle and snapshot records a tick emits.
//!
//! [`RedbEntityStore`] keys every per-entity record as
//! `{entityId}/{ms:013}/...`, so one entity's records form a contiguous,
//! time-ordered range. Entity ids never contain `/` (see
//! [`keys::validate_id`]).

use crate::error::{Result, TickError};
use crate::keys;
use crate::types::{ActiveEntity, ChronicleEntry, Entity, EntitySnapshot, LogRecord};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use std::path::Path;

pub trait EntityStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Entity>>;

    fn put(&self, entity: &Entity) -> Result<()>;

    fn list(&self) -> Result<Vec<Entity>>;

    /// Entities the scheduler should track.
    fn list_active(&self) -> Result<Vec<ActiveEntity>>;

    fn append_logs(&self, records: &[LogRecord]) -> Result<()>;

    /// Log records of one entity with `from ≤ at < to`, oldest first.
    fn logs_between(
        &self,
        entity_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>>;

    /// The newest `limit` log records, oldest first.
    fn recent_logs(&self, entity_id: &str, limit: usize) -> Result<Vec<LogRecord>>;

    fn append_chronicle(&self, entries: &[ChronicleEntry]) -> Result<()>;

    fn chronicle(&self, entity_id: &str, limit: usize) -> Result<Vec<ChronicleEntry>>;

    fn save_snapshot(&self, snapshot: &EntitySnapshot) -> Result<()>;

    fn snapshots(&self, entity_id: &str) -> Result<Vec<EntitySnapshot>>;

    /// Keep the newest `keep` snapshots of the entity. Returns how many were
    /// removed.
    fn prune_snapshots(&self, entity_id: &str, keep: usize) -> Result<usize>;

    fn require(&self, id: &str) -> Result<Entity> {
        self.get(id)?
            .ok_or_else(|| TickError::EntityNotFound(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");
const LOGS: TableDefinition<&str, &[u8]> = TableDefinition::new("logs");
const CHRONICLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chronicle");
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

fn store_err(e: impl std::fmt::Display) -> TickError {
    TickError::EntityStore(e.to_string())
}

fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis().max(0)
}

fn time_prefix(entity_id: &str, ts: DateTime<Utc>) -> String {
    format!("{entity_id}/{:013}", ms(ts))
}

/// Bounds covering every key of `entity_id`: `'0'` sorts right after `'/'`.
fn entity_range(entity_id: &str) -> (String, String) {
    (format!("{entity_id}/"), format!("{entity_id}0"))
}

fn record_key(entity_id: &str, ts: DateTime<Utc>, seq: usize) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{seq:04}-{}", time_prefix(entity_id, ts), &nonce[..8])
}

// ---------------------------------------------------------------------------
// RedbEntityStore
// ---------------------------------------------------------------------------

pub struct RedbEntityStore {
    db: Database,
}

impl RedbEntityStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        for table in [ENTITIES, LOGS, CHRONICLE, SNAPSHOTS] {
            wt.open_table(table).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn insert_all(&self, table: TableDefinition<&str, &[u8]>, rows: &[(String, Vec<u8>)]) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut t = wt.open_table(table).map_err(store_err)?;
            for (k, v) in rows {
                t.insert(k.as_str(), v.as_slice()).map_err(store_err)?;
            }
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    /// Values with keys in `[from, to)`, in key order.
    fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        from: &str,
        to: &str,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in t.range(from..to).map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    /// The newest `limit` values with keys in `[from, to)`, oldest first.
    fn scan_tail<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        from: &str,
        to: &str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in t.range(from..to).map_err(store_err)?.rev().take(limit) {
            let (_, v) = entry.map_err(store_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        out.reverse();
        Ok(out)
    }
}

impl EntityStore for RedbEntityStore {
    fn get(&self, id: &str) -> Result<Option<Entity>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(ENTITIES).map_err(store_err)?;
        let Some(raw) = t.get(id).map_err(store_err)?.map(|g| g.value().to_vec()) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn put(&self, entity: &Entity) -> Result<()> {
        keys::validate_id(&entity.id)?;
        keys::validate_id(&entity.realm_id)?;
        let value = serde_json::to_vec(entity)?;
        self.insert_all(ENTITIES, &[(entity.id.clone(), value)])
    }

    fn list(&self) -> Result<Vec<Entity>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(ENTITIES).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn list_active(&self) -> Result<Vec<ActiveEntity>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.active)
            .map(|e| ActiveEntity {
                in_combat: e.is_in_combat(),
                id: e.id,
                realm_id: e.realm_id,
            })
            .collect())
    }

    fn append_logs(&self, records: &[LogRecord]) -> Result<()> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| Ok((record_key(&r.entity_id, r.at, i), serde_json::to_vec(r)?)))
            .collect::<Result<Vec<_>>>()?;
        self.insert_all(LOGS, &rows)
    }

    fn logs_between(
        &self,
        entity_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>> {
        self.scan(
            LOGS,
            &time_prefix(entity_id, from),
            &time_prefix(entity_id, to),
        )
    }

    fn recent_logs(&self, entity_id: &str, limit: usize) -> Result<Vec<LogRecord>> {
        let (from, to) = entity_range(entity_id);
        self.scan_tail(LOGS, &from, &to, limit)
    }

    fn append_chronicle(&self, entries: &[ChronicleEntry]) -> Result<()> {
        let rows = entries
            .iter()
            .enumerate()
            .map(|(i, c)| Ok((record_key(&c.entity_id, c.at, i), serde_json::to_vec(c)?)))
            .collect::<Result<Vec<_>>>()?;
        self.insert_all(CHRONICLE, &rows)
    }

    fn chronicle(&self, entity_id: &str, limit: usize) -> Result<Vec<ChronicleEntry>> {
        let (from, to) = entity_range(entity_id);
        self.scan_tail(CHRONICLE, &from, &to, limit)
    }

    fn save_snapshot(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let key = time_prefix(&snapshot.entity_id, snapshot.taken_at);
        self.insert_all(SNAPSHOTS, &[(key, serde_json::to_vec(snapshot)?)])
    }

    fn snapshots(&self, entity_id: &str) -> Result<Vec<EntitySnapshot>> {
        let (from, to) = entity_range(entity_id);
        self.scan(SNAPSHOTS, &from, &to)
    }

    fn prune_snapshots(&self, entity_id: &str, keep: usize) -> Result<usize> {
        let (from, to) = entity_range(entity_id);
        let wt = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut t = wt.open_table(SNAPSHOTS).map_err(store_err)?;
            let mut keys = Vec::new();
            for entry in t.range(from.as_str()..to.as_str()).map_err(store_err)? {
                let (k, _) = entry.map_err(store_err)?;
                keys.push(k.value().to_string());
            }
            let excess = keys.len().saturating_sub(keep);
            for key in &keys[..excess] {
                t.remove(key.as_str()).map_err(store_err)?;
            }
            excess
        };
        wt.commit().map_err(store_err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbEntityStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbEntityStore::open(&dir.path().join("entities.redb")).unwrap();
        (dir, store)
    }

    fn log(entity: &str, at: DateTime<Utc>, msg: &str) -> LogRecord {
        LogRecord {
            entity_id: entity.into(),
            realm_id: "eu".into(),
            at,
            action: None,
            category: None,
            message: msg.into(),
            correlation_id: None,
        }
    }

    #[test]
    fn put_get_and_require() {
        let (_dir, store) = open_tmp();
        let hero = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        store.put(&hero).unwrap();
        assert_eq!(store.get("hero").unwrap().unwrap(), hero);
        assert!(matches!(
            store.require("ghost"),
            Err(TickError::EntityNotFound(_))
        ));
    }

    #[test]
    fn put_rejects_separator_ids() {
        let (_dir, store) = open_tmp();
        let bad = Entity::new("a/b", "eu", "Bad", "town", Utc::now());
        assert!(matches!(store.put(&bad), Err(TickError::InvalidEntityId(_))));
    }

    #[test]
    fn list_active_skips_inactive_and_flags_combat() {
        let (_dir, store) = open_tmp();
        let now = Utc::now();
        let mut fighter = Entity::new("fighter", "eu", "F", "forest", now);
        fighter.status = EntityStatus::InCombat;
        let mut sleeper = Entity::new("sleeper", "eu", "S", "town", now);
        sleeper.active = false;
        store.put(&fighter).unwrap();
        store.put(&sleeper).unwrap();
        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "fighter");
        assert!(active[0].in_combat);
    }

    #[test]
    fn logs_are_time_ordered_per_entity() {
        let (_dir, store) = open_tmp();
        let t0 = Utc::now();
        store
            .append_logs(&[
                log("hero", t0 + Duration::milliseconds(10), "second"),
                log("hero", t0, "first"),
                log("hero2", t0, "other entity"),
            ])
            .unwrap();
        let logs = store.recent_logs("hero", 10).unwrap();
        let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);

        let tail = store.recent_logs("hero", 1).unwrap();
        assert_eq!(tail[0].message, "second");

        let window = store
            .logs_between("hero", t0 + Duration::milliseconds(5), t0 + Duration::seconds(1))
            .unwrap();
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn snapshots_prune_to_newest() {
        let (_dir, store) = open_tmp();
        let hero = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .save_snapshot(&EntitySnapshot::of(&hero, t0 + Duration::minutes(i)))
                .unwrap();
        }
        assert_eq!(store.prune_snapshots("hero", 2).unwrap(), 3);
        let left = store.snapshots("hero").unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left[1].taken_at, t0 + Duration::minutes(4));
    }

    #[test]
    fn chronicle_roundtrip() {
        let (_dir, store) = open_tmp();
        let now = Utc::now();
        store
            .append_chronicle(&[ChronicleEntry {
                entity_id: "hero".into(),
                realm_id: "eu".into(),
                at: now,
                kind: "level_up".into(),
                text: "Hero reached level 2.".into(),
            }])
            .unwrap();
        let entries = store.chronicle("hero", 5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "level_up");
    }
}
