//! Key-value store used for every coordination key (leases, guards, locks)
//! and for the per-entity fatigue, learning and modifier records.
//!
//! Coordination keys are only ever taken through [`KvStore::set_nx`], an
//! atomic set-if-absent with TTL. There is no read-then-write acquisition
//! path. Renewal of a held lease goes through [`KvStore::renew_if_eq`],
//! which is atomic in the same way.
//!
//! [`MemoryKv`] is the in-process backend. Deployments that run producers
//! and workers in separate processes put a shared backend behind the same
//! trait.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TickError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub trait KvStore: Send + Sync {
    /// Set `key` to `value` only if it is absent (or expired).
    /// Returns `true` when this call created the key.
    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Unconditionally set `key`. `ttl = None` keeps the key until deleted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key`. Returns `true` if a live key was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Reset the TTL of `key` only if it currently holds `expected`.
    fn renew_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `expected`.
    fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool>;

    /// Atomic read-modify-write. `f` sees the live value (if any) and
    /// returns the replacement; `None` deletes the key. The stored value has
    /// no TTL. Nothing is written when `f` fails.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryKv
// ---------------------------------------------------------------------------

struct Slot {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t > now).unwrap_or(true)
    }
}

/// Expired slots are swept on a write at most this often.
const SWEEP_EVERY_SECS: i64 = 30;

struct Slots {
    map: HashMap<String, Slot>,
    next_sweep: DateTime<Utc>,
}

impl Slots {
    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.map.len();
        self.map.retain(|_, slot| slot.live(now));
        self.next_sweep = now + chrono::Duration::seconds(SWEEP_EVERY_SECS);
        before - self.map.len()
    }

    fn sweep_if_due(&mut self, now: DateTime<Utc>) {
        if now >= self.next_sweep {
            self.purge(now);
        }
    }
}

/// In-process [`KvStore`] driven by an injected [`Clock`]. Reads treat
/// expired keys as absent; writes sweep them out periodically.
pub struct MemoryKv {
    slots: Mutex<Slots>,
    clock: Arc<dyn Clock>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let next_sweep = clock.now() + chrono::Duration::seconds(SWEEP_EVERY_SECS);
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_sweep,
            }),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots>> {
        self.slots
            .lock()
            .map_err(|e| TickError::Store(format!("lock poisoned: {e}")))
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| TickError::Store(e.to_string()))?;
        Ok(now + ttl)
    }

    /// Drop every expired key now. Returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self.lock()?.purge(now))
    }

    /// Keys held in memory, expired or not.
    pub fn stored_len(&self) -> Result<usize> {
        Ok(self.lock()?.map.len())
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKv {
    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = self.expiry(now, ttl)?;
        let mut slots = self.lock()?;
        slots.sweep_if_due(now);
        if slots.map.get(key).is_some_and(|slot| slot.live(now)) {
            return Ok(false);
        }
        slots.map.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(true)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now();
        let expires_at = ttl.map(|t| self.expiry(now, t)).transpose()?;
        let mut slots = self.lock()?;
        slots.sweep_if_due(now);
        slots.map.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let slots = self.lock()?;
        Ok(slots
            .map
            .get(key)
            .filter(|slot| slot.live(now))
            .map(|slot| slot.value.clone()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .lock()?
            .map
            .remove(key)
            .is_some_and(|slot| slot.live(now)))
    }

    fn renew_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = self.expiry(now, ttl)?;
        let mut slots = self.lock()?;
        match slots.map.get_mut(key) {
            Some(slot) if slot.live(now) && slot.value == expected => {
                slot.expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut slots = self.lock()?;
        let owned = slots
            .map
            .get(key)
            .is_some_and(|slot| slot.live(now) && slot.value == expected);
        if owned {
            slots.map.remove(key);
        }
        Ok(owned)
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut slots = self.lock()?;
        slots.sweep_if_due(now);
        let current = slots
            .map
            .get(key)
            .filter(|slot| slot.live(now))
            .map(|slot| slot.value.as_str());
        match f(current)? {
            Some(value) => {
                slots.map.insert(
                    key.to_string(),
                    Slot {
                        value,
                        expires_at: None,
                    },
                );
            }
            None => {
                slots.map.remove(key);
            }
        }
        Ok(())
    }
}

/// Read a JSON value stored under `key`, or `T::default()` when absent.
pub fn get_json<T>(kv: &dyn KvStore, key: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match kv.get(key)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(T::default()),
    }
}

/// Atomically apply `f` to the JSON value under `key` (starting from
/// `T::default()` when absent). The key is deleted when `keep` rejects the
/// result.
pub fn update_json<T, R>(
    kv: &dyn KvStore,
    key: &str,
    keep: impl Fn(&T) -> bool,
    f: impl FnOnce(&mut T) -> R,
) -> Result<R>
where
    T: serde::de::DeserializeOwned + serde::Serialize + Default,
{
    let mut f = Some(f);
    let mut out = None;
    kv.update(key, &mut |current| {
        let mut value: T = match current {
            Some(raw) => serde_json::from_str(raw)?,
            None => T::default(),
        };
        let f = f
            .take()
            .ok_or_else(|| TickError::Store(format!("update of '{key}' applied twice")))?;
        out = Some(f(&mut value));
        if !keep(&value) {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&value)?))
    })?;
    out.ok_or_else(|| TickError::Store(format!("update of '{key}' did not run")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn kv_at_now() -> (ManualClock, MemoryKv) {
        let clock = ManualClock::new(Utc::now());
        let kv = MemoryKv::with_clock(Arc::new(clock.clone()));
        (clock, kv)
    }

    #[test]
    fn set_nx_only_first_caller_wins() {
        let (_clock, kv) = kv_at_now();
        assert!(kv.set_nx("guard:a:1", "x", Duration::from_secs(5)).unwrap());
        assert!(!kv.set_nx("guard:a:1", "y", Duration::from_secs(5)).unwrap());
        assert_eq!(kv.get("guard:a:1").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn set_nx_succeeds_after_expiry() {
        let (clock, kv) = kv_at_now();
        assert!(kv.set_nx("k", "a", Duration::from_secs(2)).unwrap());
        clock.advance(chrono::Duration::seconds(3));
        assert!(kv.get("k").unwrap().is_none());
        assert!(kv.set_nx("k", "b", Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn renew_requires_matching_value() {
        let (clock, kv) = kv_at_now();
        kv.set_nx("leader:key", "node-a", Duration::from_secs(5)).unwrap();
        assert!(!kv.renew_if_eq("leader:key", "node-b", Duration::from_secs(5)).unwrap());
        clock.advance(chrono::Duration::seconds(4));
        assert!(kv.renew_if_eq("leader:key", "node-a", Duration::from_secs(5)).unwrap());
        clock.advance(chrono::Duration::seconds(4));
        assert_eq!(kv.get("leader:key").unwrap().as_deref(), Some("node-a"));
    }

    #[test]
    fn delete_if_eq_leaves_foreign_value() {
        let (_clock, kv) = kv_at_now();
        kv.set("k", "mine", None).unwrap();
        assert!(!kv.delete_if_eq("k", "theirs").unwrap());
        assert!(kv.delete_if_eq("k", "mine").unwrap());
        assert!(kv.get("k").unwrap().is_none());
    }

    #[test]
    fn purge_expired_drops_only_dead_keys() {
        let (clock, kv) = kv_at_now();
        kv.set("short", "1", Some(Duration::from_secs(1))).unwrap();
        kv.set("forever", "2", None).unwrap();
        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(kv.purge_expired().unwrap(), 1);
        assert_eq!(kv.get("forever").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn writes_reclaim_expired_guards() {
        let (clock, kv) = kv_at_now();
        for n in 0..1_000 {
            kv.set_nx(&format!("tick:eu:hero:{n}"), "1", Duration::from_secs(60))
                .unwrap();
            kv.set_nx(&format!("guard:eu:hero:{n}"), "1", Duration::from_secs(5))
                .unwrap();
        }
        kv.set("fatigue:hero", "{}", None).unwrap();
        assert_eq!(kv.stored_len().unwrap(), 2_001);

        clock.advance(chrono::Duration::hours(1));
        kv.set_nx("tick:eu:hero:next", "1", Duration::from_secs(60))
            .unwrap();
        assert_eq!(kv.stored_len().unwrap(), 2);
        assert!(kv.get("fatigue:hero").unwrap().is_some());
    }

    #[test]
    fn update_reads_and_replaces_under_one_lock() {
        let (_clock, kv) = kv_at_now();
        kv.update("n", &mut |cur| {
            assert!(cur.is_none());
            Ok(Some("1".into()))
        })
        .unwrap();
        kv.update("n", &mut |cur| {
            let n: u32 = cur.unwrap_or("0").parse().unwrap();
            Ok(Some((n + 1).to_string()))
        })
        .unwrap();
        assert_eq!(kv.get("n").unwrap().as_deref(), Some("2"));

        kv.update("n", &mut |_| Ok(None)).unwrap();
        assert!(kv.get("n").unwrap().is_none());
    }

    #[test]
    fn failed_update_leaves_value_alone() {
        let (_clock, kv) = kv_at_now();
        kv.set("n", "1", None).unwrap();
        let err = kv.update("n", &mut |_| Err(TickError::Store("nope".into())));
        assert!(err.is_err());
        assert_eq!(kv.get("n").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn concurrent_json_updates_are_not_lost() {
        let kv = Arc::new(MemoryKv::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let kv = kv.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        update_json(kv.as_ref(), "count", |_: &u64| true, |n: &mut u64| *n += 1)
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let total: u64 = get_json(kv.as_ref(), "count").unwrap();
        assert_eq!(total, 800);
    }
}
