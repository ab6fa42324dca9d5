use realmtick_core::keys::LEADER_KEY;
use realmtick_core::kv::KvStore;
use realmtick_core::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Producer election over a single lease key.
///
/// Whoever sets `leader:key` first holds the lease; the holder renews it
/// with a compare-and-expire each iteration. A crashed holder stops
/// renewing and the lease lapses within one TTL.
pub struct LeaderElector {
    kv: Arc<dyn KvStore>,
    instance_id: String,
    ttl: Duration,
    leading: AtomicBool,
}

impl LeaderElector {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self::with_instance_id(kv, ttl, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_instance_id(kv: Arc<dyn KvStore>, ttl: Duration, instance_id: String) -> Self {
        Self {
            kv,
            instance_id,
            ttl,
            leading: AtomicBool::new(false),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_leading(&self) -> bool {
        self.leading.load(Ordering::Relaxed)
    }

    /// Acquire or renew the lease. `false` means another instance holds it.
    pub fn try_acquire(&self) -> Result<bool> {
        let held = self.kv.set_nx(LEADER_KEY, &self.instance_id, self.ttl)?
            || self.kv.renew_if_eq(LEADER_KEY, &self.instance_id, self.ttl)?;
        let was = self.leading.swap(held, Ordering::Relaxed);
        if held && !was {
            info!(instance_id = %self.instance_id, "acquired scheduler leadership");
        } else if !held && was {
            info!(instance_id = %self.instance_id, "lost scheduler leadership");
        }
        Ok(held)
    }

    /// Release the lease if this instance still holds it.
    pub fn resign(&self) -> Result<bool> {
        self.leading.store(false, Ordering::Relaxed);
        self.kv.delete_if_eq(LEADER_KEY, &self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use realmtick_core::clock::ManualClock;
    use realmtick_core::kv::MemoryKv;

    fn pair() -> (ManualClock, LeaderElector, LeaderElector) {
        let clock = ManualClock::new(Utc::now());
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::with_clock(Arc::new(clock.clone())));
        let ttl = Duration::from_secs(5);
        let a = LeaderElector::with_instance_id(kv.clone(), ttl, "a".into());
        let b = LeaderElector::with_instance_id(kv, ttl, "b".into());
        (clock, a, b)
    }

    #[test]
    fn only_one_instance_leads() {
        let (_clock, a, b) = pair();
        assert!(a.try_acquire().unwrap());
        assert!(!b.try_acquire().unwrap());
        assert!(a.try_acquire().unwrap(), "holder renews");
        assert!(a.is_leading());
        assert!(!b.is_leading());
    }

    #[test]
    fn lease_moves_after_holder_stops_renewing() {
        let (clock, a, b) = pair();
        assert!(a.try_acquire().unwrap());
        clock.advance(chrono::Duration::seconds(4));
        assert!(!b.try_acquire().unwrap());
        clock.advance(chrono::Duration::seconds(2));
        assert!(b.try_acquire().unwrap());
        assert!(!a.try_acquire().unwrap());
    }

    #[test]
    fn resign_hands_over_immediately() {
        let (_clock, a, b) = pair();
        assert!(a.try_acquire().unwrap());
        assert!(a.resign().unwrap());
        assert!(b.try_acquire().unwrap());
        assert!(!a.resign().unwrap(), "foreign lease is left alone");
    }
}
