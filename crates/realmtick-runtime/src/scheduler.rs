//! Producer loop: tracks each active entity's next tick and dispatches tick
//! jobs when they come due.
//!
//! Only the lease holder (see [`LeaderElector`]) does any work. Per entity,
//! a `guard:{entityId}:{bucket}` key taken with set-if-absent suppresses a
//! second dispatch for the same time bucket from an overlapping iteration
//! or a racing producer.

use crate::leader::LeaderElector;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use realmtick_core::clock::Clock;
use realmtick_core::config::{IntervalBounds, SchedulerConfig};
use realmtick_core::fatigue::FatigueStore;
use realmtick_core::job::{DigestJob, TickJob};
use realmtick_core::keys;
use realmtick_core::kv::KvStore;
use realmtick_core::queue::JobQueue;
use realmtick_core::store::EntityStore;
use realmtick_core::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where due ticks go: the durable queue, or straight into a worker in
/// inline mode.
pub trait TickDispatch: Send + Sync {
    /// `false` when the tick was not newly dispatched (already queued, or
    /// handled as a no-op).
    fn dispatch(&self, job: &TickJob) -> Result<bool>;
}

impl TickDispatch for JobQueue {
    fn dispatch(&self, job: &TickJob) -> Result<bool> {
        self.enqueue(job)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityTickTracker {
    pub realm_id: String,
    pub next_tick_at: DateTime<Utc>,
    pub in_combat: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollReport {
    /// Another instance holds the lease.
    Standby,
    Leading { dispatched: usize },
}

pub struct TickScheduler {
    cfg: SchedulerConfig,
    store: Arc<dyn EntityStore>,
    kv: Arc<dyn KvStore>,
    dispatch: Arc<dyn TickDispatch>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    trackers: HashMap<String, EntityTickTracker>,
    fatigue_decay: Option<(FatigueStore, f64)>,
    last_decay_at: Option<DateTime<Utc>>,
    digests: Option<JobQueue>,
    last_digest_end: HashMap<String, i64>,
}

impl TickScheduler {
    pub fn new(
        cfg: SchedulerConfig,
        store: Arc<dyn EntityStore>,
        kv: Arc<dyn KvStore>,
        dispatch: Arc<dyn TickDispatch>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cfg,
            store,
            kv,
            dispatch,
            clock,
            rng: StdRng::from_entropy(),
            trackers: HashMap::new(),
            fatigue_decay: None,
            last_decay_at: None,
            digests: None,
            last_digest_end: HashMap::new(),
        }
    }

    /// Fixed seed for reproducible intervals.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Decay every tracked entity's fatigue by `rate` on the configured
    /// cadence.
    pub fn with_fatigue_decay(mut self, rate: f64) -> Self {
        self.fatigue_decay = Some((FatigueStore::new(self.kv.clone()), rate));
        self
    }

    /// Enqueue one digest job per tracked realm per digest period.
    pub fn with_digests(mut self, queue: JobQueue) -> Self {
        self.digests = Some(queue);
        self
    }

    pub fn trackers(&self) -> &HashMap<String, EntityTickTracker> {
        &self.trackers
    }

    fn random_delay(&mut self, in_combat: bool) -> Duration {
        let bounds: IntervalBounds = if in_combat {
            self.cfg.combat_interval
        } else {
            self.cfg.idle_interval
        };
        let (lo, hi) = bounds.ordered();
        let ms = self.rng.gen_range(lo..=hi);
        Duration::milliseconds(ms as i64)
    }

    /// Reconcile trackers with the store's active list.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let active = self.store.list_active()?;
        let now = self.clock.now();
        let (_, combat_max) = self.cfg.combat_interval.ordered();
        let combat_max = Duration::milliseconds(combat_max as i64);
        let mut report = SyncReport::default();
        let mut seen = HashSet::with_capacity(active.len());

        for entity in active {
            seen.insert(entity.id.clone());
            match self.trackers.get(&entity.id).cloned() {
                None => {
                    let delay = self.random_delay(entity.in_combat);
                    self.trackers.insert(
                        entity.id,
                        EntityTickTracker {
                            realm_id: entity.realm_id,
                            next_tick_at: now + delay,
                            in_combat: entity.in_combat,
                        },
                    );
                    report.added += 1;
                }
                Some(existing) => {
                    let mut tracker = existing;
                    // Entering combat must not wait out a long idle interval.
                    if entity.in_combat && !tracker.in_combat && tracker.next_tick_at > now + combat_max {
                        tracker.next_tick_at = now + self.random_delay(true);
                        debug!(entity_id = %entity.id, next_tick_at = %tracker.next_tick_at, "combat pulled tick in");
                    }
                    tracker.in_combat = entity.in_combat;
                    tracker.realm_id = entity.realm_id;
                    self.trackers.insert(entity.id, tracker);
                }
            }
        }

        let before = self.trackers.len();
        self.trackers.retain(|id, _| seen.contains(id));
        report.removed = before - self.trackers.len();
        Ok(report)
    }

    /// Dispatch every due tracker and advance it. Returns how many ticks
    /// were newly dispatched.
    pub fn dispatch_due(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let mut due: Vec<String> = self
            .trackers
            .iter()
            .filter(|(_, t)| t.next_tick_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        due.sort();

        let bucket_ms = self.cfg.guard_bucket_ms.max(1) as i64;
        let slack = Duration::milliseconds(self.cfg.guard_slack_ms as i64);
        let mut dispatched = 0;

        for entity_id in due {
            let Some(tracker) = self.trackers.get(&entity_id).cloned() else {
                continue;
            };
            let delay = self.random_delay(tracker.in_combat);
            let tick_at = tracker.next_tick_at;
            let guard = keys::guard_key(&entity_id, tick_at.timestamp_millis() / bucket_ms);
            let guard_ttl = (delay + slack).to_std().unwrap_or_default();

            if self.kv.set_nx(&guard, "1", guard_ttl)? {
                let job = TickJob::new(&tracker.realm_id, &entity_id, tick_at);
                match self.dispatch.dispatch(&job) {
                    Ok(true) => {
                        dispatched += 1;
                        debug!(
                            entity_id = %entity_id,
                            realm_id = %tracker.realm_id,
                            correlation_id = %job.correlation_id,
                            tick_at = job.tick_at,
                            "tick dispatched"
                        );
                    }
                    Ok(false) => debug!(entity_id = %entity_id, "tick already dispatched"),
                    Err(e) => {
                        // Release the guard so the next iteration can retry.
                        if let Err(release) = self.kv.delete(&guard) {
                            warn!(
                                entity_id = %entity_id,
                                error = %release,
                                "failed to release dispatch guard; bucket skipped"
                            );
                        }
                        return Err(e);
                    }
                }
            } else {
                debug!(entity_id = %entity_id, "guard held, skipping dispatch");
            }

            if let Some(t) = self.trackers.get_mut(&entity_id) {
                t.next_tick_at = now + delay;
            }
        }
        Ok(dispatched)
    }

    /// Fatigue decay and digest enqueueing, each on its own cadence.
    pub fn maintain(&mut self) -> Result<()> {
        let now = self.clock.now();

        if let Some((fatigue, rate)) = &self.fatigue_decay {
            let interval = Duration::seconds(self.cfg.fatigue_decay_interval_secs as i64);
            let due = self.last_decay_at.map_or(true, |t| now - t >= interval);
            if due {
                let mut removed = 0;
                for entity_id in self.trackers.keys() {
                    removed += fatigue.decay(entity_id, *rate)?;
                }
                self.last_decay_at = Some(now);
                debug!(entities = self.trackers.len(), removed, "fatigue decayed");
            }
        }

        if let Some(queue) = &self.digests {
            let period = (self.cfg.digest_period_secs.max(1) * 1000) as i64;
            let period_end = now.timestamp_millis().div_euclid(period) * period;
            let realms: BTreeMap<&str, ()> = self
                .trackers
                .values()
                .map(|t| (t.realm_id.as_str(), ()))
                .collect();
            for realm_id in realms.keys() {
                if self.last_digest_end.get(*realm_id) == Some(&period_end) {
                    continue;
                }
                let job = DigestJob {
                    realm_id: realm_id.to_string(),
                    period_start: period_end - period,
                    period_end,
                };
                if queue.enqueue(&job)? {
                    info!(realm_id = %realm_id, period_end, "digest enqueued");
                }
                self.last_digest_end.insert(realm_id.to_string(), period_end);
            }
        }
        Ok(())
    }

    /// One loop iteration: renew leadership, then sync, dispatch and
    /// maintain if leading.
    pub fn poll_once(&mut self, leader: &LeaderElector) -> Result<PollReport> {
        if !leader.try_acquire()? {
            // A future lease starts from fresh intervals.
            self.trackers.clear();
            return Ok(PollReport::Standby);
        }
        let sync = self.sync()?;
        if sync.added > 0 || sync.removed > 0 {
            info!(added = sync.added, removed = sync.removed, tracked = self.trackers.len(), "trackers synced");
        }
        let dispatched = self.dispatch_due()?;
        self.maintain()?;
        Ok(PollReport::Leading { dispatched })
    }

    /// Poll until `shutdown` flips. Failed iterations are logged and
    /// followed by the longer error backoff; they never end the loop.
    ///
    /// Each iteration does blocking store work (and in inline mode whole
    /// ticks), so it runs on the blocking pool with the scheduler moved in
    /// and handed back.
    pub async fn run(self, leader: LeaderElector, mut shutdown: watch::Receiver<bool>) {
        info!(instance_id = %leader.instance_id(), "scheduler started");
        let poll = self.cfg.poll_interval();
        let backoff = std::time::Duration::from_millis(self.cfg.error_backoff_ms);
        let leader = Arc::new(leader);
        let mut scheduler = self;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let elector = leader.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let report = scheduler.poll_once(&elector);
                (scheduler, report)
            })
            .await;
            let report = match joined {
                Ok((back, report)) => {
                    scheduler = back;
                    report
                }
                Err(e) => {
                    error!(error = %e, "scheduler iteration panicked, stopping");
                    break;
                }
            };
            let pause = match report {
                Ok(_) => poll,
                Err(e) => {
                    warn!(error = %e, "scheduler iteration failed, backing off");
                    backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }
        if let Err(e) = leader.resign() {
            warn!(error = %e, "failed to release leadership");
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmtick_core::clock::ManualClock;
    use realmtick_core::kv::MemoryKv;
    use realmtick_core::store::RedbEntityStore;
    use realmtick_core::types::{Entity, EntityStatus};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        jobs: Mutex<Vec<TickJob>>,
    }

    impl TickDispatch for Recorder {
        fn dispatch(&self, job: &TickJob) -> Result<bool> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(true)
        }
    }

    struct Fixture {
        _dir: TempDir,
        clock: ManualClock,
        store: Arc<RedbEntityStore>,
        kv: Arc<dyn KvStore>,
        recorder: Arc<Recorder>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let clock = ManualClock::new(Utc::now());
            let store = Arc::new(RedbEntityStore::open(&dir.path().join("e.redb")).unwrap());
            let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::with_clock(Arc::new(clock.clone())));
            Self {
                _dir: dir,
                clock,
                store,
                kv,
                recorder: Arc::new(Recorder::default()),
            }
        }

        fn scheduler(&self) -> TickScheduler {
            TickScheduler::new(
                SchedulerConfig::default(),
                self.store.clone(),
                self.kv.clone(),
                self.recorder.clone(),
                Arc::new(self.clock.clone()),
            )
            .with_seed(7)
        }

        fn put(&self, id: &str, status: EntityStatus) {
            let mut e = Entity::new(id, "eu", id, "town", self.clock.now());
            e.status = status;
            self.store.put(&e).unwrap();
        }
    }

    #[test]
    fn sync_tracks_active_entities_with_initial_interval() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        f.put("b", EntityStatus::InCombat);
        let mut s = f.scheduler();
        let report = s.sync().unwrap();
        assert_eq!(report.added, 2);

        let now = f.clock.now();
        let a = &s.trackers()["a"];
        assert!(a.next_tick_at >= now + Duration::seconds(5));
        assert!(a.next_tick_at <= now + Duration::seconds(40));
        let b = &s.trackers()["b"];
        assert!(b.in_combat);
        assert!(b.next_tick_at <= now + Duration::seconds(5));
    }

    #[test]
    fn inactive_entities_are_dropped() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let mut s = f.scheduler();
        s.sync().unwrap();

        let mut a = f.store.get("a").unwrap().unwrap();
        a.active = false;
        f.store.put(&a).unwrap();
        let report = s.sync().unwrap();
        assert_eq!(report.removed, 1);
        assert!(s.trackers().is_empty());
    }

    #[test]
    fn due_tracker_dispatches_once_and_advances() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let mut s = f.scheduler();
        s.sync().unwrap();
        assert_eq!(s.dispatch_due().unwrap(), 0, "nothing due yet");

        let due_at = s.trackers()["a"].next_tick_at;
        f.clock.set(due_at);
        assert_eq!(s.dispatch_due().unwrap(), 1);
        let jobs = f.recorder.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].tick_at, due_at.timestamp_millis());
        assert!(s.trackers()["a"].next_tick_at > due_at);
        assert_eq!(s.dispatch_due().unwrap(), 0);
    }

    #[test]
    fn racing_producer_is_suppressed_by_guard() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let mut first = f.scheduler();
        let mut second = f.scheduler();
        first.sync().unwrap();
        second.sync().unwrap();
        // Same seed, same intervals: both trackers fall due at the same instant.
        let due_at = first.trackers()["a"].next_tick_at;
        assert_eq!(second.trackers()["a"].next_tick_at, due_at);

        f.clock.set(due_at);
        assert_eq!(first.dispatch_due().unwrap(), 1);
        assert_eq!(second.dispatch_due().unwrap(), 0);
        assert_eq!(f.recorder.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn entering_combat_pulls_the_next_tick_in() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let mut s = f.scheduler();
        s.sync().unwrap();
        let now = f.clock.now();
        s.trackers.get_mut("a").unwrap().next_tick_at = now + Duration::seconds(40);

        f.put("a", EntityStatus::InCombat);
        s.sync().unwrap();
        let t = &s.trackers()["a"];
        assert!(t.in_combat);
        assert!(t.next_tick_at <= now + Duration::seconds(5));
    }

    #[test]
    fn standby_instance_does_nothing() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let ttl = std::time::Duration::from_secs(5);
        let holder = LeaderElector::with_instance_id(f.kv.clone(), ttl, "holder".into());
        let other = LeaderElector::with_instance_id(f.kv.clone(), ttl, "other".into());
        assert!(holder.try_acquire().unwrap());

        let mut s = f.scheduler();
        assert_eq!(s.poll_once(&other).unwrap(), PollReport::Standby);
        assert!(s.trackers().is_empty());
        assert!(matches!(s.poll_once(&holder).unwrap(), PollReport::Leading { .. }));
        assert_eq!(s.trackers().len(), 1);
    }

    #[test]
    fn maintenance_decays_fatigue_on_cadence() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let fatigue = FatigueStore::new(f.kv.clone());
        let cfg = realmtick_core::config::FatigueConfig::default();
        for _ in 0..10 {
            fatigue.record_use("a", "explore", &cfg, f.clock.now()).unwrap();
        }
        let mut s = f.scheduler().with_fatigue_decay(0.15);
        s.sync().unwrap();

        s.maintain().unwrap();
        assert_eq!(fatigue.load("a").unwrap().count("explore"), 9);
        s.maintain().unwrap();
        assert_eq!(fatigue.load("a").unwrap().count("explore"), 9, "not due again yet");
        f.clock.advance(Duration::seconds(60));
        s.maintain().unwrap();
        assert_eq!(fatigue.load("a").unwrap().count("explore"), 8);
    }

    #[derive(Default)]
    struct Switch {
        failing: std::sync::atomic::AtomicBool,
        sent: Mutex<Vec<TickJob>>,
    }

    impl TickDispatch for Switch {
        fn dispatch(&self, job: &TickJob) -> Result<bool> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(realmtick_core::TickError::Queue("disk full".into()));
            }
            self.sent.lock().unwrap().push(job.clone());
            Ok(true)
        }
    }

    #[test]
    fn failed_dispatch_releases_the_guard_for_the_next_poll() {
        let f = Fixture::new();
        f.put("a", EntityStatus::Idle);
        let switch = Arc::new(Switch::default());
        switch.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut s = TickScheduler::new(
            SchedulerConfig::default(),
            f.store.clone(),
            f.kv.clone(),
            switch.clone(),
            Arc::new(f.clock.clone()),
        )
        .with_seed(7);
        s.sync().unwrap();
        let due_at = s.trackers()["a"].next_tick_at;
        f.clock.set(due_at);

        assert!(s.dispatch_due().is_err());
        assert_eq!(s.trackers()["a"].next_tick_at, due_at, "tracker not advanced");

        switch.failing.store(false, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(s.dispatch_due().unwrap(), 1);
        assert_eq!(switch.sent.lock().unwrap()[0].tick_at, due_at.timestamp_millis());
    }

    #[tokio::test]
    async fn run_loop_dispatches_and_resigns_on_shutdown() {
        let f = Fixture::new();
        f.put("a", EntityStatus::InCombat);
        let cfg = SchedulerConfig {
            poll_interval_ms: 5,
            ..SchedulerConfig::default()
        };
        let s = TickScheduler::new(
            cfg,
            f.store.clone(),
            f.kv.clone(),
            f.recorder.clone(),
            Arc::new(f.clock.clone()),
        )
        .with_seed(7);
        let leader = LeaderElector::with_instance_id(
            f.kv.clone(),
            std::time::Duration::from_secs(60),
            "solo".into(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(s.run(leader, rx));

        for _ in 0..400 {
            if !f.recorder.jobs.lock().unwrap().is_empty() {
                break;
            }
            f.clock.advance(Duration::seconds(1));
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!f.recorder.jobs.lock().unwrap().is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
        let relaunched = LeaderElector::with_instance_id(
            f.kv.clone(),
            std::time::Duration::from_secs(60),
            "next".into(),
        );
        assert!(relaunched.try_acquire().unwrap(), "lease released on shutdown");
    }
}
