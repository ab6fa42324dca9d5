//! Tick consumer: executes one scheduled tick end to end.

use crate::notifier::Notifier;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use realmtick_core::cache::TtlCache;
use realmtick_core::clock::Clock;
use realmtick_core::config::WorkerConfig;
use realmtick_core::event::{RealtimeEvent, ENTITY_UPDATES_CHANNEL};
use realmtick_core::game_data::{GameData, GameDataSource};
use realmtick_core::job::{Job, TickJob};
use realmtick_core::keys;
use realmtick_core::kv::KvStore;
use realmtick_core::pipeline::{TickOutcome, TickPipeline};
use realmtick_core::store::EntityStore;
use realmtick_core::types::{ChronicleEntry, Entity, EntitySnapshot, LogRecord};
use realmtick_core::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed { action: Option<String> },
    /// The idempotency guard was already taken; nothing was done.
    Duplicate,
}

pub struct TickWorker {
    cfg: WorkerConfig,
    store: Arc<dyn EntityStore>,
    kv: Arc<dyn KvStore>,
    pipeline: TickPipeline,
    game_source: Arc<dyn GameDataSource>,
    game_cache: Mutex<TtlCache<(), Arc<GameData>>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TickWorker {
    pub fn new(
        cfg: WorkerConfig,
        store: Arc<dyn EntityStore>,
        kv: Arc<dyn KvStore>,
        pipeline: TickPipeline,
        game_source: Arc<dyn GameDataSource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = std::time::Duration::from_secs(cfg.game_data_ttl_secs);
        Self {
            game_cache: Mutex::new(TtlCache::new(ttl, clock.clone())),
            cfg,
            store,
            kv,
            pipeline,
            game_source,
            notifier,
            clock,
        }
    }

    pub fn pipeline(&self) -> &TickPipeline {
        &self.pipeline
    }

    /// Static game data, loaded through the source at most once per TTL.
    pub fn game_data(&self) -> Result<Arc<GameData>> {
        let mut cache = self.game_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(game) = cache.get(&()) {
            return Ok(game);
        }
        let game = Arc::new(self.game_source.load()?);
        cache.insert((), game.clone());
        Ok(game)
    }

    /// Run one tick. Once the pipeline has run, steps that already
    /// committed stay committed when a later step fails and a retry within
    /// the guard TTL is a no-op.
    pub fn process(&self, job: &TickJob) -> Result<ProcessOutcome> {
        let guard = keys::tick_key(&job.realm_id, &job.entity_id, job.tick_at);
        let guard_ttl = std::time::Duration::from_secs(self.cfg.tick_guard_ttl_secs);
        if !self.kv.set_nx(&guard, &job.correlation_id, guard_ttl)? {
            debug!(
                entity_id = %job.entity_id,
                correlation_id = %job.correlation_id,
                "duplicate tick delivery ignored"
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        // Nothing is touched until the pipeline runs; a failure before that
        // frees the guard so a retry does the work instead of a no-op.
        let loaded = self
            .store
            .require(&job.entity_id)
            .and_then(|entity| Ok((entity, self.game_data()?)));
        let (entity, game) = match loaded {
            Ok(v) => v,
            Err(e) => {
                if let Err(release) = self.kv.delete(&guard) {
                    warn!(
                        entity_id = %job.entity_id,
                        correlation_id = %job.correlation_id,
                        error = %release,
                        "failed to release tick guard; retry will be a no-op"
                    );
                }
                return Err(e);
            }
        };
        let now = self.clock.now();
        let mut rng = StdRng::seed_from_u64(job_seed(&job.job_id()));

        let TickOutcome {
            mut entity,
            decision,
            log_lines,
            chronicle,
            success,
        } = self.pipeline.run_tick(entity, &game, now, &mut rng)?;

        entity.last_processed_at = Some(now);
        self.store.put(&entity)?;

        let hot = serde_json::to_string(&entity)?;
        let hot_ttl = std::time::Duration::from_secs(self.cfg.hot_cache_ttl_secs);
        self.kv
            .set(&keys::hot_cache_key(&entity.id), &hot, Some(hot_ttl))?;

        let action = decision.as_ref().map(|d| d.action_id.clone());
        let category = decision.as_ref().map(|d| d.category);
        let stagger = Duration::milliseconds(self.cfg.log_stagger_ms);
        let records: Vec<LogRecord> = log_lines
            .into_iter()
            .enumerate()
            .map(|(i, message)| LogRecord {
                entity_id: entity.id.clone(),
                realm_id: entity.realm_id.clone(),
                at: now + stagger * i as i32,
                action: action.clone(),
                category,
                message,
                correlation_id: Some(job.correlation_id.clone()),
            })
            .collect();
        self.store.append_logs(&records)?;

        if !chronicle.is_empty() {
            let entries: Vec<ChronicleEntry> = chronicle
                .into_iter()
                .map(|note| ChronicleEntry {
                    entity_id: entity.id.clone(),
                    realm_id: entity.realm_id.clone(),
                    at: now,
                    kind: note.kind,
                    text: note.text,
                })
                .collect();
            self.store.append_chronicle(&entries)?;
        }

        let event =
            RealtimeEvent::for_entity(&entity, job.tick_at, Some(job.correlation_id.clone()));
        self.notifier.publish(ENTITY_UPDATES_CHANNEL, &event)?;

        self.maybe_snapshot(&entity, now)?;

        info!(
            entity_id = %entity.id,
            realm_id = %entity.realm_id,
            correlation_id = %job.correlation_id,
            action = action.as_deref().unwrap_or("-"),
            success,
            "tick processed"
        );
        Ok(ProcessOutcome::Processed { action })
    }

    fn maybe_snapshot(&self, entity: &Entity, now: DateTime<Utc>) -> Result<()> {
        let lock = keys::snapshot_lock_key(&entity.realm_id, &entity.id);
        let ttl = std::time::Duration::from_secs(self.cfg.snapshot_lock_secs);
        if !self.kv.set_nx(&lock, "1", ttl)? {
            return Ok(());
        }
        self.store.save_snapshot(&EntitySnapshot::of(entity, now))?;
        let pruned = self
            .store
            .prune_snapshots(&entity.id, self.cfg.snapshot_retention)?;
        debug!(entity_id = %entity.id, pruned, "snapshot saved");
        Ok(())
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Per-job seed so a replayed job makes the same random choices. FNV-1a
/// over the id bytes, fixed across builds and toolchains.
fn job_seed(job_id: &str) -> u64 {
    job_id.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
