//! Long-running side of realmtick: the elected scheduler, the tick and
//! digest workers, the worker pool that feeds them from the queue, and the
//! inline fallback that fuses scheduler and worker into one loop.

pub mod digest;
pub mod inline;
pub mod leader;
pub mod notifier;
pub mod pool;
pub mod scheduler;
pub mod worker;

use anyhow::Context;
use digest::DigestWorker;
use inline::InlineDispatch;
use leader::LeaderElector;
use notifier::BroadcastNotifier;
use pool::WorkerPool;
use realmtick_core::actions::default_catalog;
use realmtick_core::clock::{Clock, SystemClock};
use realmtick_core::config::{Config, QueueConfig};
use realmtick_core::engine::DecisionEngine;
use realmtick_core::game_data::{BuiltinGameData, GameDataSource, YamlGameData};
use realmtick_core::job::{DigestJob, Job, TickJob};
use realmtick_core::kv::{KvStore, MemoryKv};
use realmtick_core::paths;
use realmtick_core::pipeline::TickPipeline;
use realmtick_core::profile::ProfileRegistry;
use realmtick_core::queue::{JobQueue, QueueDb, RetryPolicy};
use realmtick_core::store::{EntityStore, RedbEntityStore};
use scheduler::TickScheduler;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use worker::TickWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Scheduler and worker pool, connected through the queue.
    All,
    Scheduler,
    Worker,
    /// Scheduler and worker fused; no queue.
    Inline,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(RunMode::All),
            "scheduler" => Ok(RunMode::Scheduler),
            "worker" => Ok(RunMode::Worker),
            "inline" => Ok(RunMode::Inline),
            other => Err(format!(
                "unknown mode '{other}' (expected all, scheduler, worker or inline)"
            )),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::All => "all",
            RunMode::Scheduler => "scheduler",
            RunMode::Worker => "worker",
            RunMode::Inline => "inline",
        })
    }
}

/// The two named queues.
#[derive(Clone)]
pub struct Queues {
    pub ticks: JobQueue,
    pub digests: JobQueue,
}

pub fn open_queues(
    root: &Path,
    cfg: &QueueConfig,
    clock: Arc<dyn Clock>,
) -> realmtick_core::Result<Queues> {
    let db = QueueDb::open(&paths::queue_db_path(root))?;
    let policy = RetryPolicy::from(cfg);
    Ok(Queues {
        ticks: db.queue(TickJob::QUEUE, policy.clone(), clock.clone())?,
        digests: db.queue(DigestJob::QUEUE, policy, clock)?,
    })
}

/// Stores, engine and notifier for one project root.
pub struct Runtime {
    root: PathBuf,
    config: Config,
    clock: Arc<dyn Clock>,
    kv: Arc<dyn KvStore>,
    store: Arc<dyn EntityStore>,
    engine: Arc<DecisionEngine>,
    game_source: Arc<dyn GameDataSource>,
    notifier: BroadcastNotifier,
}

impl Runtime {
    pub fn open(root: &Path, config: Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let db_path = paths::entity_db_path(root);
        let store = RedbEntityStore::open(&db_path)
            .with_context(|| format!("failed to open entity store {}", db_path.display()))?;
        let catalog = default_catalog().context("invalid built-in action catalog")?;
        let engine = DecisionEngine::new(
            Arc::new(catalog),
            ProfileRegistry::builtin(),
            config.decision.clone(),
            config.fatigue.clone(),
            clock.clone(),
        );
        let game_source: Arc<dyn GameDataSource> = match &config.worker.game_data {
            Some(path) => Arc::new(YamlGameData {
                path: paths::resolve(root, path),
            }),
            None => Arc::new(BuiltinGameData),
        };
        Ok(Self {
            root: root.to_path_buf(),
            kv: Arc::new(MemoryKv::with_clock(clock.clone())),
            store: Arc::new(store),
            engine: Arc::new(engine),
            game_source,
            notifier: BroadcastNotifier::default(),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        self.store.clone()
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    pub fn game_source(&self) -> Arc<dyn GameDataSource> {
        self.game_source.clone()
    }

    pub fn pipeline(&self) -> TickPipeline {
        TickPipeline::new(self.engine.clone(), self.kv.clone())
    }

    pub fn tick_worker(&self) -> Arc<TickWorker> {
        Arc::new(TickWorker::new(
            self.config.worker.clone(),
            self.store.clone(),
            self.kv.clone(),
            self.pipeline(),
            self.game_source.clone(),
            Arc::new(self.notifier.clone()),
            self.clock.clone(),
        ))
    }

    fn scheduler(&self, dispatch: Arc<dyn scheduler::TickDispatch>) -> TickScheduler {
        TickScheduler::new(
            self.config.scheduler.clone(),
            self.store.clone(),
            self.kv.clone(),
            dispatch,
            self.clock.clone(),
        )
        .with_fatigue_decay(self.config.fatigue.decay_rate)
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// In `All` mode a queue that cannot be opened degrades to inline mode;
    /// `Scheduler` and `Worker` need the queue and fail instead.
    pub async fn run(self, mode: RunMode, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let queues = match mode {
            RunMode::Inline => None,
            _ => match open_queues(&self.root, &self.config.queue, self.clock.clone()) {
                Ok(q) => Some(q),
                Err(e) if mode == RunMode::All => {
                    warn!(error = %e, "queue backend unavailable, falling back to inline mode");
                    None
                }
                Err(e) => return Err(anyhow::Error::new(e).context("failed to open job queue")),
            },
        };

        let lease_ttl = self.config.scheduler.lease_ttl();
        let poll = self.config.scheduler.poll_interval();
        let mut tasks = tokio::task::JoinSet::new();

        match queues {
            None => {
                info!("running inline: scheduler and worker fused");
                let dispatch = Arc::new(InlineDispatch::new(self.tick_worker()));
                let scheduler = self.scheduler(dispatch);
                let leader = LeaderElector::new(self.kv.clone(), lease_ttl);
                tasks.spawn(scheduler.run(leader, shutdown.clone()));
            }
            Some(queues) => {
                if mode != RunMode::Worker {
                    let scheduler = self
                        .scheduler(Arc::new(queues.ticks.clone()))
                        .with_digests(queues.digests.clone());
                    let leader = LeaderElector::new(self.kv.clone(), lease_ttl);
                    tasks.spawn(scheduler.run(leader, shutdown.clone()));
                }
                if mode != RunMode::Scheduler {
                    let pool = WorkerPool::new(&self.config.queue, self.clock.clone())
                        .register(queues.ticks.clone(), self.tick_worker())
                        .register(
                            queues.digests.clone(),
                            Arc::new(DigestWorker::new(self.store.clone())),
                        );
                    tasks.spawn(pool.run(poll, shutdown.clone()));
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.context("runtime task panicked")?;
        }
        Ok(())
    }
}
