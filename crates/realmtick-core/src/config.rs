use crate::error::{Result, TickError};
use crate::paths;
use crate::types::ActionCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// IntervalBounds
// ---------------------------------------------------------------------------

/// Inclusive millisecond range a tick delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalBounds {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl IntervalBounds {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Parse `"1000-5000"` or `"1000,5000"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (lo, hi) = raw
            .split_once('-')
            .or_else(|| raw.split_once(','))
            .ok_or_else(|| TickError::InvalidConfig(format!("interval '{raw}' is not 'min-max'")))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|e| TickError::InvalidConfig(format!("interval '{raw}': {e}")))
        };
        Ok(Self::new(parse(lo)?, parse(hi)?))
    }

    /// The bounds with `min ≤ max` enforced.
    pub fn ordered(self) -> (u64, u64) {
        (self.min_ms.min(self.max_ms), self.min_ms.max(self.max_ms))
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_combat_interval")]
    pub combat_interval: IntervalBounds,
    #[serde(default = "default_idle_interval")]
    pub idle_interval: IntervalBounds,
    /// Leadership lease TTL as a multiple of the poll interval.
    #[serde(default = "default_lease_polls")]
    pub lease_ttl_polls: u32,
    #[serde(default = "default_guard_bucket_ms")]
    pub guard_bucket_ms: u64,
    /// Extra guard TTL on top of the next delay.
    #[serde(default = "default_guard_slack_ms")]
    pub guard_slack_ms: u64,
    /// Sleep after a failed iteration instead of the poll interval.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_fatigue_decay_secs")]
    pub fatigue_decay_interval_secs: u64,
    #[serde(default = "default_digest_period_secs")]
    pub digest_period_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_combat_interval() -> IntervalBounds {
    IntervalBounds::new(1_000, 5_000)
}
fn default_idle_interval() -> IntervalBounds {
    IntervalBounds::new(5_000, 40_000)
}
fn default_lease_polls() -> u32 {
    5
}
fn default_guard_bucket_ms() -> u64 {
    1000
}
fn default_guard_slack_ms() -> u64 {
    1000
}
fn default_error_backoff_ms() -> u64 {
    5000
}
fn default_fatigue_decay_secs() -> u64 {
    60
}
fn default_digest_period_secs() -> u64 {
    3600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            combat_interval: default_combat_interval(),
            idle_interval: default_idle_interval(),
            lease_ttl_polls: default_lease_polls(),
            guard_bucket_ms: default_guard_bucket_ms(),
            guard_slack_ms: default_guard_slack_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            fatigue_decay_interval_secs: default_fatigue_decay_secs(),
            digest_period_secs: default_digest_period_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn lease_ttl(&self) -> Duration {
        self.poll_interval() * self.lease_ttl_polls.max(1)
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_tick_guard_secs")]
    pub tick_guard_ttl_secs: u64,
    #[serde(default = "default_hot_cache_secs")]
    pub hot_cache_ttl_secs: u64,
    #[serde(default = "default_snapshot_lock_secs")]
    pub snapshot_lock_secs: u64,
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,
    /// Gap between consecutive log record timestamps within one tick.
    #[serde(default = "default_log_stagger_ms")]
    pub log_stagger_ms: i64,
    #[serde(default = "default_game_data_ttl_secs")]
    pub game_data_ttl_secs: u64,
    /// YAML game data, relative to the project root. Built-in world if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<PathBuf>,
}

fn default_tick_guard_secs() -> u64 {
    60
}
fn default_hot_cache_secs() -> u64 {
    30
}
fn default_snapshot_lock_secs() -> u64 {
    600
}
fn default_snapshot_retention() -> usize {
    200
}
fn default_log_stagger_ms() -> i64 {
    10
}
fn default_game_data_ttl_secs() -> u64 {
    300
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_guard_ttl_secs: default_tick_guard_secs(),
            hot_cache_ttl_secs: default_hot_cache_secs(),
            snapshot_lock_secs: default_snapshot_lock_secs(),
            snapshot_retention: default_snapshot_retention(),
            log_stagger_ms: default_log_stagger_ms(),
            game_data_ttl_secs: default_game_data_ttl_secs(),
            game_data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
    /// Jobs running longer than this are considered abandoned.
    #[serde(default = "default_stalled_after_secs")]
    pub stalled_after_secs: u64,
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
}

fn default_concurrency() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_keep_completed() -> usize {
    1000
}
fn default_keep_failed() -> usize {
    5000
}
fn default_stalled_after_secs() -> u64 {
    30
}
fn default_claim_batch() -> usize {
    32
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            stalled_after_secs: default_stalled_after_secs(),
            claim_batch: default_claim_batch(),
        }
    }
}

// ---------------------------------------------------------------------------
// DecisionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentBias {
    /// How many of the newest history entries are inspected.
    #[serde(default = "default_bias_window")]
    pub window: usize,
    #[serde(default = "default_heavy_count")]
    pub heavy_count: usize,
    #[serde(default = "default_heavy_factor")]
    pub heavy_factor: f64,
    #[serde(default = "default_light_count")]
    pub light_count: usize,
    #[serde(default = "default_light_factor")]
    pub light_factor: f64,
}

fn default_bias_window() -> usize {
    8
}
fn default_heavy_count() -> usize {
    5
}
fn default_heavy_factor() -> f64 {
    0.6
}
fn default_light_count() -> usize {
    3
}
fn default_light_factor() -> f64 {
    0.8
}

impl Default for RecentBias {
    fn default() -> Self {
        Self {
            window: default_bias_window(),
            heavy_count: default_heavy_count(),
            heavy_factor: default_heavy_factor(),
            light_count: default_light_count(),
            light_factor: default_light_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningBounds {
    #[serde(default = "default_learning_min")]
    pub min: f64,
    #[serde(default = "default_learning_max")]
    pub max: f64,
    /// Failures older than this no longer count as recent.
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: i64,
}

fn default_learning_min() -> f64 {
    0.8
}
fn default_learning_max() -> f64 {
    1.2
}
fn default_failure_window_secs() -> i64 {
    3600
}

impl Default for LearningBounds {
    fn default() -> Self {
        Self {
            min: default_learning_min(),
            max: default_learning_max(),
            failure_window_secs: default_failure_window_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Gate decisions through the behavior tree. When off, every performable
    /// action is scored flat.
    #[serde(default = "default_true")]
    pub behavior_tree: bool,
    #[serde(default = "default_stall_window_secs")]
    pub stall_window_secs: i64,
    #[serde(default = "default_arrival_window_secs")]
    pub arrival_window_secs: i64,
    #[serde(default = "default_score_cache_ms")]
    pub score_cache_ms: u64,
    #[serde(default)]
    pub recent_bias: RecentBias,
    #[serde(default)]
    pub learning: LearningBounds,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_multipliers: BTreeMap<ActionCategory, f64>,
}

fn default_true() -> bool {
    true
}
fn default_stall_window_secs() -> i64 {
    300
}
fn default_arrival_window_secs() -> i64 {
    30
}
fn default_score_cache_ms() -> u64 {
    1000
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            behavior_tree: true,
            stall_window_secs: default_stall_window_secs(),
            arrival_window_secs: default_arrival_window_secs(),
            score_cache_ms: default_score_cache_ms(),
            recent_bias: RecentBias::default(),
            learning: LearningBounds::default(),
            category_multipliers: BTreeMap::new(),
        }
    }
}

impl DecisionConfig {
    pub fn category_multiplier(&self, category: ActionCategory) -> f64 {
        self.category_multipliers
            .get(&category)
            .copied()
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// FatigueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueConfig {
    /// History window W; a usage count never exceeds it.
    #[serde(default = "default_fatigue_window")]
    pub window: u32,
    #[serde(default = "default_fatigue_strength")]
    pub strength: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Actions never dampened by fatigue.
    #[serde(default = "default_exempt")]
    pub exempt: Vec<String>,
}

fn default_fatigue_window() -> u32 {
    15
}
fn default_fatigue_strength() -> f64 {
    0.75
}
fn default_decay_rate() -> f64 {
    0.15
}
fn default_exempt() -> Vec<String> {
    vec!["flee".into(), "respawn".into(), "bandage".into()]
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            window: default_fatigue_window(),
            strength: default_fatigue_strength(),
            decay_rate: default_decay_rate(),
            exempt: default_exempt(),
        }
    }
}

impl FatigueConfig {
    pub fn is_exempt(&self, action: &str) -> bool {
        self.exempt.iter().any(|a| a == action)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub fatigue: FatigueConfig,
}

/// Environment variables recognised by [`Config::apply_env`].
pub const ENV_OVERRIDES: &[&str] = &[
    "REALMTICK_QUEUE_CONCURRENCY",
    "REALMTICK_COMBAT_INTERVAL_MS",
    "REALMTICK_IDLE_INTERVAL_MS",
    "REALMTICK_FATIGUE_DECAY_RATE",
    "REALMTICK_FATIGUE_STRENGTH",
    "REALMTICK_FATIGUE_WINDOW",
    "REALMTICK_STALL_WINDOW_SECS",
    "REALMTICK_ARRIVAL_WINDOW_SECS",
    "REALMTICK_BEHAVIOR_TREE",
];

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(TickError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Config file if present, defaults otherwise, then environment
    /// overrides on top.
    pub fn load_effective(root: &Path) -> Result<Self> {
        let mut cfg = match Self::load(root) {
            Ok(cfg) => cfg,
            Err(TickError::NotInitialized) => Self::default(),
            Err(e) => return Err(e),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name from
    /// [`ENV_OVERRIDES`] to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|e| TickError::InvalidConfig(format!("{name}={raw}: {e}")))
        }

        if let Some(v) = lookup("REALMTICK_QUEUE_CONCURRENCY") {
            self.queue.concurrency = num("REALMTICK_QUEUE_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_COMBAT_INTERVAL_MS") {
            self.scheduler.combat_interval = IntervalBounds::parse(&v)?;
        }
        if let Some(v) = lookup("REALMTICK_IDLE_INTERVAL_MS") {
            self.scheduler.idle_interval = IntervalBounds::parse(&v)?;
        }
        if let Some(v) = lookup("REALMTICK_FATIGUE_DECAY_RATE") {
            self.fatigue.decay_rate = num("REALMTICK_FATIGUE_DECAY_RATE", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_FATIGUE_STRENGTH") {
            self.fatigue.strength = num("REALMTICK_FATIGUE_STRENGTH", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_FATIGUE_WINDOW") {
            self.fatigue.window = num("REALMTICK_FATIGUE_WINDOW", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_STALL_WINDOW_SECS") {
            self.decision.stall_window_secs = num("REALMTICK_STALL_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_ARRIVAL_WINDOW_SECS") {
            self.decision.arrival_window_secs = num("REALMTICK_ARRIVAL_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("REALMTICK_BEHAVIOR_TREE") {
            self.decision.behavior_tree = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => {
                    return Err(TickError::InvalidConfig(format!(
                        "REALMTICK_BEHAVIOR_TREE={other}: expected true or false"
                    )))
                }
            };
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        for (name, bounds) in [
            ("combat_interval", self.scheduler.combat_interval),
            ("idle_interval", self.scheduler.idle_interval),
        ] {
            if bounds.min_ms > bounds.max_ms {
                push(
                    WarnLevel::Warning,
                    format!(
                        "scheduler.{name} has min {} above max {}; bounds will be swapped",
                        bounds.min_ms, bounds.max_ms
                    ),
                );
            }
            if bounds.max_ms == 0 {
                push(WarnLevel::Error, format!("scheduler.{name} is zero"));
            }
        }
        if self.scheduler.combat_interval.max_ms > self.scheduler.idle_interval.min_ms {
            push(
                WarnLevel::Warning,
                "combat ticks may be slower than idle ticks".to_string(),
            );
        }
        if self.scheduler.poll_interval_ms == 0 {
            push(WarnLevel::Error, "scheduler.poll_interval_ms is zero".to_string());
        }
        if self.queue.concurrency == 0 {
            push(WarnLevel::Error, "queue.concurrency is zero; no job would run".to_string());
        }
        if self.queue.max_attempts == 0 {
            push(WarnLevel::Error, "queue.max_attempts is zero".to_string());
        }
        if self.queue.stalled_after_secs >= self.worker.tick_guard_ttl_secs {
            push(
                WarnLevel::Warning,
                format!(
                    "queue.stalled_after_secs ({}) is not below worker.tick_guard_ttl_secs ({}); \
                     a tick recovered from a crashed worker may be applied twice",
                    self.queue.stalled_after_secs, self.worker.tick_guard_ttl_secs
                ),
            );
        }
        if !(self.fatigue.decay_rate > 0.0 && self.fatigue.decay_rate <= 1.0) {
            push(
                WarnLevel::Error,
                format!("fatigue.decay_rate {} is outside (0, 1]", self.fatigue.decay_rate),
            );
        }
        if self.fatigue.window == 0 {
            push(WarnLevel::Error, "fatigue.window is zero".to_string());
        }
        if self.fatigue.strength < 0.0 {
            push(
                WarnLevel::Warning,
                format!("fatigue.strength {} is negative", self.fatigue.strength),
            );
        }
        let learning = &self.decision.learning;
        if learning.min > learning.max {
            push(
                WarnLevel::Warning,
                format!("decision.learning min {} above max {}", learning.min, learning.max),
            );
        }
        for (category, mult) in &self.decision.category_multipliers {
            if *mult < 0.0 {
                push(
                    WarnLevel::Warning,
                    format!("category multiplier for '{category}' is negative ({mult})"),
                );
            }
        }
        if self.decision.stall_window_secs <= 0 {
            push(
                WarnLevel::Warning,
                "decision.stall_window_secs <= 0 forces travel on every idle tick".to_string(),
            );
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let yaml = "queue:\n  concurrency: 2\nfatigue:\n  window: 10\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.queue.concurrency, 2);
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.fatigue.window, 10);
        assert_eq!(cfg.fatigue.exempt, vec!["flee", "respawn", "bandage"]);
        assert!(cfg.decision.behavior_tree);
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(TickError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.decision
            .category_multipliers
            .insert(ActionCategory::Trade, 1.5);
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.decision.category_multiplier(ActionCategory::Trade), 1.5);
        assert_eq!(loaded.decision.category_multiplier(ActionCategory::Rest), 1.0);
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("REALMTICK_QUEUE_CONCURRENCY", "3"),
            ("REALMTICK_COMBAT_INTERVAL_MS", "500-2000"),
            ("REALMTICK_FATIGUE_DECAY_RATE", "0.3"),
            ("REALMTICK_BEHAVIOR_TREE", "off"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.queue.concurrency, 3);
        assert_eq!(cfg.scheduler.combat_interval, IntervalBounds::new(500, 2000));
        assert_eq!(cfg.fatigue.decay_rate, 0.3);
        assert!(!cfg.decision.behavior_tree);
    }

    #[test]
    fn bad_override_is_an_error() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides(|k| (k == "REALMTICK_FATIGUE_WINDOW").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("REALMTICK_FATIGUE_WINDOW"));
    }

    #[test]
    fn validate_default_has_no_warnings() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::default();
        cfg.scheduler.idle_interval = IntervalBounds::new(40_000, 5_000);
        cfg.fatigue.decay_rate = 1.5;
        cfg.queue.concurrency = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("idle_interval")));
        assert!(warnings.iter().any(|w| w.message.contains("decay_rate")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("concurrency")));
    }

    #[test]
    fn validate_flags_stall_recovery_outliving_tick_guard() {
        let mut cfg = Config::default();
        cfg.queue.stalled_after_secs = cfg.worker.tick_guard_ttl_secs;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("applied twice")));
    }

    #[test]
    fn interval_parse_accepts_comma() {
        assert_eq!(IntervalBounds::parse("1,2").unwrap(), IntervalBounds::new(1, 2));
        assert!(IntervalBounds::parse("fast").is_err());
        assert_eq!(IntervalBounds::new(9, 3).ordered(), (3, 9));
    }
}
