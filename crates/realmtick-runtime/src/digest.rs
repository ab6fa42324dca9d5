use realmtick_core::job::{from_millis, DigestJob};
use realmtick_core::store::EntityStore;
use realmtick_core::types::{ActionCategory, ChronicleEntry, LogRecord};
use realmtick_core::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// Writes one `digest` chronicle entry per realm entity that acted during
/// the job's period.
pub struct DigestWorker {
    store: Arc<dyn EntityStore>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    /// Distinct ticks that performed an action.
    pub actions: usize,
    pub dominant: Option<ActionCategory>,
}

impl ActivitySummary {
    pub fn of(records: &[LogRecord]) -> Self {
        let mut ticks = BTreeSet::new();
        let mut per_category: BTreeMap<ActionCategory, usize> = BTreeMap::new();
        for r in records {
            let (Some(_), Some(category)) = (&r.action, r.category) else {
                continue;
            };
            let tick = r
                .correlation_id
                .clone()
                .unwrap_or_else(|| r.at.timestamp_millis().to_string());
            if ticks.insert(tick) {
                *per_category.entry(category).or_default() += 1;
            }
        }
        // Ties go to the earlier category in declaration order.
        let dominant = per_category
            .iter()
            .fold(None, |best: Option<(ActionCategory, usize)>, (&cat, &n)| match best {
                Some((_, top)) if top >= n => best,
                _ => Some((cat, n)),
            })
            .map(|(cat, _)| cat);
        Self {
            actions: ticks.len(),
            dominant,
        }
    }
}

impl DigestWorker {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Returns the number of digest entries written.
    pub fn process(&self, job: &DigestJob) -> Result<usize> {
        let from = from_millis(job.period_start);
        let to = from_millis(job.period_end);
        let mut entries = Vec::new();

        for entity in self.store.list()? {
            if entity.realm_id != job.realm_id {
                continue;
            }
            let records = self.store.logs_between(&entity.id, from, to)?;
            let summary = ActivitySummary::of(&records);
            if summary.actions == 0 {
                continue;
            }
            let text = match summary.dominant {
                Some(cat) => format!(
                    "{} took {} actions, mostly {}.",
                    entity.name, summary.actions, cat
                ),
                None => format!("{} took {} actions.", entity.name, summary.actions),
            };
            entries.push(ChronicleEntry {
                entity_id: entity.id.clone(),
                realm_id: entity.realm_id.clone(),
                at: to,
                kind: "digest".to_string(),
                text,
            });
        }

        self.store.append_chronicle(&entries)?;
        info!(realm_id = %job.realm_id, entries = entries.len(), "digest written");
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use realmtick_core::store::RedbEntityStore;
    use realmtick_core::types::Entity;
    use tempfile::TempDir;

    fn record(at: DateTime<Utc>, corr: &str, category: ActionCategory) -> LogRecord {
        LogRecord {
            entity_id: "hero".into(),
            realm_id: "eu".into(),
            at,
            action: Some("x".into()),
            category: Some(category),
            message: "did x".into(),
            correlation_id: Some(corr.into()),
        }
    }

    #[test]
    fn summary_counts_ticks_not_lines() {
        let t = Utc::now();
        let records = vec![
            record(t, "1", ActionCategory::Combat),
            record(t + Duration::milliseconds(10), "1", ActionCategory::Combat),
            record(t, "2", ActionCategory::Combat),
            record(t, "3", ActionCategory::Trade),
        ];
        let s = ActivitySummary::of(&records);
        assert_eq!(s.actions, 3);
        assert_eq!(s.dominant, Some(ActionCategory::Combat));
    }

    #[test]
    fn digest_covers_only_the_period_and_realm() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbEntityStore::open(&dir.path().join("e.redb")).unwrap());
        let start = Utc::now() - Duration::hours(2);
        let end = start + Duration::hours(1);
        store.put(&Entity::new("hero", "eu", "Hero", "town", start)).unwrap();
        store.put(&Entity::new("idle", "eu", "Idle", "town", start)).unwrap();
        store.put(&Entity::new("far", "us", "Far", "town", start)).unwrap();
        store
            .append_logs(&[
                record(start + Duration::minutes(5), "1", ActionCategory::Explore),
                record(end + Duration::minutes(5), "2", ActionCategory::Combat),
            ])
            .unwrap();

        let worker = DigestWorker::new(store.clone());
        let written = worker
            .process(&DigestJob {
                realm_id: "eu".into(),
                period_start: start.timestamp_millis(),
                period_end: end.timestamp_millis(),
            })
            .unwrap();
        assert_eq!(written, 1);
        let chronicle = store.chronicle("hero", 5).unwrap();
        assert_eq!(chronicle[0].kind, "digest");
        assert!(chronicle[0].text.contains("1 actions"));
        assert!(chronicle[0].text.contains("explore"));
    }
}
