use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A payload carried by a named queue under a deterministic id.
pub trait Job: Serialize + DeserializeOwned {
    const QUEUE: &'static str;

    /// Re-enqueueing a job with the same id is a no-op.
    fn job_id(&self) -> String;

    /// Earliest time the job should run.
    fn scheduled_at(&self) -> DateTime<Utc>;
}

// ---------------------------------------------------------------------------
// TickJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickJob {
    pub realm_id: String,
    pub entity_id: String,
    /// Scheduled tick time, epoch milliseconds.
    pub tick_at: i64,
    pub correlation_id: String,
}

impl TickJob {
    pub fn new(realm_id: &str, entity_id: &str, tick_at: DateTime<Utc>) -> Self {
        Self {
            realm_id: realm_id.to_string(),
            entity_id: entity_id.to_string(),
            tick_at: tick_at.timestamp_millis(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Job for TickJob {
    const QUEUE: &'static str = "tick";

    fn job_id(&self) -> String {
        format!("{}:{}:{}", self.realm_id, self.entity_id, self.tick_at)
    }

    fn scheduled_at(&self) -> DateTime<Utc> {
        from_millis(self.tick_at)
    }
}

// ---------------------------------------------------------------------------
// DigestJob
// ---------------------------------------------------------------------------

/// Summarise one realm's activity over `[period_start, period_end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestJob {
    pub realm_id: String,
    pub period_start: i64,
    pub period_end: i64,
}

impl Job for DigestJob {
    const QUEUE: &'static str = "digest";

    fn job_id(&self) -> String {
        format!("digest:{}:{}", self.realm_id, self.period_end)
    }

    fn scheduled_at(&self) -> DateTime<Utc> {
        from_millis(self.period_end)
    }
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn encode<J: Job>(job: &J) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(job)?)
}

pub fn decode<J: Job>(payload: &serde_json::Value) -> Result<J> {
    Ok(serde_json::from_value(payload.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_job_id_is_deterministic() {
        let job = TickJob {
            realm_id: "eu".into(),
            entity_id: "hero".into(),
            tick_at: 1_700_000_000_000,
            correlation_id: "c1".into(),
        };
        assert_eq!(job.job_id(), "eu:hero:1700000000000");
        let mut other = job.clone();
        other.correlation_id = "c2".into();
        assert_eq!(job.job_id(), other.job_id());
    }

    #[test]
    fn tick_job_payload_is_camel_case() {
        let job = TickJob {
            realm_id: "eu".into(),
            entity_id: "hero".into(),
            tick_at: 5,
            correlation_id: "c1".into(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["realmId"], "eu");
        assert_eq!(json["tickAt"], 5);
        assert_eq!(json["correlationId"], "c1");
        assert_eq!(decode::<TickJob>(&json).unwrap(), job);
    }

    #[test]
    fn digest_job_id() {
        let job = DigestJob {
            realm_id: "eu".into(),
            period_start: 0,
            period_end: 3_600_000,
        };
        assert_eq!(job.job_id(), "digest:eu:3600000");
        assert_eq!(job.scheduled_at().timestamp_millis(), 3_600_000);
    }
}
