use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of background work that can survive a process restart.
///
/// Implementations must be reconstructible from `payload()` alone plus the
/// live dependencies a registered loader re-injects, so a crashed job can be
/// replayed from its persisted file.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identity, generated once at construction and stored in the
    /// payload. Doubles as the persistence filename stem.
    fn id(&self) -> &str;

    /// Type tag used to select a loader during recovery.
    fn job_type(&self) -> &'static str;

    /// Serialisable payload holding everything needed to rebuild the job.
    fn payload(&self) -> Result<Value>;

    async fn execute(&self) -> Result<()>;
}

/// Self-describing persisted form of a job: `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub job_type: String,
    pub data: Value,
}

impl JobEnvelope {
    pub fn from_job(job: &dyn Job) -> Result<Self> {
        Ok(Self {
            job_type: job.job_type().to_string(),
            data: job.payload()?,
        })
    }
}
