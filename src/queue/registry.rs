use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use super::job::Job;

/// Rebuilds a job from its persisted `data` payload, re-injecting whatever
/// live dependencies the closure captured at registration time.
pub type JobLoader = Arc<dyn Fn(Value) -> Result<Box<dyn Job>> + Send + Sync>;

/// Owned mapping from job-type tag to loader. Populated during component
/// wiring, then frozen behind an `Arc` and handed to the queues.
#[derive(Default)]
pub struct JobRegistry {
    loaders: HashMap<String, JobLoader>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loader for `job_type`. The last registration for a tag
    /// wins; replacing an existing loader is logged.
    pub fn register<F>(&mut self, job_type: impl Into<String>, loader: F)
    where
        F: Fn(Value) -> Result<Box<dyn Job>> + Send + Sync + 'static,
    {
        let job_type = job_type.into();
        if self
            .loaders
            .insert(job_type.clone(), Arc::new(loader))
            .is_some()
        {
            warn!(job_type = %job_type, "job loader replaced by a later registration");
        }
    }

    #[must_use]
    pub fn lookup(&self, job_type: &str) -> Option<JobLoader> {
        self.loaders.get(job_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn lookup_of_unregistered_type_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.lookup("summary").is_none());
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = JobRegistry::new();
        registry.register("summary", |_| bail!("first"));
        registry.register("summary", |_| bail!("second"));

        let loader = registry.lookup("summary").unwrap();
        let error = loader(Value::Null).err().unwrap();
        assert_eq!(error.to_string(), "second");
    }
}
