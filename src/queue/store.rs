use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::job::{Job, JobEnvelope};

const DEAD_LETTER_DIR: &str = "dead";

/// Directory-backed persistence for queued jobs, one JSON file per job.
///
/// Files survive process crashes; the queue replays them on the next start.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists the job envelope atomically: write a `.tmp` sibling, then
    /// rename over the final name so recovery never sees a partial file.
    pub fn save(&self, job: &dyn Job) -> Result<()> {
        let envelope = JobEnvelope::from_job(job)?;
        let bytes = serde_json::to_vec(&envelope)
            .with_context(|| format!("failed to serialise job {}", job.id()))?;

        let final_path = self.job_path(job.id());
        let tmp_path = final_path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("failed to publish {}", final_path.display()))?;
        Ok(())
    }

    /// Removes the persisted file for a completed job. A missing file counts
    /// as success so completion and recovery can race without errors.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let path = self.job_path(job_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to delete {}", path.display()))
            }
        }
    }

    /// Lists persisted job files sorted by filename. Job ids embed their
    /// creation timestamp, so the sort yields chronological replay order.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read queue dir {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.context("failed to read queue dir entry")?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read_envelope(path: &Path) -> Result<JobEnvelope> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("malformed job file {}", path.display()))
    }

    /// Moves an unloadable job file into the `dead/` subdirectory so it
    /// stops blocking recovery but remains available for inspection.
    pub fn dead_letter(&self, path: &Path) -> Result<()> {
        let dead_dir = self.dir.join(DEAD_LETTER_DIR);
        fs::create_dir_all(&dead_dir)
            .with_context(|| format!("failed to create {}", dead_dir.display()))?;

        let file_name = path
            .file_name()
            .with_context(|| format!("job file {} has no name", path.display()))?;
        let target = dead_dir.join(file_name);
        fs::rename(path, &target)
            .with_context(|| format!("failed to move {} to dead letter", path.display()))?;
        Ok(())
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    struct StubJob {
        id: String,
        data: Value,
    }

    #[async_trait]
    impl Job for StubJob {
        fn id(&self) -> &str {
            &self.id
        }

        fn job_type(&self) -> &'static str {
            "stub"
        }

        fn payload(&self) -> Result<Value> {
            Ok(self.data.clone())
        }

        async fn execute(&self) -> Result<()> {
            Ok(())
        }
    }

    fn store() -> (TempDir, JobStore) {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_then_read_round_trips_the_envelope() {
        let (_dir, store) = store();
        let job = StubJob {
            id: "stub-1".to_string(),
            data: json!({"sub_id": 42}),
        };

        store.save(&job).unwrap();

        let files = store.scan().unwrap();
        assert_eq!(files.len(), 1);
        let envelope = JobStore::read_envelope(&files[0]).unwrap();
        assert_eq!(envelope.job_type, "stub");
        assert_eq!(envelope.data, json!({"sub_id": 42}));
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let (dir, store) = store();
        let job = StubJob {
            id: "stub-1".to_string(),
            data: json!({}),
        };
        store.save(&job).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn delete_of_missing_file_is_success() {
        let (_dir, store) = store();
        store.delete("never-saved").unwrap();
    }

    #[test]
    fn scan_sorts_by_filename() {
        let (_dir, store) = store();
        for id in ["stub-3", "stub-1", "stub-2"] {
            let job = StubJob {
                id: id.to_string(),
                data: json!({}),
            };
            store.save(&job).unwrap();
        }

        let names: Vec<_> = store
            .scan()
            .unwrap()
            .into_iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["stub-1.json", "stub-2.json", "stub-3.json"]);
    }

    #[test]
    fn dead_letter_moves_file_out_of_scan_reach() {
        let (dir, store) = store();
        let job = StubJob {
            id: "stub-1".to_string(),
            data: json!({}),
        };
        store.save(&job).unwrap();

        let files = store.scan().unwrap();
        store.dead_letter(&files[0]).unwrap();

        assert!(store.scan().unwrap().is_empty());
        assert!(dir.path().join("dead/stub-1.json").exists());
    }
}
