use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-lecture mutual exclusion. Two queued jobs for the same `sub_id`
/// would otherwise interleave status and transcript writes on the course
/// row; the later job waits instead of racing.
#[derive(Default)]
pub struct SubjectLocks {
    locks: std::sync::Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, sub_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("subject lock map poisoned");
            Arc::clone(locks.entry(sub_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_subject_serialises() {
        let locks = Arc::new(SubjectLocks::new());
        let guard = locks.acquire(7).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_subjects_do_not_block_each_other() {
        let locks = SubjectLocks::new();
        let _seven = locks.acquire(7).await;
        let _eight = locks.acquire(8).await;
    }
}
