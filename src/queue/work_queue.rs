use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::Job;
use super::registry::JobRegistry;
use super::store::JobStore;

/// Non-fatal queue degradations. Persistence failures never stop the queue;
/// they are reported through the hook so callers (and tests) can observe
/// that durability has degraded while processing continues.
#[derive(Debug, Clone)]
pub enum DegradedEvent {
    PersistenceDirUnavailable { queue: String, error: String },
    JobSaveFailed { job_id: String, error: String },
    JobDeleteFailed { job_id: String, error: String },
    JobDeadLettered { file: String, reason: String },
}

pub type DegradedHook = Arc<dyn Fn(DegradedEvent) + Send + Sync>;

fn logging_hook() -> DegradedHook {
    Arc::new(|event| warn!(event = ?event, "queue persistence degraded"))
}

/// Owns every named work queue in the process. `create` is an idempotent
/// singleton per name; the first caller fixes the queue's dimensions.
pub struct QueueManager {
    base_dir: PathBuf,
    hook: DegradedHook,
    queues: std::sync::Mutex<HashMap<String, Arc<WorkQueue>>>,
}

impl QueueManager {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_degraded_hook(base_dir, logging_hook())
    }

    #[must_use]
    pub fn with_degraded_hook(base_dir: impl Into<PathBuf>, hook: DegradedHook) -> Self {
        Self {
            base_dir: base_dir.into(),
            hook,
            queues: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns the queue registered under `name`, creating it on first call.
    /// Later calls ignore their dimension arguments and return the existing
    /// queue. A failure to create the persistence directory degrades the
    /// queue to in-memory operation instead of failing startup.
    pub fn create(
        &self,
        name: &str,
        worker_count: usize,
        queue_size: usize,
        registry: Arc<JobRegistry>,
    ) -> Arc<WorkQueue> {
        let mut queues = self.queues.lock().expect("queue map lock poisoned");
        if let Some(queue) = queues.get(name) {
            return Arc::clone(queue);
        }

        let dir = self.base_dir.join(name);
        if let Err(error) = std::fs::create_dir_all(&dir) {
            error!(
                queue = name,
                dir = %dir.display(),
                error = %error,
                "failed to create queue persistence dir; jobs will not survive a restart"
            );
            (self.hook)(DegradedEvent::PersistenceDirUnavailable {
                queue: name.to_string(),
                error: error.to_string(),
            });
        }

        let queue = Arc::new(WorkQueue::new(
            name,
            worker_count,
            queue_size,
            JobStore::new(dir),
            registry,
            Arc::clone(&self.hook),
        ));
        queues.insert(name.to_string(), Arc::clone(&queue));
        info!(
            queue = name,
            workers = worker_count,
            capacity = queue_size,
            "created work queue"
        );
        queue
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<WorkQueue>> {
        self.queues
            .lock()
            .expect("queue map lock poisoned")
            .get(name)
            .cloned()
    }

    /// Stops every queue, waiting for in-flight jobs to finish.
    pub async fn stop_all(&self) {
        let queues: Vec<Arc<WorkQueue>> = {
            let queues = self.queues.lock().expect("queue map lock poisoned");
            queues.values().cloned().collect()
        };
        for queue in queues {
            queue.stop().await;
        }
    }
}

/// Bounded multi-worker job queue with file-backed at-least-once delivery.
///
/// Jobs are persisted before submission and deleted only after successful
/// execution; anything still on disk at the next start is replayed by the
/// recovery pass. A failed job keeps its file and is retried only at the
/// next start, never in-process.
pub struct WorkQueue {
    inner: Arc<QueueCore>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

struct QueueCore {
    name: String,
    sender: std::sync::Mutex<Option<mpsc::Sender<Box<dyn Job>>>>,
    receiver: Mutex<mpsc::Receiver<Box<dyn Job>>>,
    worker_slots: Semaphore,
    worker_count: usize,
    store: JobStore,
    registry: Arc<JobRegistry>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    hook: DegradedHook,
}

impl WorkQueue {
    #[must_use]
    pub fn new(
        name: &str,
        worker_count: usize,
        queue_size: usize,
        store: JobStore,
        registry: Arc<JobRegistry>,
        hook: DegradedHook,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(QueueCore {
                name: name.to_string(),
                sender: std::sync::Mutex::new(Some(sender)),
                receiver: Mutex::new(receiver),
                worker_slots: Semaphore::new(worker_count),
                worker_count,
                store,
                registry,
                shutdown,
                stopped: AtomicBool::new(false),
                hook,
            }),
            workers: std::sync::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Spawns the worker pool and then the recovery pass. Recovery runs
    /// concurrently with the workers, so a replayed job may start executing
    /// before the scan has finished. Calling `start` twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.workers.lock().expect("worker handles lock poisoned");
        for worker_id in 0..self.inner.worker_count {
            let core = Arc::clone(&self.inner);
            handles.push(tokio::spawn(async move {
                core.worker_loop(worker_id).await;
            }));
        }
        drop(handles);

        let core = Arc::clone(&self.inner);
        tokio::spawn(async move {
            core.recover().await;
        });

        info!(
            queue = %self.inner.name,
            workers = self.inner.worker_count,
            "work queue started"
        );
    }

    /// Persists the job, then submits it for execution. A stopped queue
    /// drops the job with a log line; submission is fire-and-forget and a
    /// full channel blocks the caller until a worker drains a slot.
    pub async fn add_job(&self, job: Box<dyn Job>) {
        let core = &self.inner;
        if core.stopped.load(Ordering::SeqCst) {
            warn!(queue = %core.name, job_id = %job.id(), "queue stopped; dropping job");
            return;
        }

        if let Err(error) = core.store.save(job.as_ref()) {
            error!(
                queue = %core.name,
                job_id = %job.id(),
                error = %format!("{error:#}"),
                "failed to persist job; it will not survive a restart"
            );
            (core.hook)(DegradedEvent::JobSaveFailed {
                job_id: job.id().to_string(),
                error: format!("{error:#}"),
            });
        }

        let sender = {
            let guard = core.sender.lock().expect("sender lock poisoned");
            guard.clone()
        };
        match sender {
            Some(sender) => {
                let job_id = job.id().to_string();
                debug!(queue = %core.name, job_id = %job_id, "job submitted");
                if sender.send(job).await.is_err() {
                    warn!(
                        queue = %core.name,
                        job_id = %job_id,
                        "queue channel closed; persisted copy retained for recovery"
                    );
                }
            }
            None => {
                warn!(queue = %core.name, job_id = %job.id(), "queue stopped; dropping job");
            }
        }
    }

    /// Signals shutdown, closes the channel and waits for the workers to run
    /// down the backlog: in-flight jobs finish and jobs still buffered in
    /// the channel are drained before the workers exit. Only submissions
    /// arriving after `stop` are refused. Safe to call more than once.
    pub async fn stop(&self) {
        let core = &self.inner;
        if core.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(queue = %core.name, "stopping work queue");

        let _ = core.shutdown.send(true);
        core.sender.lock().expect("sender lock poisoned").take();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker handles lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(error) = handle.await {
                warn!(queue = %core.name, error = %error, "worker task ended abnormally");
            }
        }
        info!(queue = %core.name, "work queue stopped");
    }
}

impl QueueCore {
    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        let mut shutdown = self.shutdown.subscribe();
        debug!(queue = %self.name, worker = worker_id, "worker started");

        loop {
            let job = tokio::select! {
                _ = shutdown.changed() => {
                    self.drain(worker_id).await;
                    break;
                }
                job = self.next_job() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.run_job(worker_id, job).await;
        }

        debug!(queue = %self.name, worker = worker_id, "worker stopped");
    }

    async fn run_job(&self, worker_id: usize, job: Box<dyn Job>) {
        let Ok(permit) = self.worker_slots.acquire().await else {
            return;
        };
        let job_id = job.id().to_string();
        let started = Instant::now();
        let result = job.execute().await;
        let elapsed_ms = started.elapsed().as_millis();
        drop(permit);

        match result {
            Ok(()) => {
                debug!(
                    queue = %self.name,
                    worker = worker_id,
                    job_id = %job_id,
                    elapsed_ms,
                    "job completed"
                );
                if let Err(error) = self.store.delete(&job_id) {
                    warn!(
                        queue = %self.name,
                        job_id = %job_id,
                        error = %format!("{error:#}"),
                        "completed job file not deleted; it will be replayed at next start"
                    );
                    (self.hook)(DegradedEvent::JobDeleteFailed {
                        job_id: job_id.clone(),
                        error: format!("{error:#}"),
                    });
                }
            }
            Err(error) => {
                error!(
                    queue = %self.name,
                    worker = worker_id,
                    job_id = %job_id,
                    elapsed_ms,
                    error = %format!("{error:#}"),
                    "job failed; persisted copy retained for recovery at next start"
                );
            }
        }
    }

    /// Runs jobs already accepted into the channel to completion after the
    /// stop signal. Anything submitted once the drain sees an empty channel
    /// keeps its persisted file and is replayed at the next start.
    async fn drain(&self, worker_id: usize) {
        loop {
            let job = {
                let mut receiver = self.receiver.lock().await;
                match receiver.try_recv() {
                    Ok(job) => job,
                    Err(_) => return,
                }
            };
            self.run_job(worker_id, job).await;
        }
    }

    async fn next_job(&self) -> Option<Box<dyn Job>> {
        self.receiver.lock().await.recv().await
    }

    /// Replays persisted job files left over from a previous run. Files
    /// whose type has no registered loader, or whose payload the loader
    /// rejects, are dead-lettered. Recovery failures never take the queue
    /// down.
    async fn recover(self: Arc<Self>) {
        let files = match self.store.scan() {
            Ok(files) => files,
            Err(error) => {
                error!(
                    queue = %self.name,
                    error = %format!("{error:#}"),
                    "failed to scan queue dir; skipping recovery"
                );
                return;
            }
        };
        if files.is_empty() {
            return;
        }

        let sender = {
            let guard = self.sender.lock().expect("sender lock poisoned");
            guard.clone()
        };
        let Some(sender) = sender else {
            return;
        };
        let mut shutdown = self.shutdown.subscribe();
        let mut recovered = 0usize;

        for path in files {
            let envelope = match JobStore::read_envelope(&path) {
                Ok(envelope) => envelope,
                Err(error) => {
                    self.dead_letter(&path, &format!("{error:#}"));
                    continue;
                }
            };

            let Some(loader) = self.registry.lookup(&envelope.job_type) else {
                self.dead_letter(
                    &path,
                    &format!("no loader registered for type {:?}", envelope.job_type),
                );
                continue;
            };

            let job = match loader(envelope.data) {
                Ok(job) => job,
                Err(error) => {
                    self.dead_letter(&path, &format!("loader failed: {error:#}"));
                    continue;
                }
            };

            // The file already exists on disk; push straight onto the
            // channel instead of re-persisting through add_job.
            let submitted = tokio::select! {
                _ = shutdown.changed() => false,
                result = sender.send(job) => result.is_ok(),
            };
            if !submitted {
                debug!(queue = %self.name, "queue stopped during recovery");
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!(queue = %self.name, recovered, "recovered persisted jobs");
        }
    }

    fn dead_letter(&self, path: &std::path::Path, reason: &str) {
        warn!(
            queue = %self.name,
            file = %path.display(),
            reason,
            "moving unloadable job file to dead letter"
        );
        (self.hook)(DegradedEvent::JobDeadLettered {
            file: path.display().to_string(),
            reason: reason.to_string(),
        });
        if let Err(error) = self.store.dead_letter(path) {
            error!(
                queue = %self.name,
                file = %path.display(),
                error = %format!("{error:#}"),
                "failed to dead-letter job file"
            );
        }
    }
}
