//! Durable background job queue.
//!
//! Jobs are persisted as JSON files before submission and deleted only after
//! a successful run, giving at-least-once delivery across process restarts.
//! A bounded worker pool drains the queue; a recovery pass replays whatever
//! files survived the previous run.

mod job;
mod registry;
mod store;
mod work_queue;

pub use job::{Job, JobEnvelope};
pub use registry::{JobLoader, JobRegistry};
pub use store::JobStore;
pub use work_queue::{DegradedEvent, DegradedHook, QueueManager, WorkQueue};
