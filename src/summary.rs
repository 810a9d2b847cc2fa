//! The lecture-summary pipeline: the one concrete job the queue runs.

mod job;
mod locks;
mod signature;

pub use job::{SUMMARY_JOB_TYPE, SummaryDeps, SummaryJob, SummaryPayload, SummaryTask};
pub use locks::SubjectLocks;
pub use signature::{reverse_phone, url_path_of, video_auth_query};
