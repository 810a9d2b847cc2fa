//! Relational persistence: course and summary rows behind trait seams so
//! the pipeline can run against in-memory doubles in tests.

pub mod course;
pub mod models;
pub mod summary;

pub use course::{CourseStore, PgCourseStore};
pub use models::{
    Course, SUMMARY_STATUS_EMPTY, SUMMARY_STATUS_FINISHED, SUMMARY_STATUS_GENERATING,
    SummaryRecord,
};
pub use summary::{PgSummaryStore, SummaryStore};
