//! Thin clients for the campus and vendor services the worker talks to.
//! Each one is a trait seam plus a concrete HTTP/process implementation.

pub mod asr;
pub mod live_course;
pub mod llm;
pub mod schedule;
pub mod storage;
pub mod transcoder;
pub mod user;
pub mod video_auth;

pub use asr::{AsrClient, SpeechRecognizer};
pub use live_course::{LiveCourse, LiveCourseClient, LiveCourseSearch};
pub use llm::{Completion, LanguageModel, OpenAiClient};
pub use schedule::{ScheduleClient, ScheduledCourse, Timetable};
pub use storage::{HttpObjectStorage, ObjectStorage};
pub use transcoder::{FfmpegTranscoder, Transcoder};
pub use user::{UserClient, UserDirectory, UserInfo};
pub use video_auth::{VideoAuthClient, VideoAuthority};
