use chrono::{DateTime, Utc};
use tracing::warn;

pub const SUMMARY_STATUS_EMPTY: &str = "";
pub const SUMMARY_STATUS_GENERATING: &str = "generating";
pub const SUMMARY_STATUS_FINISHED: &str = "finished";

/// One lecture session row. Nullable text columns are modelled as `String`
/// with the empty string meaning absent, matching the stored data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Course {
    pub sub_id: i64,
    pub course_id: i64,
    pub name: String,
    pub teacher: String,
    pub location: String,
    pub date: String,
    pub time: String,
    pub video: String,
    pub audio_id: String,
    pub asr: String,
    pub summary_status: String,
    pub summary_data: String,
    pub model: String,
    pub token: u32,
    pub summary_user: String,
}

impl Course {
    #[must_use]
    pub fn has_video(&self) -> bool {
        !self.video.is_empty()
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        !self.audio_id.is_empty()
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.summary_status == SUMMARY_STATUS_GENERATING
    }
}

/// One per-user summary row. A lecture can accumulate several rows for the
/// same user; `created_at` orders them and the newest one is "current".
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub user: String,
    pub sub_id: i64,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub model: String,
    pub token: u32,
}

/// Token counts live in a BIGINT column but are `u32` in the domain. A
/// stored value outside that range is logged and read as zero rather than
/// failing the whole row.
#[must_use]
pub(crate) fn token_from_db(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or_else(|_| {
        warn!(raw, "stored token count out of range; reading as 0");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_course_has_no_video_or_audio() {
        let course = Course::default();
        assert!(!course.has_video());
        assert!(!course.has_audio());
        assert!(!course.is_generating());
    }

    #[test]
    fn generating_status_is_detected() {
        let course = Course {
            summary_status: SUMMARY_STATUS_GENERATING.to_string(),
            ..Course::default()
        };
        assert!(course.is_generating());
    }

    #[test]
    fn out_of_range_token_counts_read_as_zero() {
        assert_eq!(token_from_db(321), 321);
        assert_eq!(token_from_db(-1), 0);
        assert_eq!(token_from_db(i64::from(u32::MAX) + 1), 0);
    }
}
