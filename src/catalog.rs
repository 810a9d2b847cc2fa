//! Course lookup and ingestion. Resolves a lecture by title and date,
//! creating or refreshing its database row from the campus live-course
//! listing along the way; this is how course rows come to exist before the
//! summary pipeline ever touches them.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::clients::{
    LiveCourse, LiveCourseSearch, ScheduledCourse, Timetable, UserDirectory, UserInfo,
    VideoAuthority,
};
use crate::store::{
    Course, CourseStore, SUMMARY_STATUS_FINISHED, SUMMARY_STATUS_GENERATING, SummaryStore,
};
use crate::summary::{url_path_of, video_auth_query};

/// Dependency bundle for the lookup flow; everything is an `Arc` so the
/// catalog shares clients and stores with the summary pipeline.
#[derive(Clone)]
pub struct CourseCatalogDeps {
    pub users: Arc<dyn UserDirectory>,
    pub timetable: Arc<dyn Timetable>,
    pub live_courses: Arc<dyn LiveCourseSearch>,
    pub video_auth: Arc<dyn VideoAuthority>,
    pub courses: Arc<dyn CourseStore>,
    pub summaries: Arc<dyn SummaryStore>,
}

/// What the frontend sees for one lecture. The `summary` block prefers the
/// caller's own newest summary row over the course-level columns, and a
/// non-empty `video` URL comes back pre-signed for playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseView {
    pub course_id: i64,
    pub sub_id: i64,
    pub name: String,
    pub teacher: String,
    pub location: String,
    pub date: String,
    pub time: String,
    pub video: String,
    pub asr: String,
    pub summary: SummaryView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryView {
    pub status: String,
    pub data: String,
    pub model: String,
    pub token: String,
}

pub struct CourseCatalog {
    deps: CourseCatalogDeps,
}

impl CourseCatalog {
    #[must_use]
    pub fn new(deps: CourseCatalogDeps) -> Self {
        Self { deps }
    }

    /// Resolves a lecture by title and date. A lecture the database has
    /// never seen is created from the live-course listing; a known row
    /// without a video gets its playback URL refreshed from the listing.
    /// Returns `None` when neither the timetable nor the listing knows the
    /// lecture.
    pub async fn lookup(
        &self,
        token: &str,
        date: &str,
        course_name: &str,
    ) -> Result<Option<CourseView>> {
        let Some(slot) = self
            .deps
            .timetable
            .find_course(token, date, course_name)
            .await?
        else {
            return Ok(None);
        };

        let user = self
            .deps
            .users
            .user_info(token)
            .await
            .context("failed to fetch user info")?;

        let course = match self
            .deps
            .courses
            .find(slot.sub_id)
            .await
            .context("failed to load course")?
        {
            Some(course) if course.has_video() => course,
            Some(mut course) => {
                // Known row without a recording; the video may have
                // appeared in the listing since.
                let Some(live) = self.search_listing(token, slot).await? else {
                    return Ok(None);
                };
                self.deps
                    .courses
                    .update_video(slot.sub_id, &live.video)
                    .await
                    .context("failed to refresh video url")?;
                course.video = live.video;
                course
            }
            None => {
                let Some(live) = self.search_listing(token, slot).await? else {
                    return Ok(None);
                };
                let course = row_from_listing(slot, live);
                self.deps
                    .courses
                    .save(&course)
                    .await
                    .context("failed to save course")?;
                info!(
                    sub_id = slot.sub_id,
                    course_id = slot.course_id,
                    course_name,
                    "course row created from the live listing"
                );
                course
            }
        };

        let summary = self.summary_view(&course, &user.account).await?;
        let video = if course.has_video() {
            self.signed_video_url(token, slot, &course, &user).await?
        } else {
            String::new()
        };

        Ok(Some(CourseView {
            course_id: course.course_id,
            sub_id: course.sub_id,
            name: course.name,
            teacher: course.teacher,
            location: course.location,
            date: course.date,
            time: course.time,
            video,
            asr: course.asr,
            summary,
        }))
    }

    async fn search_listing(
        &self,
        token: &str,
        slot: ScheduledCourse,
    ) -> Result<Option<LiveCourse>> {
        self.deps
            .live_courses
            .search(token, slot.sub_id, slot.course_id)
            .await
            .context("failed to search the live course listing")
    }

    async fn summary_view(&self, course: &Course, account: &str) -> Result<SummaryView> {
        let rows = self
            .deps
            .summaries
            .find_by_sub_id_and_user(course.sub_id, account)
            .await
            .context("failed to list summary rows")?;

        Ok(match rows.into_iter().next() {
            Some(newest) => {
                // A per-user row exists from the moment regeneration is
                // queued; it counts as finished once the text has landed.
                let status = if newest.summary.is_empty() {
                    SUMMARY_STATUS_GENERATING
                } else {
                    SUMMARY_STATUS_FINISHED
                };
                SummaryView {
                    status: status.to_string(),
                    data: newest.summary,
                    model: newest.model,
                    token: newest.token.to_string(),
                }
            }
            None => SummaryView {
                status: course.summary_status.clone(),
                data: course.summary_data.clone(),
                model: course.model.clone(),
                token: course.token.to_string(),
            },
        })
    }

    async fn signed_video_url(
        &self,
        token: &str,
        slot: ScheduledCourse,
        course: &Course,
        user: &UserInfo,
    ) -> Result<String> {
        let auth_key = self
            .deps
            .video_auth
            .auth_key(token, slot.course_id, slot.sub_id)
            .await
            .context("failed to fetch video auth key")?;
        let path = url_path_of(&course.video)?;
        let query = video_auth_query(
            &auth_key,
            &path,
            user.id,
            user.tenant_id,
            &user.phone,
            Utc::now().timestamp(),
        );
        Ok(format!("{}?{query}", course.video))
    }
}

/// The new row is keyed on the timetable's ids; the listing only supplies
/// the descriptive fields.
fn row_from_listing(slot: ScheduledCourse, live: LiveCourse) -> Course {
    Course {
        sub_id: slot.sub_id,
        course_id: slot.course_id,
        name: live.name,
        teacher: live.teacher,
        location: live.location,
        date: live.date,
        time: live.time,
        video: live.video,
        ..Course::default()
    }
}
