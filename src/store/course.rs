use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::models::{Course, token_from_db};

/// Read/write access to lecture session rows.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find(&self, sub_id: i64) -> Result<Option<Course>>;

    /// Upserts the whole row, keyed on `sub_id`.
    async fn save(&self, course: &Course) -> Result<()>;

    async fn update_video(&self, sub_id: i64, video: &str) -> Result<()>;

    async fn update_audio_id(&self, sub_id: i64, audio_id: &str) -> Result<()>;

    async fn update_asr(&self, sub_id: i64, asr: &str) -> Result<()>;

    async fn update_summary_status(&self, sub_id: i64, status: &str) -> Result<()>;

    /// Atomically writes the finished summary together with its metadata
    /// and flips `summary_status` to `finished` in one statement.
    async fn update_summary(
        &self,
        sub_id: i64,
        summary: &str,
        model: &str,
        token: u32,
        user: &str,
    ) -> Result<()>;
}

pub struct PgCourseStore {
    pool: PgPool,
}

impl PgCourseStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseStore for PgCourseStore {
    async fn find(&self, sub_id: i64) -> Result<Option<Course>> {
        let row = sqlx::query(
            r"
            SELECT sub_id, course_id, name, teacher, location, date, time,
                   COALESCE(video, '') AS video,
                   COALESCE(audio_id, '') AS audio_id,
                   COALESCE(asr, '') AS asr,
                   COALESCE(summary_status, '') AS summary_status,
                   COALESCE(summary_data, '') AS summary_data,
                   COALESCE(model, '') AS model,
                   COALESCE(token, 0) AS token,
                   COALESCE(summary_user, '') AS summary_user
            FROM course
            WHERE sub_id = $1
            ",
        )
        .bind(sub_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query course")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token: i64 = row.try_get("token").context("failed to read token")?;
        Ok(Some(Course {
            sub_id: row.try_get("sub_id").context("failed to read sub_id")?,
            course_id: row
                .try_get("course_id")
                .context("failed to read course_id")?,
            name: row.try_get("name").context("failed to read name")?,
            teacher: row.try_get("teacher").context("failed to read teacher")?,
            location: row
                .try_get("location")
                .context("failed to read location")?,
            date: row.try_get("date").context("failed to read date")?,
            time: row.try_get("time").context("failed to read time")?,
            video: row.try_get("video").context("failed to read video")?,
            audio_id: row
                .try_get("audio_id")
                .context("failed to read audio_id")?,
            asr: row.try_get("asr").context("failed to read asr")?,
            summary_status: row
                .try_get("summary_status")
                .context("failed to read summary_status")?,
            summary_data: row
                .try_get("summary_data")
                .context("failed to read summary_data")?,
            model: row.try_get("model").context("failed to read model")?,
            token: token_from_db(token),
            summary_user: row
                .try_get("summary_user")
                .context("failed to read summary_user")?,
        }))
    }

    async fn save(&self, course: &Course) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO course
                (sub_id, course_id, name, teacher, location, date, time, video,
                 audio_id, asr, summary_status, summary_data, model, token, summary_user)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (sub_id) DO UPDATE SET
                course_id = EXCLUDED.course_id,
                name = EXCLUDED.name,
                teacher = EXCLUDED.teacher,
                location = EXCLUDED.location,
                date = EXCLUDED.date,
                time = EXCLUDED.time,
                video = EXCLUDED.video,
                audio_id = EXCLUDED.audio_id,
                asr = EXCLUDED.asr,
                summary_status = EXCLUDED.summary_status,
                summary_data = EXCLUDED.summary_data,
                model = EXCLUDED.model,
                token = EXCLUDED.token,
                summary_user = EXCLUDED.summary_user
            ",
        )
        .bind(course.sub_id)
        .bind(course.course_id)
        .bind(&course.name)
        .bind(&course.teacher)
        .bind(&course.location)
        .bind(&course.date)
        .bind(&course.time)
        .bind(&course.video)
        .bind(&course.audio_id)
        .bind(&course.asr)
        .bind(&course.summary_status)
        .bind(&course.summary_data)
        .bind(&course.model)
        .bind(i64::from(course.token))
        .bind(&course.summary_user)
        .execute(&self.pool)
        .await
        .context("failed to upsert course")?;
        Ok(())
    }

    async fn update_video(&self, sub_id: i64, video: &str) -> Result<()> {
        sqlx::query("UPDATE course SET video = $2 WHERE sub_id = $1")
            .bind(sub_id)
            .bind(video)
            .execute(&self.pool)
            .await
            .context("failed to update video url")?;
        Ok(())
    }

    async fn update_audio_id(&self, sub_id: i64, audio_id: &str) -> Result<()> {
        sqlx::query("UPDATE course SET audio_id = $2 WHERE sub_id = $1")
            .bind(sub_id)
            .bind(audio_id)
            .execute(&self.pool)
            .await
            .context("failed to update audio_id")?;
        Ok(())
    }

    async fn update_asr(&self, sub_id: i64, asr: &str) -> Result<()> {
        sqlx::query("UPDATE course SET asr = $2 WHERE sub_id = $1")
            .bind(sub_id)
            .bind(asr)
            .execute(&self.pool)
            .await
            .context("failed to update asr transcript")?;
        Ok(())
    }

    async fn update_summary_status(&self, sub_id: i64, status: &str) -> Result<()> {
        sqlx::query("UPDATE course SET summary_status = $2 WHERE sub_id = $1")
            .bind(sub_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .context("failed to update summary_status")?;
        Ok(())
    }

    async fn update_summary(
        &self,
        sub_id: i64,
        summary: &str,
        model: &str,
        token: u32,
        user: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE course
            SET summary_data = $2,
                model = $3,
                token = $4,
                summary_user = $5,
                summary_status = 'finished'
            WHERE sub_id = $1
            ",
        )
        .bind(sub_id)
        .bind(summary)
        .bind(model)
        .bind(i64::from(token))
        .bind(user)
        .execute(&self.pool)
        .await
        .context("failed to store finished summary")?;
        Ok(())
    }
}
