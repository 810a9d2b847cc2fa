use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::models::{SummaryRecord, token_from_db};

/// Read/write access to per-user summary rows.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Returns the user's summary rows for one lecture, newest first.
    async fn find_by_sub_id_and_user(&self, sub_id: i64, user: &str)
    -> Result<Vec<SummaryRecord>>;

    async fn save(&self, record: &SummaryRecord) -> Result<()>;

    /// Overwrites the row identified by `(user, sub_id, created_at)`.
    async fn update(&self, record: &SummaryRecord) -> Result<()>;

    /// Inserts a fresh empty row for `(sub_id, user)` and returns it; the
    /// regeneration flow fills it in afterwards.
    async fn init_new_summary(&self, sub_id: i64, user: &str) -> Result<SummaryRecord>;
}

pub struct PgSummaryStore {
    pool: PgPool,
}

impl PgSummaryStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<SummaryRecord> {
    let token: i64 = row.try_get("token").context("failed to read token")?;
    Ok(SummaryRecord {
        user: row.try_get("summary_user").context("failed to read user")?,
        sub_id: row.try_get("sub_id").context("failed to read sub_id")?,
        created_at: row
            .try_get("created_at")
            .context("failed to read created_at")?,
        summary: row
            .try_get("summary_data")
            .context("failed to read summary_data")?,
        model: row.try_get("model").context("failed to read model")?,
        token: token_from_db(token),
    })
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    async fn find_by_sub_id_and_user(
        &self,
        sub_id: i64,
        user: &str,
    ) -> Result<Vec<SummaryRecord>> {
        let rows = sqlx::query(
            r"
            SELECT summary_user, sub_id, created_at,
                   COALESCE(summary_data, '') AS summary_data,
                   COALESCE(model, '') AS model,
                   COALESCE(token, 0) AS token
            FROM summary
            WHERE sub_id = $1 AND summary_user = $2
            ORDER BY created_at DESC
            ",
        )
        .bind(sub_id)
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .context("failed to query summary rows")?;

        rows.iter().map(record_from_row).collect()
    }

    async fn save(&self, record: &SummaryRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO summary (summary_user, sub_id, created_at, summary_data, model, token)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&record.user)
        .bind(record.sub_id)
        .bind(record.created_at)
        .bind(&record.summary)
        .bind(&record.model)
        .bind(i64::from(record.token))
        .execute(&self.pool)
        .await
        .context("failed to insert summary row")?;
        Ok(())
    }

    async fn update(&self, record: &SummaryRecord) -> Result<()> {
        sqlx::query(
            r"
            UPDATE summary
            SET summary_data = $4, model = $5, token = $6
            WHERE summary_user = $1 AND sub_id = $2 AND created_at = $3
            ",
        )
        .bind(&record.user)
        .bind(record.sub_id)
        .bind(record.created_at)
        .bind(&record.summary)
        .bind(&record.model)
        .bind(i64::from(record.token))
        .execute(&self.pool)
        .await
        .context("failed to update summary row")?;
        Ok(())
    }

    async fn init_new_summary(&self, sub_id: i64, user: &str) -> Result<SummaryRecord> {
        let record = SummaryRecord {
            user: user.to_string(),
            sub_id,
            created_at: pg_timestamp(Utc::now()),
            summary: String::new(),
            model: String::new(),
            token: 0,
        };
        self.save(&record).await?;
        Ok(record)
    }
}

/// Truncates `created_at` to whole microseconds so a value written to
/// Postgres (microsecond precision) compares equal after a read-back.
#[must_use]
pub fn pg_timestamp(value: DateTime<Utc>) -> DateTime<Utc> {
    let micros = value.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(value)
}
