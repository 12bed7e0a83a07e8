// SQLite JobRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use cratedig_core::domain::{Job, JobId, JobPayload, JobState, JobType};
use cratedig_core::error::Result;
use cratedig_core::port::JobRepository;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Jobs table adapter
///
/// Every transition is a single conditional UPDATE, so two workers racing on the
/// same row cannot both win.
#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, job_type, payload, state, progress, cancel_requested, detail,
                created_at, updated_at, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.job_type.as_str())
        .bind(job.payload.as_value().to_string())
        .bind(job.state.as_str())
        .bind(job.progress.to_string())
        .bind(job.cancel_requested)
        .bind(&job.detail)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'running', started_at = ?, updated_at = ?
            WHERE id = ? AND state = 'queued'
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(now_millis)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update_progress(
        &self,
        id: &JobId,
        progress: &serde_json::Value,
        now_millis: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = ?, updated_at = ? WHERE id = ? AND state = 'running'",
        )
        .bind(progress.to_string())
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET cancel_requested = 1, updated_at = ?
            WHERE id = ? AND state IN ('queued', 'running')
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn finish(
        &self,
        id: &JobId,
        state: JobState,
        detail: Option<&str>,
        now_millis: i64,
    ) -> Result<bool> {
        if !state.is_terminal() {
            return Ok(false);
        }

        // Only a cancel can retire a job that never ran
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, detail = ?, finished_at = ?, updated_at = ?
            WHERE id = ?
              AND (state = 'running' OR (state = 'queued' AND ? = 'cancelled'))
            "#,
        )
        .bind(state.as_str())
        .bind(detail)
        .bind(now_millis)
        .bind(now_millis)
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_cancel_requested(&self, id: &JobId) -> Result<Option<bool>> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(flag)
    }

    async fn next_queued(&self, limit: usize, skip_types: &[String]) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM jobs WHERE state = 'queued'");
        if !skip_types.is_empty() {
            builder.push(" AND job_type NOT IN (");
            let mut separated = builder.separated(", ");
            for job_type in skip_types {
                separated.push_bind(job_type);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build_query_as::<JobRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn count_by_state(&self, state: JobState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    payload: String,
    state: String,
    progress: String,
    cancel_requested: bool,
    detail: Option<String>,
    created_at: i64,
    updated_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            state: self.state.parse()?,
            payload: JobPayload::new(serde_json::from_str(&self.payload)?),
            progress: serde_json::from_str(&self.progress)?,
            id: self.id,
            job_type: JobType::new(self.job_type),
            cancel_requested: self.cancel_requested,
            detail: self.detail,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}
