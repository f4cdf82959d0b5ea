/// Run ledger
///
/// One row per dispatched unit. The triggering actor only ever sees
/// "accepted", so this table together with the logs is where the final
/// outcome of a run can be looked up.
use super::now_secs;
use anyhow::{Context, Result};
use sdk::{Outcome, OutcomeStatus, TrackedItem};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Run status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "queued" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "skipped" => RunStatus::Skipped,
            _ => RunStatus::Failed,
        }
    }
}

impl From<OutcomeStatus> for RunStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Success => RunStatus::Succeeded,
            OutcomeStatus::Failed => RunStatus::Failed,
            OutcomeStatus::Skipped => RunStatus::Skipped,
        }
    }
}

/// Run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub item_id: String,
    pub item_ref: String,
    pub source: String,
    pub job: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub failure: Option<String>,
    pub stage_count: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

const RUN_COLUMNS: &str = "id, item_id, item_ref, source, job, status, message, failure, \
     stage_count, created_at, started_at, completed_at, duration_ms";

fn run_from_row(r: &SqliteRow) -> Run {
    Run {
        id: r.get("id"),
        item_id: r.get("item_id"),
        item_ref: r.get("item_ref"),
        source: r.get("source"),
        job: r.get("job"),
        status: RunStatus::parse(&r.get::<String, _>("status")),
        message: r.get("message"),
        failure: r.get("failure"),
        stage_count: r.get("stage_count"),
        created_at: r.get("created_at"),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
        duration_ms: r.get("duration_ms"),
    }
}

/// Run repository for database operations
#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly accepted unit
    pub async fn create_run(&self, run_id: &str, item: &TrackedItem, job: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query(
            "INSERT INTO runs (id, item_id, item_ref, source, job, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(&item.id)
        .bind(item.display_ref())
        .bind(item.source.as_str())
        .bind(job)
        .bind(RunStatus::Queued.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create run")?;

        Ok(())
    }

    /// Mark a run as picked up by a worker
    pub async fn mark_running(&self, run_id: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query("UPDATE runs SET status = ?, started_at = ? WHERE id = ?")
            .bind(RunStatus::Running.as_str())
            .bind(now)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark run as running")?;

        Ok(())
    }

    /// Record the final outcome of a run
    pub async fn complete_run(&self, run_id: &str, outcome: &Outcome, duration_ms: i64) -> Result<()> {
        let now = now_secs()?;
        let status = RunStatus::from(outcome.status);
        let stage_count = if outcome.stages.is_empty() {
            None
        } else {
            Some(outcome.stages.len() as i64)
        };

        sqlx::query(
            "UPDATE runs SET status = ?, message = ?, failure = ?, stage_count = ?,
                 completed_at = ?, duration_ms = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&outcome.message)
        .bind(outcome.failure.map(|f| f.as_str()))
        .bind(stage_count)
        .bind(now)
        .bind(duration_ms)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete run")?;

        Ok(())
    }

    /// Record a run that died without producing an outcome
    pub async fn fail_run(&self, run_id: &str, message: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query("UPDATE runs SET status = ?, message = ?, completed_at = ? WHERE id = ?")
            .bind(RunStatus::Failed.as_str())
            .bind(message)
            .bind(now)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark run as failed")?;

        Ok(())
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?", RUN_COLUMNS))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch run")?;

        Ok(row.as_ref().map(run_from_row))
    }

    /// Most recent runs first
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?",
            RUN_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent runs")?;

        Ok(rows.iter().map(run_from_row).collect())
    }
}
