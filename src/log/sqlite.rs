//! SQLite implementation of `ExecutionLog`
//!
//! Production-ready persistence using an embedded SQLite database, configured
//! for durability under crash: write-ahead logging, `synchronous = NORMAL`,
//! and a bounded busy-timeout so concurrent single-row operations on distinct
//! keys don't stall each other. Mirrors the teacher crate's
//! `PostgresWorkflowEventStore` — same trait, same `#[instrument]` /
//! `sqlx::query().bind()` idiom, adapted from `PgPool` to `SqlitePool`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::types::{ExecutionLog, Invocation, InvocationStatus, StoreError};
use crate::ids::FlowId;

/// SQLite-backed `ExecutionLog`.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), duraflow::log::StoreError> {
/// use duraflow::log::SqliteExecutionLog;
///
/// let log = SqliteExecutionLog::connect("execution_log.db").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteExecutionLog {
    pool: SqlitePool,
}

impl SqliteExecutionLog {
    /// Open (creating if absent) the database file at `path` with default
    /// durability settings (5s busy-timeout, 8 pooled connections).
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::connect_configured(path, Duration::from_secs(5), 8).await
    }

    /// Open (creating if absent) the database file at `path`, apply the
    /// durability pragmas, and ensure the schema exists.
    pub async fn connect_configured(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let log = Self { pool };
        log.ensure_schema().await?;
        Ok(log)
    }

    /// Wrap an already-configured pool (e.g. an in-memory `sqlite::memory:`
    /// pool used by integration tests that still want the real SQL code
    /// path).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let log = Self { pool };
        log.ensure_schema().await?;
        Ok(log)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS invocations (
                flow_id       TEXT    NOT NULL,
                step          INTEGER NOT NULL,
                timestamp     TEXT    NOT NULL,
                class_name    TEXT    NOT NULL,
                method_name   TEXT    NOT NULL,
                delay_millis  INTEGER,
                status        TEXT    NOT NULL,
                attempts      INTEGER NOT NULL,
                parameters    BLOB    NOT NULL,
                return_value  BLOB,
                PRIMARY KEY (flow_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionLog for SqliteExecutionLog {
    #[instrument(skip(self, parameters))]
    async fn log_start(
        &self,
        flow_id: FlowId,
        step: u32,
        class_name: &str,
        method_name: &str,
        delay_millis: Option<i64>,
        status: InvocationStatus,
        parameters: Vec<u8>,
    ) -> Result<Invocation, StoreError> {
        let flow_id_str = Uuid::from(flow_id).to_string();
        let now = Utc::now();
        let status_str = status_to_str(status);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO invocations
                (flow_id, step, timestamp, class_name, method_name, delay_millis, status, attempts, parameters, return_value)
            VALUES
                (?, ?, ?, ?, ?, ?, ?, 1, ?, NULL)
            ON CONFLICT(flow_id, step) DO UPDATE SET
                attempts = attempts + 1,
                timestamp = excluded.timestamp,
                status = excluded.status
            "#,
        )
        .bind(&flow_id_str)
        .bind(step as i64)
        .bind(now.to_rfc3339())
        .bind(class_name)
        .bind(method_name)
        .bind(delay_millis)
        .bind(status_str)
        .bind(&parameters)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("failed to log start: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let row = sqlx::query(
            r#"
            SELECT flow_id, step, timestamp, class_name, method_name, delay_millis, status, attempts, parameters, return_value
            FROM invocations WHERE flow_id = ? AND step = ?
            "#,
        )
        .bind(&flow_id_str)
        .bind(step as i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(%flow_id, step, "logged start attempt");
        row_to_invocation(row)
    }

    #[instrument(skip(self, return_value))]
    async fn log_completion(
        &self,
        flow_id: FlowId,
        step: u32,
        return_value: Vec<u8>,
    ) -> Result<(), StoreError> {
        let flow_id_str = Uuid::from(flow_id).to_string();
        let result = sqlx::query(
            r#"
            UPDATE invocations SET status = ?, return_value = ?
            WHERE flow_id = ? AND step = ?
            "#,
        )
        .bind(status_to_str(InvocationStatus::Complete))
        .bind(&return_value)
        .bind(&flow_id_str)
        .bind(step as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(flow_id, step));
        }

        debug!(%flow_id, step, "logged completion");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_invocation(
        &self,
        flow_id: FlowId,
        step: u32,
    ) -> Result<Option<Invocation>, StoreError> {
        let flow_id_str = Uuid::from(flow_id).to_string();
        let row = sqlx::query(
            r#"
            SELECT flow_id, step, timestamp, class_name, method_name, delay_millis, status, attempts, parameters, return_value
            FROM invocations WHERE flow_id = ? AND step = ?
            "#,
        )
        .bind(&flow_id_str)
        .bind(step as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(row_to_invocation).transpose()
    }

    #[instrument(skip(self))]
    async fn get_latest_invocation(
        &self,
        flow_id: FlowId,
    ) -> Result<Option<Invocation>, StoreError> {
        let flow_id_str = Uuid::from(flow_id).to_string();
        let row = sqlx::query(
            r#"
            SELECT flow_id, step, timestamp, class_name, method_name, delay_millis, status, attempts, parameters, return_value
            FROM invocations WHERE flow_id = ? ORDER BY step DESC LIMIT 1
            "#,
        )
        .bind(&flow_id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(row_to_invocation).transpose()
    }

    #[instrument(skip(self))]
    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT flow_id, step, timestamp, class_name, method_name, delay_millis, status, attempts, parameters, return_value
            FROM invocations WHERE step = 0 AND status != ? ORDER BY timestamp ASC
            "#,
        )
        .bind(status_to_str(InvocationStatus::Complete))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_invocation).collect()
    }

    #[instrument(skip(self))]
    async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invocations")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

fn status_to_str(status: InvocationStatus) -> &'static str {
    match status {
        InvocationStatus::Pending => "pending",
        InvocationStatus::WaitingForSignal => "waiting_for_signal",
        InvocationStatus::Complete => "complete",
    }
}

fn str_to_status(s: &str) -> Result<InvocationStatus, StoreError> {
    match s {
        "pending" => Ok(InvocationStatus::Pending),
        "waiting_for_signal" => Ok(InvocationStatus::WaitingForSignal),
        "complete" => Ok(InvocationStatus::Complete),
        other => Err(StoreError::Database(format!("unknown status: {other}"))),
    }
}

fn row_to_invocation(row: sqlx::sqlite::SqliteRow) -> Result<Invocation, StoreError> {
    let flow_id_str: String = row.get("flow_id");
    let flow_id: FlowId = Uuid::parse_str(&flow_id_str)
        .map_err(|e| StoreError::Database(e.to_string()))?
        .into();
    let status_str: String = row.get("status");
    let timestamp_str: String = row.get("timestamp");
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|e| StoreError::Database(e.to_string()))?
        .with_timezone(&Utc);

    Ok(Invocation {
        flow_id,
        step: row.get::<i64, _>("step") as u32,
        timestamp,
        class_name: row.get("class_name"),
        method_name: row.get("method_name"),
        delay_millis: row.get("delay_millis"),
        status: str_to_status(&status_str)?,
        attempts: row.get::<i64, _>("attempts") as u32,
        parameters: row.get("parameters"),
        return_value: row.get("return_value"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (SqliteExecutionLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execution_log.db");
        let log = SqliteExecutionLog::connect(path).await.unwrap();
        (log, dir)
    }

    #[tokio::test]
    async fn log_start_persists_across_reconnect() {
        let (log, dir) = open_temp().await;
        let id: FlowId = Uuid::new_v4().into();
        log.log_start(
            id,
            0,
            "Hello",
            "hello",
            None,
            InvocationStatus::Pending,
            b"[]".to_vec(),
        )
        .await
        .unwrap();
        drop(log);

        let path = dir.path().join("execution_log.db");
        let reopened = SqliteExecutionLog::connect(path).await.unwrap();
        let row = reopened.get_invocation(id, 0).await.unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.class_name, "Hello");
    }

    #[tokio::test]
    async fn conflict_increments_attempts_and_keeps_parameters() {
        let (log, _dir) = open_temp().await;
        let id: FlowId = Uuid::new_v4().into();
        log.log_start(
            id,
            1,
            "Hello",
            "say",
            None,
            InvocationStatus::Pending,
            b"[\"World\",0]".to_vec(),
        )
        .await
        .unwrap();
        let second = log
            .log_start(
                id,
                1,
                "Hello",
                "say",
                None,
                InvocationStatus::Pending,
                b"[\"World\",0]".to_vec(),
            )
            .await
            .unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.parameters, b"[\"World\",0]".to_vec());
    }

    #[tokio::test]
    async fn completion_on_missing_row_fails() {
        let (log, _dir) = open_temp().await;
        let err = log
            .log_completion(Uuid::new_v4().into(), 0, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_, 0)));
    }

    #[tokio::test]
    async fn get_incomplete_flows_orders_by_timestamp() {
        let (log, _dir) = open_temp().await;
        let first: FlowId = Uuid::new_v4().into();
        let second: FlowId = Uuid::new_v4().into();

        log.log_start(
            first,
            0,
            "Hello",
            "hello",
            None,
            InvocationStatus::Pending,
            vec![],
        )
        .await
        .unwrap();
        log.log_start(
            second,
            0,
            "Hello",
            "hello",
            None,
            InvocationStatus::Pending,
            vec![],
        )
        .await
        .unwrap();

        let incomplete = log.get_incomplete_flows().await.unwrap();
        assert_eq!(incomplete.len(), 2);
        assert_eq!(incomplete[0].flow_id, first);
        assert_eq!(incomplete[1].flow_id, second);
    }
}
