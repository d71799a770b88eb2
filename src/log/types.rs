//! Execution log data model and trait
//!
//! Mirrors the teacher crate's `persistence::store` module: a plain data
//! model, a `thiserror` error enum, and an `async_trait` store interface with
//! both a production and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::FlowId;

/// Error type for execution log operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row was expected to exist but does not.
    #[error("invocation not found: flow {0} step {1}")]
    NotFound(FlowId, u32),

    /// The underlying database failed to read or write.
    #[error("database error: {0}")]
    Database(String),
}

/// Status of one [`Invocation`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Started but not yet completed, and not currently parked on a signal.
    Pending,
    /// Started, and currently parked awaiting an external `RESUME`.
    WaitingForSignal,
    /// Completed successfully; `return_value` is populated.
    Complete,
}

/// A single persisted attempt of a flow method or step method within a flow.
///
/// Primary key: `(flow_id, step)`. See the crate-level documentation for the
/// full set of invariants this row must uphold across its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub flow_id: FlowId,
    pub step: u32,
    pub timestamp: DateTime<Utc>,
    pub class_name: String,
    pub method_name: String,
    pub delay_millis: Option<i64>,
    pub status: InvocationStatus,
    pub attempts: u32,
    pub parameters: Vec<u8>,
    pub return_value: Option<Vec<u8>>,
}

/// Durable store of [`Invocation`] rows.
///
/// Each operation executes as its own atomic transaction. Implementations
/// must be safe to share across concurrently running flows (distinct
/// `flow_id`s never interfere).
#[async_trait]
pub trait ExecutionLog: Send + Sync + 'static {
    /// Insert a new row for `(flow_id, step)`, or — on primary-key conflict —
    /// atomically increment `attempts` and refresh `timestamp` and `status`
    /// without touching `parameters`, `class_name`, `method_name`, or
    /// `delay_millis`.
    async fn log_start(
        &self,
        flow_id: FlowId,
        step: u32,
        class_name: &str,
        method_name: &str,
        delay_millis: Option<i64>,
        status: InvocationStatus,
        parameters: Vec<u8>,
    ) -> Result<Invocation, StoreError>;

    /// Mark a row complete with its return value. Fails with
    /// [`StoreError::NotFound`] if the row is absent.
    async fn log_completion(
        &self,
        flow_id: FlowId,
        step: u32,
        return_value: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Exact lookup by primary key.
    async fn get_invocation(
        &self,
        flow_id: FlowId,
        step: u32,
    ) -> Result<Option<Invocation>, StoreError>;

    /// The row with the highest `step` for this flow.
    async fn get_latest_invocation(
        &self,
        flow_id: FlowId,
    ) -> Result<Option<Invocation>, StoreError>;

    /// All `step = 0` rows with `status != Complete`, ordered by ascending
    /// `timestamp` — the top-level flows Recovery must re-dispatch.
    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError>;

    /// Drop all rows. Test/admin only.
    async fn reset(&self) -> Result<(), StoreError>;
}
