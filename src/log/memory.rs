//! In-memory implementation of `ExecutionLog` for testing
//!
//! Mirrors the teacher crate's `InMemoryWorkflowEventStore`: same trait, same
//! semantics, backed by a `parking_lot::RwLock<HashMap<..>>` instead of a
//! database connection pool.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::types::{ExecutionLog, Invocation, InvocationStatus, StoreError};
use crate::ids::FlowId;

/// In-memory `ExecutionLog`.
///
/// This is primarily for unit tests: it provides the same semantics as
/// [`crate::log::sqlite::SqliteExecutionLog`] without touching the
/// filesystem.
///
/// # Example
///
/// ```
/// use duraflow::log::InMemoryExecutionLog;
///
/// let log = InMemoryExecutionLog::new();
/// ```
#[derive(Default)]
pub struct InMemoryExecutionLog {
    rows: RwLock<HashMap<(FlowId, u32), Invocation>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
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
        let mut rows = self.rows.write();
        let now = Utc::now();
        let entry = rows.entry((flow_id, step));
        let row = match entry {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let row = occupied.get_mut();
                row.attempts += 1;
                row.timestamp = now;
                row.status = status;
                row.clone()
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let row = Invocation {
                    flow_id,
                    step,
                    timestamp: now,
                    class_name: class_name.to_string(),
                    method_name: method_name.to_string(),
                    delay_millis,
                    status,
                    attempts: 1,
                    parameters,
                    return_value: None,
                };
                vacant.insert(row.clone());
                row
            }
        };
        Ok(row)
    }

    async fn log_completion(
        &self,
        flow_id: FlowId,
        step: u32,
        return_value: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&(flow_id, step))
            .ok_or(StoreError::NotFound(flow_id, step))?;
        row.status = InvocationStatus::Complete;
        row.return_value = Some(return_value);
        Ok(())
    }

    async fn get_invocation(
        &self,
        flow_id: FlowId,
        step: u32,
    ) -> Result<Option<Invocation>, StoreError> {
        Ok(self.rows.read().get(&(flow_id, step)).cloned())
    }

    async fn get_latest_invocation(
        &self,
        flow_id: FlowId,
    ) -> Result<Option<Invocation>, StoreError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| row.flow_id == flow_id)
            .max_by_key(|row| row.step)
            .cloned())
    }

    async fn get_incomplete_flows(&self) -> Result<Vec<Invocation>, StoreError> {
        let mut rows: Vec<Invocation> = self
            .rows
            .read()
            .values()
            .filter(|row| row.step == 0 && row.status != InvocationStatus::Complete)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.timestamp);
        Ok(rows)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.rows.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid() -> FlowId {
        uuid::Uuid::new_v4().into()
    }

    #[tokio::test]
    async fn log_start_creates_row_with_one_attempt() {
        let log = InMemoryExecutionLog::new();
        let id = fid();
        let row = log
            .log_start(
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
        assert_eq!(row.attempts, 1);
        assert_eq!(row.status, InvocationStatus::Pending);
    }

    #[tokio::test]
    async fn log_start_on_conflict_bumps_attempts_but_keeps_parameters() {
        let log = InMemoryExecutionLog::new();
        let id = fid();
        log.log_start(
            id,
            0,
            "Hello",
            "hello",
            None,
            InvocationStatus::Pending,
            b"[1]".to_vec(),
        )
        .await
        .unwrap();
        let second = log
            .log_start(
                id,
                0,
                "Hello",
                "hello",
                None,
                InvocationStatus::Pending,
                b"[2]".to_vec(),
            )
            .await
            .unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.parameters, b"[1]".to_vec());
    }

    #[tokio::test]
    async fn completion_requires_existing_row() {
        let log = InMemoryExecutionLog::new();
        let err = log.log_completion(fid(), 0, vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_, 0)));
    }

    #[tokio::test]
    async fn get_latest_invocation_picks_highest_step() {
        let log = InMemoryExecutionLog::new();
        let id = fid();
        for step in 0..3 {
            log.log_start(
                id,
                step,
                "Hello",
                "say",
                None,
                InvocationStatus::Pending,
                vec![],
            )
            .await
            .unwrap();
        }
        let latest = log.get_latest_invocation(id).await.unwrap().unwrap();
        assert_eq!(latest.step, 2);
    }

    #[tokio::test]
    async fn incomplete_flows_excludes_completed_and_non_root_rows() {
        let log = InMemoryExecutionLog::new();
        let complete_flow = fid();
        let incomplete_flow = fid();

        log.log_start(
            complete_flow,
            0,
            "Hello",
            "hello",
            None,
            InvocationStatus::Pending,
            vec![],
        )
        .await
        .unwrap();
        log.log_completion(complete_flow, 0, vec![]).await.unwrap();

        log.log_start(
            incomplete_flow,
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
            incomplete_flow,
            1,
            "Hello",
            "say",
            None,
            InvocationStatus::Pending,
            vec![],
        )
        .await
        .unwrap();

        let incomplete = log.get_incomplete_flows().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].flow_id, incomplete_flow);
    }
}
