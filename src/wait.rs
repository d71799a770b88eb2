//! Wait registry
//!
//! A process-wide map from `flow_id` to a suspension primitive, lazily
//! created on first use. Grounded on the teacher crate's (already-declared
//! but unused in the distilled core) `dashmap` dependency; the mutex +
//! condition pair the specification calls for is realized as
//! `parking_lot::Mutex<Option<Vec<u8>>>` plus `tokio::sync::Notify`, the
//! cooperative-task-safe substitute for a blocking condvar — `Notify` stores
//! a wake permit, so a `signal` that arrives before the corresponding `wait`
//! call is not lost.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::ids::FlowId;

struct WaitEntry {
    resume_args: Mutex<Option<Vec<u8>>>,
    notify: Notify,
}

impl WaitEntry {
    fn new() -> Self {
        Self {
            resume_args: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

/// Process-wide `flow_id -> suspension primitive` map.
///
/// Entries outlive their first use (idempotent on repeat signal/wait of the
/// same `flow_id`, matching the specification's "may remain after resume"
/// allowance) and are never removed; a process that awaits-and-resumes the
/// same flow many times reuses the same entry.
#[derive(Default)]
pub struct WaitRegistry {
    entries: DashMap<FlowId, Arc<WaitEntry>>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for(&self, id: FlowId) -> Arc<WaitEntry> {
        self.entries
            .entry(id)
            .or_insert_with(|| Arc::new(WaitEntry::new()))
            .clone()
    }

    /// Park until a matching [`Self::signal`] delivers resume arguments.
    pub async fn wait(&self, id: FlowId) -> Vec<u8> {
        let entry = self.entry_for(id);
        loop {
            if let Some(args) = entry.resume_args.lock().take() {
                return args;
            }
            entry.notify.notified().await;
        }
    }

    /// Deliver resume arguments to the task parked on `id`, creating the
    /// entry if no task has waited on it yet.
    pub fn signal(&self, id: FlowId, args: Vec<u8>) {
        let entry = self.entry_for(id);
        *entry.resume_args.lock() = Some(args);
        entry.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn signal_before_wait_is_not_lost() {
        let registry = WaitRegistry::new();
        let id: FlowId = Uuid::new_v4().into();
        registry.signal(id, b"early".to_vec());
        let args = registry.wait(id).await;
        assert_eq!(args, b"early".to_vec());
    }

    #[tokio::test]
    async fn wait_then_signal_wakes_the_waiter() {
        let registry = Arc::new(WaitRegistry::new());
        let id: FlowId = Uuid::new_v4().into();

        let waiter = tokio::spawn({
            let registry = registry.clone();
            async move { registry.wait(id).await }
        });

        tokio::task::yield_now().await;
        registry.signal(id, b"later".to_vec());

        let args = waiter.await.unwrap();
        assert_eq!(args, b"later".to_vec());
    }
}
