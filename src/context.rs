//! Call context
//!
//! A task-scoped ambient value carrying the current call mode down the call
//! stack. The teacher crate threads an explicit `ActivityContext` through
//! every call site; here the equivalent ambient value is carried with
//! `tokio::task_local!`, the async-idiomatic analogue — set once at the entry
//! point established by a [`crate::handle::FlowHandle`] operation, read by the
//! [`crate::interceptor::Interceptor`] on any frame logically inside that
//! call, and invisible to unrelated concurrent tasks.

use crate::error::EngineError;

/// The three modes a call into the interceptor can be dispatched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Ordinary orchestration: replay if the row is complete, otherwise
    /// execute or retry.
    Run,
    /// Establish a suspension point: the current step call is expected to
    /// block until a matching `RESUME` delivers its arguments.
    Await,
    /// Deliver a previously parked await: the current step call is expected
    /// to match the latest `WAITING_FOR_SIGNAL` row and signal it rather than
    /// execute a body.
    Resume,
}

/// The ambient value carried for the dynamic extent of one user-initiated
/// call into a flow proxy.
#[derive(Debug, Clone, Copy)]
pub struct CallContextValue {
    pub mode: CallMode,
    /// Whether the current task is capable of unmounting from its carrier
    /// (parking on a timer or a condition without blocking an OS thread).
    /// `false` only for the synchronous `FlowHandle::run`/`execute` paths,
    /// which run on the caller's own task rather than a dispatched one.
    pub can_suspend: bool,
}

tokio::task_local! {
    static CALL_CONTEXT: CallContextValue;
}

/// Accessors for the task-local call context.
pub struct CallContext;

impl CallContext {
    /// Run `fut` with the given call context value established for its
    /// entire dynamic extent, including everything it `.await`s.
    pub async fn scope<F>(value: CallContextValue, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CALL_CONTEXT.scope(value, fut).await
    }

    /// Read the call context of the enclosing scope.
    ///
    /// Fails with [`EngineError::NoCallContext`] if read outside a scope
    /// established by [`CallContext::scope`].
    pub fn current() -> Result<CallContextValue, EngineError> {
        CALL_CONTEXT
            .try_with(|value| *value)
            .map_err(|_| EngineError::NoCallContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reading_outside_scope_fails() {
        assert!(matches!(
            CallContext::current(),
            Err(EngineError::NoCallContext)
        ));
    }

    #[tokio::test]
    async fn scope_is_visible_to_nested_awaits() {
        let value = CallContextValue {
            mode: CallMode::Run,
            can_suspend: true,
        };
        let observed = CallContext::scope(value, async {
            tokio::task::yield_now().await;
            CallContext::current().unwrap().mode
        })
        .await;
        assert_eq!(observed, CallMode::Run);
    }

    #[tokio::test]
    async fn independent_across_concurrent_tasks() {
        let a = tokio::spawn(CallContext::scope(
            CallContextValue {
                mode: CallMode::Run,
                can_suspend: false,
            },
            async {
                tokio::task::yield_now().await;
                CallContext::current().unwrap().mode
            },
        ));
        let b = tokio::spawn(CallContext::scope(
            CallContextValue {
                mode: CallMode::Await,
                can_suspend: true,
            },
            async {
                tokio::task::yield_now().await;
                CallContext::current().unwrap().mode
            },
        ));
        assert_eq!(a.await.unwrap(), CallMode::Run);
        assert_eq!(b.await.unwrap(), CallMode::Await);
    }
}
