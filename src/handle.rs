//! Flow handle
//!
//! User-facing operations to run, execute, run asynchronously, and resume a
//! flow. Establishes the call mode for the dynamic extent of the call, per
//! §4.6 of the underlying design. Grounded on the teacher crate's
//! `WorkflowExecutor::start_workflow` entry points and `worker::pool`'s
//! `tokio::spawn` idiom for the asynchronous variants.

use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex as AsyncMutex;
use tracing::error;

use crate::codec::Codec;
use crate::context::{CallContext, CallContextValue, CallMode};
use crate::error::Result;
use crate::flow::{Flow, FlowContext};
use crate::ids::FlowId;
use crate::interceptor::Interceptor;
use crate::log::ExecutionLog;
use crate::wait::WaitRegistry;

/// Per-`flow_id` advisory lock table shared by every `FlowHandle` built from
/// the same `Engine`.
///
/// The specification documents concurrent runs of a single `flow_id` as
/// undefined behavior and recommends a per-`flow_id` advisory lock as the
/// defensive strategy; this is that lock, acquired for the duration of one
/// dispatch and held across every suspension point it contains.
pub(crate) type FlowLocks = DashMap<FlowId, Arc<AsyncMutex<()>>>;

/// A handle bound to one `flow_id` and one `Flow` implementation.
pub struct FlowHandle<F: Flow> {
    id: FlowId,
    log: Arc<dyn ExecutionLog>,
    wait: Arc<WaitRegistry>,
    codec: Arc<dyn Codec>,
    locks: Arc<FlowLocks>,
    _flow: PhantomData<fn() -> F>,
}

impl<F: Flow> Clone for FlowHandle<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            log: self.log.clone(),
            wait: self.wait.clone(),
            codec: self.codec.clone(),
            locks: self.locks.clone(),
            _flow: PhantomData,
        }
    }
}

impl<F: Flow> FlowHandle<F> {
    pub(crate) fn new(
        id: FlowId,
        log: Arc<dyn ExecutionLog>,
        wait: Arc<WaitRegistry>,
        codec: Arc<dyn Codec>,
        locks: Arc<FlowLocks>,
    ) -> Self {
        Self {
            id,
            log,
            wait,
            codec,
            locks,
            _flow: PhantomData,
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.id
    }

    fn lock(&self) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(self.id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn dispatch(&self, input: F::Input, mode: CallMode, can_suspend: bool) -> Result<F::Output> {
        let lock = self.lock();
        let _guard = lock.lock().await;

        let interceptor = Arc::new(Interceptor::new(
            self.id,
            self.log.clone(),
            self.wait.clone(),
            self.codec.clone(),
        ));
        let ctx = FlowContext::new(interceptor.clone(), F::NAME);
        let body = move |input| F::run(ctx, input);

        CallContext::scope(
            CallContextValue { mode, can_suspend },
            interceptor.enter_flow(F::NAME, "run", input, body),
        )
        .await
    }

    /// Run on the current task under `CallMode::Run`. A delay or await
    /// reached inside the flow fails with `RequiresAsyncExecution`, since
    /// the caller's own task cannot suspend cooperatively.
    pub async fn run(&self, input: F::Input) -> Result<()> {
        self.execute(input).await.map(|_| ())
    }

    /// Same as `run`, but returns the flow method's return value.
    pub async fn execute(&self, input: F::Input) -> Result<F::Output> {
        self.dispatch(input, CallMode::Run, false).await
    }

    /// Submit the call to the `tokio` executor; returns immediately.
    pub fn run_async(&self, input: F::Input) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.dispatch(input, CallMode::Run, true).await {
                error!(flow_id = %handle.id, flow = F::NAME, error = %err, "flow run failed");
            }
        });
    }

    /// Same as `run_async`, returning a `JoinHandle` to the eventual result.
    pub fn execute_async(&self, input: F::Input) -> tokio::task::JoinHandle<Result<F::Output>> {
        let handle = self.clone();
        tokio::spawn(async move { handle.dispatch(input, CallMode::Run, true).await })
    }

    /// Establish `CallMode::Resume` and drive `resumer`, which is expected
    /// to perform exactly one step call on the flow context whose row is
    /// currently `WAITING_FOR_SIGNAL`. Returns once the signal has been
    /// delivered; does not wait for the resumed flow to finish running.
    pub async fn resume<O>(
        &self,
        resumer: impl FnOnce(FlowContext) -> BoxFuture<'static, Result<O>>,
    ) -> Result<()> {
        let interceptor = Arc::new(Interceptor::new(
            self.id,
            self.log.clone(),
            self.wait.clone(),
            self.codec.clone(),
        ));
        let ctx = FlowContext::new(interceptor, F::NAME);
        CallContext::scope(
            CallContextValue {
                mode: CallMode::Resume,
                can_suspend: true,
            },
            resumer(ctx),
        )
        .await
        .map(|_| ())
    }
}
