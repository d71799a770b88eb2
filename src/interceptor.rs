//! The interceptor: the state machine at the core of this crate
//!
//! For each intercepted flow or step call, decides replay / execute / sleep
//! / wait / resume and updates the execution log accordingly. Grounded on
//! the teacher crate's `engine::executor::WorkflowExecutor`, adapted from
//! event-sourced replay (the teacher consults an event log of already-applied
//! actions) to call-by-call interception (this crate consults one row per
//! call as that call happens).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::codec::{Codec, CodecExt};
use crate::context::{CallContext, CallMode};
use crate::error::{EngineError, Result};
use crate::flow::FlowBodyError;
use crate::ids::FlowId;
use crate::log::{ExecutionLog, InvocationStatus, StoreError};
use crate::wait::WaitRegistry;

/// One flow run's coordination state: the next step index plus handles to
/// the shared execution log, wait registry, and codec.
///
/// Fields other than `step` are `Arc`s shared process-wide; `step` itself is
/// local to this flow run and must only be touched by the single task
/// driving it (see the crate-level concurrency notes). It is still guarded
/// by a `parking_lot::Mutex` rather than a bare `Cell` so `Interceptor` stays
/// `Sync`, which `tokio::spawn` requires of anything captured across an
/// `.await`.
pub struct Interceptor {
    id: FlowId,
    step: Mutex<u32>,
    log: Arc<dyn ExecutionLog>,
    wait: Arc<WaitRegistry>,
    codec: Arc<dyn Codec>,
}

impl Interceptor {
    pub fn new(
        id: FlowId,
        log: Arc<dyn ExecutionLog>,
        wait: Arc<WaitRegistry>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            id,
            step: Mutex::new(0),
            log,
            wait,
            codec,
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    fn current_step(&self) -> u32 {
        *self.step.lock()
    }

    fn set_step(&self, value: u32) {
        *self.step.lock() = value;
    }

    /// Entry point for a flow method: pins the step counter to 0 (§4.5 step
    /// 2), then runs the same dispatch algorithm a step call uses.
    #[instrument(level = "debug", skip(self, body), fields(flow_id = %self.id))]
    pub async fn enter_flow<I, O, B, Fut>(
        &self,
        class: &'static str,
        method: &'static str,
        input: I,
        body: B,
    ) -> Result<O>
    where
        I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
        B: FnOnce(I) -> Fut + Send,
        Fut: Future<Output = std::result::Result<O, FlowBodyError>> + Send,
    {
        self.set_step(0);
        self.dispatch(class, method, None, input, body).await
    }

    /// Entry point for a step call, invoked by [`crate::flow::FlowContext::step`].
    #[instrument(level = "debug", skip(self, body), fields(flow_id = %self.id))]
    pub async fn dispatch_step<I, O, B, Fut>(
        &self,
        class: &'static str,
        method: &str,
        delay: Option<Duration>,
        input: I,
        body: B,
    ) -> Result<O>
    where
        I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
        B: FnOnce(I) -> Fut + Send,
        Fut: Future<Output = std::result::Result<O, FlowBodyError>> + Send,
    {
        self.dispatch(class, method, delay, input, body).await
    }

    async fn dispatch<I, O, B, Fut>(
        &self,
        class: &str,
        method: &str,
        delay: Option<Duration>,
        input: I,
        body: B,
    ) -> Result<O>
    where
        I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
        B: FnOnce(I) -> Fut + Send,
        Fut: Future<Output = std::result::Result<O, FlowBodyError>> + Send,
    {
        let call = CallContext::current()?;
        let mut step = self.current_step();

        // Step 3: determine the anchor row.
        let anchor = if call.mode == CallMode::Resume {
            let anchor = self.log.get_latest_invocation(self.id).await?;
            if let Some(anchor) = &anchor {
                step = anchor.step;
                self.set_step(step);
            }
            anchor
        } else {
            self.log.get_invocation(self.id, step).await?
        };

        if call.mode == CallMode::Resume && anchor.is_none() {
            return Err(EngineError::NoFlowToResume(self.id));
        }

        let mut args = input;
        let mut remaining_delay = None;

        if let Some(anchor) = &anchor {
            // Step 4a: structure check.
            if anchor.class_name != class || anchor.method_name != method {
                return Err(EngineError::IncompatibleFlowStructure {
                    flow_id: self.id,
                    step,
                    recorded_class: anchor.class_name.clone(),
                    recorded_method: anchor.method_name.clone(),
                    observed_class: class.to_string(),
                    observed_method: method.to_string(),
                });
            }

            // Step 4b: replay hit.
            if anchor.status == InvocationStatus::Complete {
                let bytes = anchor.return_value.as_ref().ok_or_else(|| {
                    EngineError::Store(StoreError::Database(
                        "complete row missing return_value".to_string(),
                    ))
                })?;
                let value: O = self.codec.decode(bytes)?;
                debug!(step, "replay hit");
                self.set_step(step + 1);
                return Ok(value);
            }

            // Step 4c: signal delivery.
            if anchor.status == InvocationStatus::WaitingForSignal && call.mode == CallMode::Resume
            {
                let bytes = self.codec.encode(&args)?;
                self.wait.signal(self.id, bytes);
                info!(step, "delivered resume signal");
                return Ok(O::default());
            }

            // Step 4d: retry. Delay is measured from this anchor's
            // timestamp, i.e. the previous attempt's, not recomputed from
            // `now` — a crashed-and-restarted delayed step waits out only
            // what remains of its original delay.
            if let Some(delay) = delay {
                remaining_delay = Some(remaining_from(anchor.timestamp, delay));
            }
        } else if let Some(delay) = delay {
            remaining_delay = Some(delay);
        }

        // Step 5.
        let start_status = if call.mode == CallMode::Await {
            InvocationStatus::WaitingForSignal
        } else {
            InvocationStatus::Pending
        };
        let encoded_args = self.codec.encode(&args)?;
        let delay_millis = delay.map(|d| d.as_millis() as i64);
        self.log
            .log_start(
                self.id,
                step,
                class,
                method,
                delay_millis,
                start_status,
                encoded_args,
            )
            .await?;

        if let Some(remaining) = remaining_delay {
            // Step 6: delay.
            if remaining > Duration::ZERO {
                if !call.can_suspend {
                    return Err(EngineError::RequiresAsyncExecution);
                }
                debug!(step, remaining_ms = remaining.as_millis() as u64, "sleeping");
                tokio::time::sleep(remaining).await;
            }
        } else if call.mode == CallMode::Await {
            // Step 7: await.
            if !call.can_suspend {
                return Err(EngineError::RequiresAsyncExecution);
            }
            debug!(step, "parking for external signal");
            let resume_bytes = self.wait.wait(self.id).await;
            args = self.codec.decode(&resume_bytes)?;
        }

        // Step 8.
        let current_step = step;
        self.set_step(step + 1);
        let result = body(args).await.map_err(EngineError::UserError)?;

        // Step 9.
        let encoded_result = self.codec.encode(&result)?;
        self.log
            .log_completion(self.id, current_step, encoded_result)
            .await?;
        Ok(result)
    }
}

fn remaining_from(started_at: DateTime<Utc>, delay: Duration) -> Duration {
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    let deadline = started_at + delay;
    let now = Utc::now();
    if deadline <= now {
        Duration::ZERO
    } else {
        (deadline - now).to_std().unwrap_or(Duration::ZERO)
    }
}
