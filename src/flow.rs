//! Flow definitions and the step-registration API
//!
//! Rust has no dynamic subclassing, so the proxy contract the specification
//! describes is realized here as explicit step registration: a [`Flow`]
//! implementation holds no state of its own and exposes one associated
//! `run` function; inside it, user code drives a [`FlowContext`] and calls
//! [`FlowContext::step`] once per step instead of having a generated proxy
//! intercept ordinary method calls. The declaring "class name" of the proxy
//! contract maps to [`Flow::NAME`]; "method name" maps to the step name
//! passed to `step`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::ids::FlowId;
use crate::interceptor::Interceptor;

/// Error type a flow or step body may raise. Propagates through
/// [`crate::error::EngineError::UserError`] unchanged.
pub type FlowBodyError = Box<dyn std::error::Error + Send + Sync>;

/// One of the seven units the annotation contract allows for a step's delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanos,
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Default for TimeUnit {
    fn default() -> Self {
        TimeUnit::Seconds
    }
}

impl TimeUnit {
    fn scale(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanos => Duration::from_nanos(amount),
            TimeUnit::Micros => Duration::from_micros(amount),
            TimeUnit::Millis => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

/// Options attached to a step call: `{delay, time_unit}` per the annotation
/// contract. Delay is the product `amount * time_unit`, or absent if unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepOptions {
    amount: Option<u64>,
    unit: TimeUnit,
}

impl StepOptions {
    /// No delay.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sleep for `amount * unit` before the step body runs, measured from
    /// the step's first recorded start (see [`crate::interceptor`] for the
    /// retry-survives-restart rule).
    pub fn with_delay(amount: u64, unit: TimeUnit) -> Self {
        Self {
            amount: Some(amount),
            unit,
        }
    }

    pub(crate) fn delay(&self) -> Option<Duration> {
        self.amount.map(|amount| self.unit.scale(amount))
    }
}

/// A handle to the flow currently executing, threaded through the flow
/// method body so it can register steps.
///
/// Not safe to share across concurrent runs of the *same* flow: the
/// underlying [`Interceptor`]'s step counter is only ever touched from the
/// single task driving one flow run (see the crate-level concurrency
/// notes).
#[derive(Clone)]
pub struct FlowContext {
    interceptor: Arc<Interceptor>,
    class_name: &'static str,
}

impl FlowContext {
    pub(crate) fn new(interceptor: Arc<Interceptor>, class_name: &'static str) -> Self {
        Self {
            interceptor,
            class_name,
        }
    }

    /// The `flow_id` this context belongs to.
    pub fn flow_id(&self) -> FlowId {
        self.interceptor.id()
    }

    pub(crate) fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Register and dispatch one step call: replay a recorded result,
    /// retry, sleep, park for an external signal, or invoke `body` fresh,
    /// depending on the state the interceptor finds in the execution log.
    pub async fn step<I, O, B, Fut>(
        &self,
        name: &str,
        options: StepOptions,
        input: I,
        body: B,
    ) -> Result<O>
    where
        I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
        B: FnOnce(I) -> Fut + Send,
        Fut: Future<Output = std::result::Result<O, FlowBodyError>> + Send,
    {
        self.interceptor
            .dispatch_step(self.class_name, name, options.delay(), input, body)
            .await
    }
}

/// A top-level, replayable unit of orchestration.
///
/// Implementations hold no instance state; everything that must survive a
/// restart is threaded through [`FlowContext::step`] and recorded in the
/// execution log. Only `Self::run` is ever invoked by the engine.
pub trait Flow: Send + Sync + 'static {
    /// Stable identity used as the execution log's `class_name` for this
    /// flow's own row and as the `FlowRegistry` lookup key for recovery.
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Default + Send + Sync + 'static;

    fn run(
        ctx: FlowContext,
        input: Self::Input,
    ) -> BoxFuture<'static, std::result::Result<Self::Output, FlowBodyError>>;
}

/// Establish `CallContext = AWAIT` for the dynamic extent of `thunk`, then
/// drive it to completion. `thunk` is expected to perform exactly one step
/// call, which will block until a matching [`crate::handle::FlowHandle::resume`]
/// delivers its arguments.
pub async fn await_step<Fut>(thunk: Fut) -> Fut::Output
where
    Fut: Future,
{
    use crate::context::{CallContext, CallContextValue, CallMode};

    CallContext::scope(
        CallContextValue {
            mode: CallMode::Await,
            can_suspend: true,
        },
        thunk,
    )
    .await
}
