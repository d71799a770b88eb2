//! Crate-wide error taxonomy
//!
//! Every fallible surface in this crate funnels into [`EngineError`]. Variants
//! correspond exactly to the kinds enumerated in the specification's error
//! handling design: a row is never left in an inconsistent state by any of
//! these failures (see each variant's doc comment for what does and does not
//! get mutated before the error is raised).

use crate::codec::CodecError;
use crate::ids::FlowId;
use crate::log::StoreError;

/// Errors surfaced by the engine's public API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The execution log failed to read or write. The flow is not advanced.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Parameters or a return value could not be (de)serialized. The step's
    /// completion is not recorded.
    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    /// During replay, the observed `(class, method)` at this step differs
    /// from the one recorded in the log. The run is aborted; the log is left
    /// unchanged by this attempt.
    #[error(
        "incompatible flow structure at step {step} of flow {flow_id}: recorded {recorded_class}::{recorded_method}, observed {observed_class}::{observed_method}"
    )]
    IncompatibleFlowStructure {
        flow_id: FlowId,
        step: u32,
        recorded_class: String,
        recorded_method: String,
        observed_class: String,
        observed_method: String,
    },

    /// A delay or await was reached on a task that cannot suspend
    /// cooperatively (the synchronous `run`/`execute` paths).
    #[error("delay or await reached on a task that cannot suspend cooperatively")]
    RequiresAsyncExecution,

    /// `resume` was invoked for a flow with no recorded steps.
    #[error("no flow to resume: {0}")]
    NoFlowToResume(FlowId),

    /// A step body raised an error. Propagates unchanged; the step's row
    /// stays `PENDING` (or `WAITING_FOR_SIGNAL`) and its `attempts` was
    /// already incremented by the start of this attempt.
    #[error("step body failed: {0}")]
    UserError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// `CallContext::current()` was read outside of a call established by a
    /// `FlowHandle` operation or `await_step`.
    #[error("no call context established for this task")]
    NoCallContext,

    /// A workflow type was not registered with the engine.
    #[error("unknown flow type: {0}")]
    UnknownFlowType(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
