//! Flow registry
//!
//! A type-erased factory map keyed by `Flow::NAME`, consulted only by
//! [`crate::recovery::Recovery`] to reconstruct a flow's type from the
//! `class_name` recorded in an incomplete row. Grounded on the teacher
//! crate's `WorkflowRegistry`/`AnyWorkflow` pattern: registration is
//! monomorphized per concrete `Flow` type at `register::<F>()` call sites,
//! and the resulting closure is the only place that type information is
//! needed again.

use std::sync::Arc;

use dashmap::DashMap;

use crate::codec::CodecExt;
use crate::engine::Engine;
use crate::error::Result;
use crate::flow::Flow;
use crate::ids::FlowId;

type FlowRunner = Arc<dyn Fn(&Engine, FlowId, &[u8]) -> Result<()> + Send + Sync>;

/// Map from a flow's registered name to a closure that can decode recorded
/// parameters and re-dispatch that flow type.
#[derive(Default)]
pub struct FlowRegistry {
    runners: DashMap<&'static str, FlowRunner>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `F` under `F::NAME`, overwriting any previous registration
    /// of the same name.
    pub fn register<F: Flow>(&self) {
        let runner: FlowRunner = Arc::new(|engine: &Engine, id: FlowId, params: &[u8]| {
            let input: F::Input = engine.codec().decode(params)?;
            engine.flow::<F>(id).run_async(input);
            Ok(())
        });
        self.runners.insert(F::NAME, runner);
    }

    pub(crate) fn get(&self, name: &str) -> Option<FlowRunner> {
        self.runners.get(name).map(|entry| entry.clone())
    }
}
