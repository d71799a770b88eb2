//! Recovery
//!
//! On startup, enumerates unfinished top-level flows and re-dispatches them
//! on the task executor. Grounded on the teacher crate's worker-pool startup
//! poller: per-flow failures are logged and do not abort recovery of other
//! flows, matching the §7 propagation policy.

use tracing::{error, info, instrument};

use crate::engine::Engine;
use crate::error::Result;

/// Re-dispatches every `step = 0` row with `status != Complete`.
pub struct Recovery;

impl Recovery {
    /// Query `get_incomplete_flows` and `run_async` each one through its
    /// registered `Flow` type. Returns the number successfully dispatched;
    /// a row whose class was never registered, or whose parameters fail to
    /// decode, is logged and skipped rather than aborting the rest.
    #[instrument(skip(engine))]
    pub async fn run_once(engine: &Engine) -> Result<usize> {
        let incomplete = engine.log().get_incomplete_flows().await?;
        let mut dispatched = 0usize;

        for row in incomplete {
            let Some(runner) = engine.registry().get(&row.class_name) else {
                error!(
                    flow_id = %row.flow_id,
                    class = %row.class_name,
                    "no flow registered for recorded class name; skipping recovery"
                );
                continue;
            };

            match runner(engine, row.flow_id, &row.parameters) {
                Ok(()) => dispatched += 1,
                Err(err) => error!(
                    flow_id = %row.flow_id,
                    class = %row.class_name,
                    error = %err,
                    "recovery failed to re-dispatch flow"
                ),
            }
        }

        info!(dispatched, "recovery pass complete");
        Ok(dispatched)
    }
}
