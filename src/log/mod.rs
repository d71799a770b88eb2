//! Execution log: the durable record of every flow and step invocation.

mod memory;
mod sqlite;
mod types;

pub use memory::InMemoryExecutionLog;
pub use sqlite::SqliteExecutionLog;
pub use types::{ExecutionLog, Invocation, InvocationStatus, StoreError};
