//! `duraflow`: an embedded durable execution engine.
//!
//! Express a multi-step workflow as ordinary `async` Rust code; after a
//! process crash or restart, the workflow resumes from the last completed
//! step without repeating side effects already recorded in the log.
//!
//! The core of the crate is the [`interceptor`] state machine and its
//! coordination with the [`log`] (the durable invocation store), the
//! [`wait`] registry (delay/await scheduling), and [`recovery`] (startup
//! re-dispatch of unfinished flows). [`Engine`] assembles these into the
//! surface applications use; [`Flow`] and [`FlowContext`] are how a workflow
//! is defined.
//!
//! ```no_run
//! use duraflow::{Engine, EngineConfig, Flow, FlowBodyError, FlowContext, StepOptions};
//! use futures::future::BoxFuture;
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//!
//! #[derive(Clone, Serialize, Deserialize, Default)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! struct Hello;
//!
//! impl Flow for Hello {
//!     const NAME: &'static str = "Hello";
//!     type Input = Greeting;
//!     type Output = String;
//!
//!     fn run(
//!         ctx: FlowContext,
//!         input: Self::Input,
//!     ) -> BoxFuture<'static, Result<Self::Output, FlowBodyError>> {
//!         Box::pin(async move {
//!             ctx.step("greet", StepOptions::none(), input.name, |name: String| {
//!                 Box::pin(async move { Ok(format!("hello, {name}")) })
//!             })
//!             .await
//!         })
//!     }
//! }
//!
//! # async fn run() -> duraflow::Result<()> {
//! let mut engine = Engine::open(EngineConfig::new()).await?;
//! engine.register::<Hello>();
//! engine.recover_incomplete_flows().await?;
//!
//! let id: duraflow::FlowId = Uuid::new_v4().into();
//! let greeting = engine
//!     .flow::<Hello>(id)
//!     .execute(Greeting { name: "World".to_string() })
//!     .await?;
//! assert_eq!(greeting, "hello, World");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod context;
pub mod engine;
pub mod error;
pub mod flow;
pub mod handle;
pub mod ids;
pub mod interceptor;
pub mod log;
pub mod recovery;
pub mod registry;
pub mod wait;

pub use codec::{Codec, CodecError, CodecExt, JsonCodec};
pub use context::{CallContext, CallContextValue, CallMode};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use flow::{await_step, Flow, FlowBodyError, FlowContext, StepOptions, TimeUnit};
pub use handle::FlowHandle;
pub use ids::FlowId;
pub use log::{ExecutionLog, Invocation, InvocationStatus, StoreError};
