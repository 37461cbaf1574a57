//! `nodes` crate: the executor contract and the built-in node types.
//!
//! Every node type implements [`ExecutableNode`]. The engine crate owns
//! dispatch and durability; this crate only describes what one node does
//! with its configuration, the incoming [`Context`], and the services it is
//! handed (steps, status publishing, HTTP, credentials).

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod executors;
pub mod mock;
pub mod status;
pub mod step;
pub mod template;
pub mod traits;
pub mod transport;

pub use context::Context;
pub use error::{NodeError, NodeResult};
pub use status::{NodeStatus, StatusFn};
pub use step::{run_step, StepRunner};
pub use traits::{ExecutableNode, NodeParams};
