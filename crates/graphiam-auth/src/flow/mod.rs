//! Flow interpreter.
//!
//! - [`node`] - the node executor capability
//! - [`registry`] - node type name → executor
//! - [`builtin`] - structural nodes (`init`, `successResult`, `failureResult`)
//! - [`interpreter`] - runs a flow graph against an auth session
//! - [`loader`] - reads flow documents from TOML or JSON

pub mod builtin;
pub mod interpreter;
pub mod loader;
pub mod node;
pub mod registry;

pub use builtin::{FailureResultNode, InitNode, SuccessResultNode};
pub use interpreter::{FlowInterpreter, FlowSelector, FlowStart};
pub use loader::{FlowDocument, load_dir};
pub use node::{NodeContext, NodeError, NodeExecutor, NodeOutcome};
pub use registry::NodeRegistry;
