//! Action execution engine
//!
//! Compiled package scopes, the per-action dependency and variable engine,
//! command dispatch and the shared run context.

pub mod action;
pub mod command;
pub mod context;
pub mod inputs;
pub mod scope;
pub mod skip;
pub mod template;
pub mod vars;

// Re-export main types
pub use action::*;
pub use command::*;
pub use context::*;
pub use inputs::*;
pub use scope::*;
pub use skip::*;
pub use vars::*;
