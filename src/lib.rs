//! Runfile - declarative actions with importable action packages
//!
//! Actions are declared in `run.yaml` documents. A document may import other
//! packages by URI; the loader fetches and caches them, compiles the whole
//! import graph and the runner executes actions across it.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod runner;
pub mod ui;

// Re-export commonly used types
pub use error::{Result, RunfileError};

/// Current version of runfile
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
