//! Declaration parsing and validation
//!
//! This module handles parsing of `run.yaml` declaration files, merging of
//! OS-specific override files and validation of package structure.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
