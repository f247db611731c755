//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, logging setup and dispatch
//! to listing, dumping or running an action.

pub mod app;

// Re-export main types
pub use app::*;
