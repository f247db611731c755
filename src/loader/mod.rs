//! Package resolution
//!
//! Retrieval of package sources, the per-URI cache and the loader that
//! compiles a root declaration and its imports into a package graph.

pub mod fetcher;
pub mod load;
pub mod retrieve;

pub use fetcher::*;
pub use load::*;
pub use retrieve::*;
