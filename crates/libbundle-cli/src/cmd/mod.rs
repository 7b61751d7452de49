//! Command implementations.

pub mod bundle;
pub mod completions;
