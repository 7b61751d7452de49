//! Shared data model for `libbundle`.
//!
//! Everything here is plain data: no filesystem access, no process
//! spawning. The core crate builds on these types to plan and execute a
//! bundling run.

pub mod mode;
pub mod platform;
pub mod reference;
pub mod types;

// Re-exports
pub use mode::*;
pub use platform::*;
pub use reference::*;
pub use types::*;
