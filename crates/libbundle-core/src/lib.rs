//! Core library for `libbundle`.
//!
//! Assembles a relocatable bundle of prebuilt shared libraries: probes the
//! upstream version, writes a version header, copies each variant into a
//! versioned directory and rewrites dependency references so every variant
//! directory loads on its own.

pub mod config;
pub mod copier;
pub mod error;
pub mod header;
pub mod layout;
pub mod pipeline;
pub mod relocate;
pub mod toolchain;
pub mod verify;
pub mod version;

mod tool;

pub use config::{BundleSettings, Config, LoadedConfig, CONFIG_ENV, CONFIG_FILE_NAME};
pub use error::{BundleError, Result, ToolError};
pub use pipeline::{BundleReport, Bundler};
pub use toolchain::{BinaryEditor, BinaryInspector, Toolchain};
pub use version::{GitProbe, StaticVersion, VersionSource};
