//! Domain-specific errors for bundling runs.
//!
//! Every variant is fatal: the run stops at the first error and leaves the
//! partially assembled bundle in place. Rerunning after fixing the cause is
//! safe because every rewrite is idempotent.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while assembling a bundle.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The upstream version could not be determined.
    #[error("Upstream version unavailable for {}: {reason}", repo.display())]
    VersionUnavailable {
        /// Source tree that was queried.
        repo: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A required build output does not exist.
    #[error("Source artifact missing: {}", path.display())]
    SourceArtifactMissing {
        /// The expected file.
        path: PathBuf,
    },

    /// A library could not be read as a shared-library binary.
    #[error("Failed to inspect {}: {source}", path.display())]
    InspectionFailed {
        /// The library being inspected.
        path: PathBuf,
        /// Underlying tool failure.
        source: ToolError,
    },

    /// Rewriting one dependency reference failed.
    #[error("Failed to rewrite '{reference}' in {}: {source}", library.display())]
    RewriteFailed {
        /// The library being edited.
        library: PathBuf,
        /// The reference that could not be rewritten.
        reference: String,
        /// Underlying tool failure.
        source: ToolError,
    },

    /// Rewriting a library's own identity failed.
    #[error("Failed to set identity '{identity}' on {}: {source}", library.display())]
    IdentityUpdateFailed {
        /// The library being edited.
        library: PathBuf,
        /// The identity that could not be applied.
        identity: String,
        /// Underlying tool failure.
        source: ToolError,
    },

    /// The configuration is unreadable or inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem operation failed.
    #[error("{context} {}: {source}", path.display())]
    Io {
        /// What was being attempted.
        context: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

impl BundleError {
    /// Create a configuration error.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Wrap an IO error with the path it concerns.
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Failure of an external binary tool (`otool`, `install_name_tool`, `git`).
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool is not installed.
    #[error("'{tool}' not found. {hint}")]
    NotFound {
        /// Tool name.
        tool: String,
        /// How to install it.
        hint: &'static str,
    },

    /// The tool could not be started.
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        /// Tool name.
        tool: String,
        /// Exit status, as displayed by the OS.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The file is not a binary the tool understands.
    #[error("not a recognized shared library: {0}")]
    Unrecognized(String),
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, BundleError>;
