//! Binary inspection and editing capabilities.
//!
//! Relocation logic never shells out directly; it talks to a
//! [`BinaryInspector`] and a [`BinaryEditor`]. The native macOS pair wraps
//! `otool` and `install_name_tool`, Windows gets a no-op pair, and tests use
//! the in-memory [`MemoryToolchain`].

pub mod macho;
pub mod memory;

use libbundle_schema::{DependencyReference, Platform};
use std::path::Path;

use crate::error::ToolError;

pub use macho::{InstallNameTool, Otool};
pub use memory::{Edit, FakeBinary, MemoryToolchain};

/// Reads the dependency references a shared library records.
pub trait BinaryInspector: std::fmt::Debug {
    /// Recorded dependencies in load-command order, excluding the library's
    /// own identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a shared library the tool
    /// understands, or the tool fails.
    fn dependencies(&self, path: &Path) -> Result<Vec<DependencyReference>, ToolError>;

    /// The library's self-identity, or `None` for binaries without one
    /// (executables, or platforms that do not record it).
    ///
    /// # Errors
    ///
    /// Same conditions as [`BinaryInspector::dependencies`].
    fn identity(&self, path: &Path) -> Result<Option<String>, ToolError>;
}

/// Rewrites references inside a shared library in place.
pub trait BinaryEditor: std::fmt::Debug {
    /// Replace the dependency reference `old` with `new`.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit tool fails.
    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<(), ToolError>;

    /// Replace the library's self-identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit tool fails.
    fn set_identity(&self, path: &Path, identity: &str) -> Result<(), ToolError>;

    /// Called once after the last edit of `path` succeeded.
    fn finish_edits(&self, _path: &Path) {}
}

/// An inspector/editor pair for one platform.
#[derive(Debug)]
pub struct Toolchain {
    /// Reads references.
    pub inspector: Box<dyn BinaryInspector>,
    /// Writes references.
    pub editor: Box<dyn BinaryEditor>,
}

impl Toolchain {
    /// The native tools for `platform`.
    pub fn native(platform: Platform, resign: bool) -> Self {
        if platform.relocates() {
            Self {
                inspector: Box::new(Otool),
                editor: Box::new(InstallNameTool::new(resign)),
            }
        } else {
            tracing::debug!("{platform} does not relocate references");
            Self {
                inspector: Box::new(NullToolchain),
                editor: Box::new(NullToolchain),
            }
        }
    }

    /// Inspector and editor backed by one shared in-memory store.
    pub fn memory(store: &MemoryToolchain) -> Self {
        Self {
            inspector: Box::new(store.clone()),
            editor: Box::new(store.clone()),
        }
    }
}

/// Toolchain for platforms whose loader finds siblings without relinking.
///
/// Inspection reports no references and edits succeed without touching
/// the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullToolchain;

impl BinaryInspector for NullToolchain {
    fn dependencies(&self, _: &Path) -> Result<Vec<DependencyReference>, ToolError> {
        Ok(Vec::new())
    }

    fn identity(&self, _: &Path) -> Result<Option<String>, ToolError> {
        Ok(None)
    }
}

impl BinaryEditor for NullToolchain {
    fn change_dependency(&self, _: &Path, _: &str, _: &str) -> Result<(), ToolError> {
        Ok(())
    }

    fn set_identity(&self, _: &Path, _: &str) -> Result<(), ToolError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_toolchain_reports_nothing() {
        let tc = Toolchain::native(Platform::Windows, true);
        let path = Path::new("LlamaEngine.dll");
        assert!(tc.inspector.dependencies(path).unwrap().is_empty());
        assert_eq!(tc.inspector.identity(path).unwrap(), None);
        tc.editor.change_dependency(path, "a", "b").unwrap();
        tc.editor.set_identity(path, "b").unwrap();
    }
}
