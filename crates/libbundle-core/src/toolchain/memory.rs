//! In-memory toolchain for tests and simulations.
//!
//! Binaries are modeled as an identity plus an ordered list of reference
//! strings, keyed by path. Edits mutate the model and are recorded so tests
//! can assert on exactly what would have been run.

use libbundle_schema::DependencyReference;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BinaryEditor, BinaryInspector};
use crate::error::ToolError;

/// Tool name reported by injected failures.
const TOOL: &str = "memory-toolchain";

/// Modeled contents of one binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeBinary {
    /// Self-identity; `None` models an executable.
    pub identity: Option<String>,
    /// Recorded references in load-command order.
    pub dependencies: Vec<String>,
}

impl FakeBinary {
    /// A library with the given identity and references.
    pub fn library(identity: &str, dependencies: &[&str]) -> Self {
        Self {
            identity: Some(identity.to_string()),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
        }
    }
}

/// One successful edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// A dependency reference was replaced.
    ChangeDependency {
        /// Edited binary.
        path: PathBuf,
        /// Replaced reference.
        old: String,
        /// Replacement.
        new: String,
    },
    /// The identity was replaced.
    SetIdentity {
        /// Edited binary.
        path: PathBuf,
        /// New identity.
        identity: String,
    },
}

#[derive(Debug, Default)]
struct State {
    binaries: HashMap<PathBuf, FakeBinary>,
    failing: HashSet<PathBuf>,
    edits: Vec<Edit>,
    finished: Vec<PathBuf>,
}

/// Shared in-memory binary store implementing both capabilities.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryToolchain {
    state: Arc<Mutex<State>>,
}

impl MemoryToolchain {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) the binary at `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, binary: FakeBinary) {
        self.lock().binaries.insert(path.into(), binary);
    }

    /// Make every later edit of `path` fail.
    pub fn fail_edits_on(&self, path: impl Into<PathBuf>) {
        self.lock().failing.insert(path.into());
    }

    /// Current model of the binary at `path`.
    pub fn binary(&self, path: &Path) -> Option<FakeBinary> {
        self.lock().binaries.get(path).cloned()
    }

    /// Every successful edit so far, in order.
    pub fn edits(&self) -> Vec<Edit> {
        self.lock().edits.clone()
    }

    /// Binaries whose edits were finished, once per relocation.
    pub fn finished(&self) -> Vec<PathBuf> {
        self.lock().finished.clone()
    }

    fn edit<F>(&self, path: &Path, apply: F) -> Result<(), ToolError>
    where
        F: FnOnce(&mut FakeBinary) -> Result<Option<Edit>, ToolError>,
    {
        let mut state = self.lock();
        if state.failing.contains(path) {
            return Err(ToolError::Failed {
                tool: TOOL.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("injected failure for {}", path.display()),
            });
        }
        let binary = state
            .binaries
            .get_mut(path)
            .ok_or_else(|| unknown(path))?;
        if let Some(edit) = apply(binary)? {
            state.edits.push(edit);
        }
        Ok(())
    }
}

fn unknown(path: &Path) -> ToolError {
    ToolError::Unrecognized(path.display().to_string())
}

impl BinaryInspector for MemoryToolchain {
    fn dependencies(&self, path: &Path) -> Result<Vec<DependencyReference>, ToolError> {
        let state = self.lock();
        let binary = state.binaries.get(path).ok_or_else(|| unknown(path))?;
        Ok(binary
            .dependencies
            .iter()
            .map(|d| DependencyReference::parse(d))
            .collect())
    }

    fn identity(&self, path: &Path) -> Result<Option<String>, ToolError> {
        let state = self.lock();
        let binary = state.binaries.get(path).ok_or_else(|| unknown(path))?;
        Ok(binary.identity.clone())
    }
}

impl BinaryEditor for MemoryToolchain {
    /// Replaces every occurrence of `old`; a reference that is not present
    /// leaves the binary unchanged, like `install_name_tool -change`.
    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<(), ToolError> {
        self.edit(path, |binary| {
            let mut changed = false;
            for dep in binary.dependencies.iter_mut().filter(|d| d.as_str() == old) {
                *dep = new.to_string();
                changed = true;
            }
            Ok(changed.then(|| Edit::ChangeDependency {
                path: path.to_path_buf(),
                old: old.to_string(),
                new: new.to_string(),
            }))
        })
    }

    fn set_identity(&self, path: &Path, identity: &str) -> Result<(), ToolError> {
        self.edit(path, |binary| match binary.identity.as_mut() {
            Some(current) => {
                *current = identity.to_string();
                Ok(Some(Edit::SetIdentity {
                    path: path.to_path_buf(),
                    identity: identity.to_string(),
                }))
            }
            None => Err(ToolError::Failed {
                tool: TOOL.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("{} has no identity to change", path.display()),
            }),
        })
    }

    fn finish_edits(&self, path: &Path) {
        self.lock().finished.push(path.to_path_buf());
    }
}
