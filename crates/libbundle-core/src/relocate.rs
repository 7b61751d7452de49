//! Rewriting dependency references so a variant directory is self-contained.
//!
//! Relocation of one artifact is split into a pure planning step and an
//! executing step. The plan lists every edit in the order it is applied:
//!
//! 1. [`Stage::Bundled`]: references to libraries copied into the same
//!    variant directory become `@loader_path/<name>`.
//! 2. [`Stage::Identity`]: the library's own identity becomes
//!    `@loader_path/<own name>`.
//! 3. [`Stage::AmbientFixup`]: every `@rpath/` reference left after stage 1
//!    becomes `@loader_path/<name>`, bundled or not.
//!
//! Loader-relative references never match a rule, so relocating an
//! artifact twice plans nothing the second time.

use libbundle_schema::{loader_relative, DependencyReference, LibraryArtifact, ReferenceKind};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{BundleError, Result};
use crate::toolchain::{BinaryEditor, BinaryInspector};

/// Which rule produced a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reference to a co-located bundled library.
    Bundled,
    /// The library's own identity.
    Identity,
    /// Leftover `@rpath/` reference.
    AmbientFixup,
}

impl Stage {
    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Identity => "identity",
            Self::AmbientFixup => "rpath-fixup",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOp {
    /// Replace a dependency reference.
    ChangeDependency {
        /// Rule that produced the edit.
        stage: Stage,
        /// Reference as currently recorded.
        old: String,
        /// Loader-relative replacement.
        new: String,
    },
    /// Replace the library's identity.
    SetIdentity {
        /// Loader-relative identity.
        new: String,
    },
}

impl RewriteOp {
    /// Rule that produced the edit.
    pub fn stage(&self) -> Stage {
        match self {
            Self::ChangeDependency { stage, .. } => *stage,
            Self::SetIdentity { .. } => Stage::Identity,
        }
    }
}

impl std::fmt::Display for RewriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChangeDependency { stage, old, new } => write!(f, "[{stage}] {old} -> {new}"),
            Self::SetIdentity { new } => write!(f, "[identity] id -> {new}"),
        }
    }
}

/// Ordered edits for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationPlan {
    /// Edits in application order.
    pub ops: Vec<RewriteOp>,
}

impl RelocationPlan {
    /// Plan the edits for `artifact`, whose `dependencies` must already be
    /// inspected. `bundled` holds the file names of every artifact in the
    /// same variant directory.
    pub fn build(
        artifact: &LibraryArtifact,
        identity: Option<&str>,
        bundled: &HashSet<String>,
        ambient_fixup: bool,
    ) -> Self {
        let mut ops = Vec::new();
        let mut rewritten = HashSet::new();

        for dep in &artifact.dependencies {
            if dep.kind.is_relocatable()
                && bundled.contains(&dep.target_library_name)
                && rewritten.insert(dep.original_text.as_str())
            {
                ops.push(RewriteOp::ChangeDependency {
                    stage: Stage::Bundled,
                    old: dep.original_text.clone(),
                    new: dep.loader_relative(),
                });
            }
        }

        if let Some(current) = identity {
            let wanted = loader_relative(&artifact.name);
            if current != wanted {
                ops.push(RewriteOp::SetIdentity { new: wanted });
            }
        }

        if ambient_fixup {
            for dep in &artifact.dependencies {
                if dep.kind == ReferenceKind::AmbientSearchPath
                    && rewritten.insert(dep.original_text.as_str())
                {
                    ops.push(RewriteOp::ChangeDependency {
                        stage: Stage::AmbientFixup,
                        old: dep.original_text.clone(),
                        new: dep.loader_relative(),
                    });
                }
            }
        }

        Self { ops }
    }

    /// Whether the artifact is already relocated.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of relocating one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// The executed (or, in dry-run mode, would-be) plan.
    pub plan: RelocationPlan,
    /// Number of edits actually applied.
    pub applied: usize,
}

/// Executes relocation plans through a toolchain.
#[derive(Debug, Clone, Copy)]
pub struct Relocator<'a> {
    inspector: &'a dyn BinaryInspector,
    editor: &'a dyn BinaryEditor,
    ambient_fixup: bool,
    dry_run: bool,
}

impl<'a> Relocator<'a> {
    /// Create a relocator over the given capabilities.
    pub fn new(inspector: &'a dyn BinaryInspector, editor: &'a dyn BinaryEditor) -> Self {
        Self {
            inspector,
            editor,
            ambient_fixup: true,
            dry_run: false,
        }
    }

    /// Enable or disable the `@rpath/` fix-up stage.
    #[must_use]
    pub fn with_ambient_fixup(mut self, enabled: bool) -> Self {
        self.ambient_fixup = enabled;
        self
    }

    /// In dry-run mode the source file is inspected and no edit is applied.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The file inspected for `artifact`.
    fn target<'b>(&self, artifact: &'b LibraryArtifact) -> &'b Path {
        if self.dry_run {
            &artifact.source_path
        } else {
            &artifact.dest_path
        }
    }

    /// Read the dependencies and identity of `artifact`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InspectionFailed`] if the file is not a
    /// recognized shared library.
    pub fn inspect(
        &self,
        artifact: &LibraryArtifact,
    ) -> Result<(Vec<DependencyReference>, Option<String>)> {
        let path = self.target(artifact);
        let failed = |source| BundleError::InspectionFailed {
            path: path.to_path_buf(),
            source,
        };
        let deps = self.inspector.dependencies(path).map_err(failed)?;
        let identity = self.inspector.identity(path).map_err(failed)?;
        Ok((deps, identity))
    }

    /// Inspect, plan and apply the relocation of one artifact.
    ///
    /// The inspected references are stored in `artifact.dependencies`.
    ///
    /// # Errors
    ///
    /// Fails on the first inspection or edit failure; edits applied before
    /// the failure stay applied.
    pub fn relocate(
        &self,
        artifact: &mut LibraryArtifact,
        bundled: &HashSet<String>,
    ) -> Result<Relocation> {
        let (deps, identity) = self.inspect(artifact)?;
        artifact.dependencies = deps;

        let plan = RelocationPlan::build(artifact, identity.as_deref(), bundled, self.ambient_fixup);
        if plan.is_empty() {
            tracing::debug!("{} is already relocated", artifact.name);
        }

        let applied = self.apply(artifact, &plan)?;
        Ok(Relocation { plan, applied })
    }

    /// Apply `plan` to `artifact.dest_path`, returning the number of edits.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::RewriteFailed`] or
    /// [`BundleError::IdentityUpdateFailed`] for the first failing edit.
    pub fn apply(&self, artifact: &LibraryArtifact, plan: &RelocationPlan) -> Result<usize> {
        let path = &artifact.dest_path;
        if self.dry_run {
            for op in &plan.ops {
                tracing::info!("Would apply to {}: {op}", artifact.name);
            }
            return Ok(0);
        }

        for op in &plan.ops {
            match op {
                RewriteOp::ChangeDependency { old, new, .. } => {
                    self.editor
                        .change_dependency(path, old, new)
                        .map_err(|source| BundleError::RewriteFailed {
                            library: path.clone(),
                            reference: old.clone(),
                            source,
                        })?;
                }
                RewriteOp::SetIdentity { new } => {
                    self.editor
                        .set_identity(path, new)
                        .map_err(|source| BundleError::IdentityUpdateFailed {
                            library: path.clone(),
                            identity: new.clone(),
                            source,
                        })?;
                }
            }
            tracing::info!("{}: {op}", artifact.name);
        }
        if !plan.ops.is_empty() {
            self.editor.finish_edits(path);
        }

        Ok(plan.ops.len())
    }
}
