//! Post-relocation checks.
//!
//! Re-reads every relocated artifact and reports references that would
//! still resolve outside the variant directory. Findings are warnings: the
//! bundle on disk is left as is for the caller to judge.

use libbundle_schema::{loader_relative, DependencyReference, LibraryArtifact};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{BundleError, Result};
use crate::toolchain::BinaryInspector;

/// Something relocation should have fixed but did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A bundled library is still referenced by a non-relative path.
    Closure {
        /// Library holding the reference.
        library: String,
        /// The offending reference.
        reference: String,
    },
    /// A library's identity is not the loader-relative form of its name.
    Identity {
        /// The library.
        library: String,
        /// Identity found.
        actual: String,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closure { library, reference } => {
                write!(f, "{library} still references bundled '{reference}'")
            }
            Self::Identity { library, actual } => {
                write!(f, "{library} identity is '{actual}'")
            }
        }
    }
}

/// Final state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactCheck {
    /// File name.
    pub name: String,
    /// References as recorded after relocation.
    pub references: Vec<DependencyReference>,
    /// Identity after relocation.
    pub identity: Option<String>,
}

/// Outcome of verifying one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// One entry per artifact, in copy order.
    pub artifacts: Vec<ArtifactCheck>,
    /// Everything that is still wrong.
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    /// No violations found.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Re-inspect `artifacts` at their destination and check closure and
/// identity.
///
/// # Errors
///
/// Returns [`BundleError::InspectionFailed`] if an artifact can no longer
/// be read.
pub fn verify_variant(
    inspector: &dyn BinaryInspector,
    artifacts: &[LibraryArtifact],
) -> Result<VerifyReport> {
    let bundled: HashSet<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
    let mut report = VerifyReport::default();

    for artifact in artifacts {
        let path = &artifact.dest_path;
        let failed = |source| BundleError::InspectionFailed {
            path: path.clone(),
            source,
        };
        let references = inspector.dependencies(path).map_err(failed)?;
        let identity = inspector.identity(path).map_err(failed)?;

        tracing::info!("{}:", artifact.name);
        for dep in &references {
            tracing::info!("    {dep}");
            if dep.kind.is_relocatable() && bundled.contains(dep.target_library_name.as_str()) {
                report.violations.push(Violation::Closure {
                    library: artifact.name.clone(),
                    reference: dep.original_text.clone(),
                });
            }
        }

        if let Some(actual) = identity.as_deref()
            && actual != loader_relative(&artifact.name)
        {
            report.violations.push(Violation::Identity {
                library: artifact.name.clone(),
                actual: actual.to_string(),
            });
        }

        report.artifacts.push(ArtifactCheck {
            name: artifact.name.clone(),
            references,
            identity,
        });
    }

    for violation in &report.violations {
        tracing::warn!("{violation}");
    }

    Ok(report)
}
