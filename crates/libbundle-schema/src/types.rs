//! Run-level records: variants, version identity, manifest and artifacts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::reference::DependencyReference;

/// One backend flavor of the engine (e.g. `metal`, `cuda`, `cpu`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVariant {
    /// Variant name; also the name of its bundle subdirectory.
    pub name: String,
    /// Directory holding the variant's third-party shared libraries.
    pub source_bin_dir: PathBuf,
    /// Libraries copied from `source_bin_dir`, in copy order.
    pub library_names: Vec<String>,
}

/// Upstream version identity reported by the version probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Tag-based descriptor, e.g. `b4610-3-gabc1234`.
    pub tag: String,
    /// Committer date of the last commit, in the VCS's default format.
    pub commit_date: String,
    /// Full hash of the last commit.
    pub commit_hash: String,
}

/// Identity and location of one bundling run's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Tag-based version descriptor; names the versioned directory.
    pub version_tag: String,
    /// Committer date of the bundled upstream commit.
    pub commit_date: String,
    /// Full hash of the bundled upstream commit.
    pub commit_hash: String,
    /// Directory that holds one subdirectory per bundled version.
    pub output_root: PathBuf,
}

impl BundleManifest {
    /// Build a manifest from probed version data.
    pub fn new(version: &VersionInfo, output_root: impl Into<PathBuf>) -> Self {
        Self {
            version_tag: version.tag.clone(),
            commit_date: version.commit_date.clone(),
            commit_hash: version.commit_hash.clone(),
            output_root: output_root.into(),
        }
    }

    /// Versioned directory: `<output_root>/<version_tag>`.
    pub fn version_dir(&self) -> PathBuf {
        self.output_root.join(&self.version_tag)
    }

    /// Destination directory of a variant: `<output_root>/<version_tag>/<variant>`.
    pub fn variant_dir(&self, variant: &str) -> PathBuf {
        self.version_dir().join(variant)
    }
}

/// A shared library copied into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryArtifact {
    /// File name inside the variant directory.
    pub name: String,
    /// Where the library was copied from.
    pub source_path: PathBuf,
    /// Where the library lives inside the bundle.
    pub dest_path: PathBuf,
    /// Recorded dependency references, filled in by inspection.
    pub dependencies: Vec<DependencyReference>,
}

impl LibraryArtifact {
    /// Artifact for a freshly copied file; dependencies are not yet known.
    pub fn new(name: impl Into<String>, source_path: &Path, dest_path: &Path) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.to_path_buf(),
            dest_path: dest_path.to_path_buf(),
            dependencies: Vec::new(),
        }
    }
}
