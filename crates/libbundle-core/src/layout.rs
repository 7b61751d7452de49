//! Bundle directory planning.
//!
//! ```text
//! <output_root>/
//! ├── llama_version.h
//! └── <version_tag>/
//!     ├── metal/      # engine + every library of the variant, flat
//!     └── cuda/
//! ```
//!
//! Planning is a pure function; directories are created by the copier.

use libbundle_schema::{BuildVariant, BundleManifest, VersionInfo};
use std::path::{Path, PathBuf};

/// Planned destination of one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVariant {
    /// Variant name.
    pub name: String,
    /// `<output_root>/<version_tag>/<name>`.
    pub dest_dir: PathBuf,
}

/// The planned bundle tree for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    /// Version identity and output root.
    pub manifest: BundleManifest,
    /// One entry per variant, in configured order.
    pub variants: Vec<PlannedVariant>,
}

/// Compute the bundle tree for `version` under `output_root`.
pub fn plan_layout(
    version: &VersionInfo,
    output_root: &Path,
    variants: &[BuildVariant],
) -> BundleLayout {
    let manifest = BundleManifest::new(version, output_root);
    let variants = variants
        .iter()
        .map(|v| PlannedVariant {
            name: v.name.clone(),
            dest_dir: manifest.variant_dir(&v.name),
        })
        .collect();

    BundleLayout { manifest, variants }
}
