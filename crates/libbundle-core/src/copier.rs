//! Copies build outputs into the planned bundle directories.
//!
//! Copy order per variant is fixed: the engine library first, then every
//! configured library in order, then anything matched by `include` globs.
//! The first missing required file aborts the run; files already copied
//! stay in place.

use libbundle_schema::LibraryArtifact;
use std::collections::HashSet;
use std::path::Path;

use crate::config::VariantSettings;
use crate::error::{BundleError, Result};

/// Copies variant artifacts into their destination directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactCopier {
    dry_run: bool,
}

impl ArtifactCopier {
    /// Create a copier. In dry-run mode sources are checked but nothing is
    /// written.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Copy one variant into `dest_dir`, creating it if needed.
    ///
    /// Returns the copied artifacts in copy order, with empty dependency
    /// lists.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::SourceArtifactMissing`] for the first required
    /// file that does not exist, a config error when two required files share
    /// a destination name, or an IO error if a directory cannot be created
    /// or a file cannot be copied.
    pub fn copy_variant(
        &self,
        variant: &VariantSettings,
        dest_dir: &Path,
    ) -> Result<Vec<LibraryArtifact>> {
        if !self.dry_run {
            std::fs::create_dir_all(dest_dir)
                .map_err(|e| BundleError::io("Failed to create directory", dest_dir, e))?;
        }

        // One artifact per destination file.
        let mut seen = HashSet::new();
        seen.insert(variant.engine_name.clone());
        let mut artifacts = Vec::new();
        artifacts.push(self.copy_one(&variant.engine_source, &variant.engine_name, dest_dir)?);

        let bin_dir = &variant.variant.source_bin_dir;
        for lib in &variant.variant.library_names {
            if !seen.insert(lib.clone()) {
                return Err(BundleError::config(format!(
                    "'{lib}' would overwrite another artifact in {}",
                    dest_dir.display()
                )));
            }
            artifacts.push(self.copy_one(&bin_dir.join(lib), lib, dest_dir)?);
        }

        if !variant.include.is_empty() {
            if bin_dir.is_dir() {
                for pattern in &variant.include {
                    for source in expand_glob(bin_dir, pattern)? {
                        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        if !seen.insert(name.to_string()) {
                            continue;
                        }
                        artifacts.push(self.copy_one(&source, name, dest_dir)?);
                    }
                }
            } else {
                tracing::warn!(
                    "Skipping {} include patterns, {} does not exist",
                    variant.variant.name,
                    bin_dir.display()
                );
            }
        }

        tracing::info!(
            "Copied {} {} artifacts to {}",
            artifacts.len(),
            variant.variant.name,
            dest_dir.display()
        );

        Ok(artifacts)
    }

    fn copy_one(&self, source: &Path, name: &str, dest_dir: &Path) -> Result<LibraryArtifact> {
        if !source.is_file() {
            return Err(BundleError::SourceArtifactMissing {
                path: source.to_path_buf(),
            });
        }

        let dest = dest_dir.join(name);
        if self.dry_run {
            tracing::info!("Would copy {} to {}", source.display(), dest.display());
        } else {
            std::fs::copy(source, &dest)
                .map_err(|e| BundleError::io("Failed to copy into", &dest, e))?;
            tracing::debug!("Copied {} to {}", source.display(), dest.display());
        }

        Ok(LibraryArtifact::new(name, source, &dest))
    }
}

/// Regular files in `dir` matching `pattern`, in glob order.
fn expand_glob(dir: &Path, pattern: &str) -> Result<Vec<std::path::PathBuf>> {
    let full = format!(
        "{}/{pattern}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob::glob(&full)
        .map_err(|e| BundleError::config(format!("invalid include pattern '{pattern}': {e}")))?;

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            BundleError::io("Failed to read", path, e.into())
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }
    Ok(matches)
}
