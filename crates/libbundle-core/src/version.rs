//! Upstream version discovery.
//!
//! The bundle is named after the upstream checkout it was built from, the
//! same way a build script derives a binary's version from `git describe`.

use libbundle_schema::VersionInfo;
use std::path::PathBuf;

use crate::error::{BundleError, Result};
use crate::tool::GIT;

/// Anything that can report the version of the bundled upstream library.
pub trait VersionSource: std::fmt::Debug {
    /// Query the version.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::VersionUnavailable`] when no version can be
    /// determined.
    fn probe(&self) -> Result<VersionInfo>;
}

/// Reads the version of a git checkout.
#[derive(Debug, Clone)]
pub struct GitProbe {
    repo: PathBuf,
}

impl GitProbe {
    /// Probe the checkout at `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn unavailable(&self, reason: impl Into<String>) -> BundleError {
        BundleError::VersionUnavailable {
            repo: self.repo.clone(),
            reason: reason.into(),
        }
    }

    fn query(&self, args: &[&str]) -> Result<String> {
        let out = GIT
            .run(args, Some(&self.repo))
            .map_err(|e| self.unavailable(e.to_string()))?;
        let value = out.trim();
        if value.is_empty() {
            return Err(self.unavailable(format!("`git {}` returned nothing", args.join(" "))));
        }
        Ok(value.to_string())
    }
}

impl VersionSource for GitProbe {
    fn probe(&self) -> Result<VersionInfo> {
        which::which(GIT.name()).map_err(|_| self.unavailable("git is not installed"))?;
        if !self.repo.is_dir() {
            return Err(self.unavailable("source tree does not exist"));
        }

        let tag = self.query(&["describe", "--tags"])?;
        let commit_date = self.query(&["log", "-1", "--format=%cd"])?;
        let commit_hash = self.query(&["log", "-1", "--format=%H"])?;

        if !is_usable_tag(&tag) {
            return Err(self.unavailable(format!("tag '{tag}' cannot name a directory")));
        }

        tracing::info!("Upstream version {tag} ({commit_hash}, {commit_date})");

        Ok(VersionInfo {
            tag,
            commit_date,
            commit_hash,
        })
    }
}

/// A version known ahead of time.
#[derive(Debug, Clone)]
pub struct StaticVersion(pub VersionInfo);

impl VersionSource for StaticVersion {
    fn probe(&self) -> Result<VersionInfo> {
        Ok(self.0.clone())
    }
}

fn is_usable_tag(tag: &str) -> bool {
    !tag.is_empty() && tag != "." && tag != ".." && !tag.contains(['/', '\\'])
}
