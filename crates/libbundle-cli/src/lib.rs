//! libbundle - bundle prebuilt shared libraries
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Copies an engine library and its third-party dependencies into a
//! versioned, per-variant directory and rewrites their load paths so each
//! directory can be shipped inside an application bundle.
//!
//! # Bundle Layout
//!
//! ```text
//! <output_root>/
//! ├── llama_version.h     # upstream tag, commit date and hash
//! └── <version_tag>/
//!     └── metal/          # engine + libraries, @loader_path-linked
//! ```

pub mod cmd;
pub mod report;

use clap::Parser;
use clap_complete::Shell;
use libbundle_core::CONFIG_ENV;
use libbundle_schema::{BuildMode, Platform};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "libbundle")]
#[command(author, version, about = "Bundle prebuilt shared libraries into relocatable directories")]
pub struct Cli {
    /// Build mode: debug, release, test or debugtest (default: release)
    pub mode: Option<String>,

    /// Config file (default: ./libbundle.toml, else built-in defaults)
    #[arg(long, short = 'c', env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Show what would happen without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Target platform, overriding the config (macos, windows)
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Print the run report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print shell completions and exit
    #[arg(long, value_name = "SHELL", exclusive = true)]
    pub completions: Option<Shell>,
}

impl Cli {
    /// The selected mode: `Some(Ok)` for a recognized mode, `Some(Err)`
    /// carrying the raw text for an unrecognized one, `None` when omitted.
    pub fn build_mode(&self) -> Option<Result<BuildMode, String>> {
        self.mode
            .as_deref()
            .map(|raw| raw.parse::<BuildMode>().map_err(|_| raw.to_string()))
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self, mode: BuildMode) -> &'static str {
        if self.verbose || mode.is_debug() {
            "debug"
        } else {
            "info"
        }
    }
}
