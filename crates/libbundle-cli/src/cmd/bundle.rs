//! The bundling run.

use anyhow::{Context, Result};
use libbundle_core::{Bundler, LoadedConfig};
use libbundle_schema::BuildMode;

use crate::Cli;
use crate::report;

/// Load configuration, run the bundler and print its report.
pub fn bundle(cli: &Cli, mode: BuildMode) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let loaded = LoadedConfig::discover(cli.config.as_deref(), &cwd)?;
    match &loaded.origin {
        Some(path) => tracing::info!("Using config {}", path.display()),
        None => tracing::info!("Using built-in configuration"),
    }

    let mut settings = loaded
        .config
        .resolve(mode, &loaded.base_dir)
        .with_dry_run(cli.dry_run);
    if let Some(platform) = cli.platform {
        settings = settings.with_platform(platform);
    }

    let outcome = Bundler::native(settings).run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", report::render(&outcome));
    }

    let violations = outcome.violation_count();
    if violations > 0 {
        tracing::warn!("{violations} reference(s) still point outside their variant directory");
    }

    Ok(())
}
