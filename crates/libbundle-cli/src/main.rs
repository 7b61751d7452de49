//! libbundle - bundle prebuilt shared libraries

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use libbundle_cli::Cli;
use libbundle_cli::cmd;
use libbundle_schema::BuildMode;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        cmd::completions::completions(shell);
        return Ok(());
    }

    // An unknown mode is not an error: log it and leave everything untouched.
    let mode = match cli.build_mode() {
        Some(Ok(mode)) => mode,
        None => BuildMode::default(),
        Some(Err(raw)) => {
            init_logging(cli.log_level(BuildMode::default()));
            tracing::info!("Undefined mode '{raw}', nothing to do");
            return Ok(());
        }
    };

    init_logging(cli.log_level(mode));
    tracing::debug!("Mode {mode}: output {}, input {}", mode.output_profile(), mode.input_profile());

    cmd::bundle::bundle(&cli, mode)
}

/// Logs go to stderr so stdout carries only the report.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
