//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::Cli;

/// Write completions for `shell` to standard output.
pub fn completions(shell: Shell) {
    generate(shell, &mut Cli::command(), "libbundle", &mut std::io::stdout());
}
