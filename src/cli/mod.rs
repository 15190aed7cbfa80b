//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::defaults;
use commands::Commands;

/// Stagebuild - dependency-ordered parallel container image builder
///
/// Builds one image per package, in dependency order, and combines them
/// into a final image.
#[derive(Parser, Debug)]
#[command(name = "stagebuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors and results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the manifest
    #[arg(
        short,
        long,
        global = true,
        env = "STAGEBUILD_MANIFEST",
        default_value = defaults::MANIFEST_FILE
    )]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Default log level for the verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run(&self.manifest, self.quiet).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = Cli::parse_from(["stagebuild", "-vv", "check"]);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
        let cli = Cli::parse_from(["stagebuild", "--quiet", "-v", "check"]);
        assert_eq!(cli.log_level(), tracing::Level::ERROR);
    }
}
