//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod plan;

use anyhow::Result;
use clap::Subcommand;
use std::path::{Path, PathBuf};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build every package stage and the final image
    Build {
        /// Branch used to resolve unpinned revisions
        #[arg(short, long, env = "BRANCH")]
        branch: Option<String>,

        /// Rebuild images even if their tag already exists
        #[arg(short, long, env = "FORCE_DOCKER_BUILD", value_parser = clap::builder::FalseyValueParser::new())]
        force: bool,

        /// Registry prefixed to every tag
        #[arg(long, env = "DOCKER_REG")]
        registry: Option<String>,

        /// Package whose revision is given by --pin-rev
        #[arg(long, env = "GERRIT_PROJECT")]
        pin_project: Option<String>,

        /// Revision used for --pin-project
        #[arg(long, env = "GERRIT_PATCHSET_REVISION")]
        pin_rev: Option<String>,

        /// Tag epoch instead of the current ISO week
        #[arg(long, env = "STAGEBUILD_EPOCH")]
        epoch: Option<String>,

        /// Write stage files into this directory instead of building
        #[arg(long, value_name = "DIR")]
        emit_dir: Option<PathBuf>,
    },

    /// Validate the manifest and the build environment
    Check,

    /// Show build waves
    Plan {
        /// Output in JSON format for scripting
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, manifest: &Path, quiet: bool) -> Result<()> {
        match self {
            Self::Build {
                branch,
                force,
                registry,
                pin_project,
                pin_rev,
                epoch,
                emit_dir,
            } => {
                let options = build::BuildOptions {
                    branch,
                    force,
                    registry,
                    pin_project,
                    pin_rev,
                    epoch,
                    emit_dir,
                    quiet,
                };
                build::execute(manifest, options).await
            }
            Self::Check => check::execute(manifest).await,
            Self::Plan { json } => plan::execute(manifest, json).await,
        }
    }
}
