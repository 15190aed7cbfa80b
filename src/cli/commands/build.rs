//! Build command implementation
//!
//! Implements `stagebuild build`: builds every package stage in dependency
//! order, then the final image, and prints the final tag on stdout.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::output::{outcome_label, status, ProgressObserver};
use crate::core::manifest::Manifest;
use crate::core::orchestrator::{ArtifactBuilder, Orchestrator, OrchestratorOptions};
use crate::core::registry::BuildOutcome;
use crate::core::revision::RevisionPolicy;
use crate::core::tag::TagScheme;
use crate::infra::docker::{DockerBuilder, EmitBuilder};
use crate::infra::git::GitLsRemote;

/// Build options
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Branch override
    pub branch: Option<String>,
    /// Rebuild existing tags
    pub force: bool,
    /// Registry override
    pub registry: Option<String>,
    /// Package with an externally supplied revision
    pub pin_project: Option<String>,
    /// Revision for `pin_project`
    pub pin_rev: Option<String>,
    /// Tag epoch override
    pub epoch: Option<String>,
    /// Dry run output directory
    pub emit_dir: Option<PathBuf>,
    /// Hide progress output
    pub quiet: bool,
}

/// Apply command-line overrides to the manifest
fn apply_overrides(manifest: &mut Manifest, options: &BuildOptions) {
    if let Some(branch) = &options.branch {
        manifest.image.branch.clone_from(branch);
    }
    if let Some(registry) = &options.registry {
        manifest.image.registry = Some(registry.clone());
    }
}

/// Execute the build command
pub async fn execute(manifest_path: &Path, options: BuildOptions) -> Result<()> {
    let mut manifest = Manifest::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    apply_overrides(&mut manifest, &options);

    let repository = manifest.image.repository();
    let tags = match &options.epoch {
        Some(epoch) => TagScheme::new(&repository, epoch),
        None => TagScheme::for_current_week(&repository),
    };

    let builder: Arc<dyn ArtifactBuilder> = match &options.emit_dir {
        Some(dir) => Arc::new(EmitBuilder::new(dir.clone())),
        None => Arc::new(
            DockerBuilder::locate()
                .context("docker is required to build images (use --emit-dir for a dry run)")?
                .with_proxy_from_env(),
        ),
    };
    // git is only needed for unpinned packages; a missing binary fails those stages
    let lister = Arc::new(
        GitLsRemote::locate().unwrap_or_else(|_| GitLsRemote::new(PathBuf::from("git"))),
    );

    let observer = Arc::new(if options.quiet {
        ProgressObserver::hidden()
    } else {
        ProgressObserver::new(manifest.packages.len())
    });

    let orchestrator = Orchestrator::new(lister, builder, tags)
        .with_observer(observer.clone())
        .with_options(OrchestratorOptions {
            policy: RevisionPolicy {
                branch: manifest.image.branch.clone(),
                pin_project: options.pin_project.clone(),
                pin_rev: options.pin_rev.clone(),
            },
            force: options.force,
        });

    tracing::info!("Building image {repository}");
    let result = orchestrator.build_image(&manifest).await;
    observer.finish();
    let image = result.context("Image build failed")?;

    if !options.quiet {
        eprintln!("{} Build complete!", status::SUCCESS);
        eprintln!(
            "  Packages: {} built, {} cached",
            image.report.count(BuildOutcome::Built),
            image.report.count(BuildOutcome::Cached)
        );
        eprintln!("  Final image: {}", outcome_label(image.outcome));
        if let Some(dir) = &options.emit_dir {
            eprintln!("  Stages written to {}", dir.display());
        }
    }
    println!("{}", image.tag);

    Ok(())
}
