//! Check command implementation
//!
//! Implements `stagebuild check` to validate the manifest and the build
//! environment without building anything.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::status;
use crate::core::manifest::Manifest;
use crate::core::resolver::DependencyGraph;

/// Execute the check command
pub async fn execute(manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;

    tracing::info!("Checking image: {}", manifest.image.repository());
    println!("Checking {}...\n", manifest_path.display());
    println!("{} Manifest is valid", status::SUCCESS);

    let graph = DependencyGraph::from_manifest(&manifest);
    let order = match graph.validate().and_then(|()| graph.topological_sort()) {
        Ok(order) => {
            println!("{} All dependencies are resolvable", status::SUCCESS);
            Some(order)
        }
        Err(e) => {
            println!("{} {e}", status::ERROR);
            None
        }
    };

    let needs_git = manifest.packages.iter().any(|p| p.rev.is_none());
    match which::which("git") {
        Ok(path) => println!("{} git found at {}", status::SUCCESS, path.display()),
        Err(_) if needs_git => println!(
            "{} git not found in PATH (required for packages without a pinned rev)",
            status::WARNING
        ),
        Err(_) => println!("{} git not found in PATH (not needed)", status::WARNING),
    }
    match which::which("docker") {
        Ok(path) => println!("{} docker found at {}", status::SUCCESS, path.display()),
        Err(_) => println!(
            "{} docker not found in PATH (only --emit-dir builds will work)",
            status::WARNING
        ),
    }

    let Some(order) = order else {
        bail!("Dependency graph is invalid");
    };

    println!("\nBuild order:");
    if order.is_empty() {
        println!("  (none)");
    }
    for name in &order {
        println!("  • {name}");
    }

    Ok(())
}
