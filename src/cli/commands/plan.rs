//! Plan command implementation
//!
//! Implements `stagebuild plan`: shows which packages can build together.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::core::manifest::Manifest;
use crate::core::resolver::DependencyGraph;

/// Build plan of a manifest
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Plan {
    /// Topological build order
    pub order: Vec<String>,
    /// Packages grouped by dependency depth
    pub waves: Vec<Vec<String>>,
}

/// Compute the plan of `manifest`
pub fn plan(manifest: &Manifest) -> Result<Plan> {
    let graph = DependencyGraph::from_manifest(manifest);
    let waves = graph.waves()?;
    let order = graph.topological_sort()?;
    Ok(Plan { order, waves })
}

/// Render a plan as text
pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for (i, wave) in plan.waves.iter().enumerate() {
        out.push_str(&format!("Wave {}: {}\n", i + 1, wave.join(", ")));
    }
    if plan.waves.is_empty() {
        out.push_str("(no packages)\n");
    }
    out
}

/// Execute the plan command
pub async fn execute(manifest_path: &Path, json: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    let plan = plan(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", format_plan(&plan));
    }
    Ok(())
}
