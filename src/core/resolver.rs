//! Dependency resolution
//!
//! Validates the package graph before any stage starts and computes the
//! build order and build waves shown by `check` and `plan`.

use std::collections::{HashMap, HashSet};

use crate::core::manifest::Manifest;
use crate::error::ResolverError;

/// Dependency graph for packages
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: package -> dependencies
    edges: HashMap<String, Vec<String>>,
    /// Packages in declaration order
    nodes: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of every package in a manifest
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::new();
        for pkg in &manifest.packages {
            graph.add_package(&pkg.name, pkg.depends.clone());
        }
        graph
    }

    /// Add a package to the graph
    pub fn add_package(&mut self, name: &str, dependencies: Vec<String>) {
        if !self.edges.contains_key(name) {
            self.nodes.push(name.to_string());
        }
        self.edges.insert(name.to_string(), dependencies);
    }

    /// Packages in declaration order
    pub fn packages(&self) -> &[String] {
        &self.nodes
    }

    /// Dependencies of a package
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// Check every dependency names a declared package and the graph is acyclic
    pub fn validate(&self) -> Result<(), ResolverError> {
        for name in &self.nodes {
            for dep in self.dependencies(name) {
                if !self.edges.contains_key(dep) {
                    return Err(ResolverError::MissingDependency {
                        package: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.topological_sort().map(|_| ())
    }

    /// Compute topological sort (build order)
    ///
    /// Returns packages in order such that dependencies come before dependents.
    /// Ties follow declaration order.
    pub fn topological_sort(&self) -> Result<Vec<String>, ResolverError> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::new();
        let mut cycle_path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.visit(
                    node,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                    &mut cycle_path,
                )?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
        cycle_path: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        if temp_visited.contains(node) {
            // Report only the loop itself, not the path that led into it
            let start = cycle_path.iter().position(|n| n == node).unwrap_or(0);
            let mut cycle = cycle_path[start..].to_vec();
            cycle.push(node.to_string());
            return Err(ResolverError::CircularDependency { cycle });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        cycle_path.push(node.to_string());

        for dep in self.dependencies(node) {
            self.visit(dep, visited, temp_visited, result, cycle_path)?;
        }

        cycle_path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Group packages into waves: wave N holds packages whose longest
    /// dependency chain has length N. Packages in one wave can build together.
    pub fn waves(&self) -> Result<Vec<Vec<String>>, ResolverError> {
        self.validate()?;

        let mut depth: HashMap<String, usize> = HashMap::new();
        for name in self.topological_sort()? {
            let level = self
                .dependencies(&name)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name, level);
        }

        let max = depth.values().copied().max().map_or(0, |m| m + 1);
        let mut waves = vec![Vec::new(); max];
        for name in &self.nodes {
            if let Some(level) = depth.get(name) {
                waves[*level].push(name.clone());
            }
        }
        Ok(waves)
    }
}
