//! Error types for stagebuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest loading and validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found at '{path}'")]
    NotFound { path: PathBuf },

    /// IO error while reading the manifest
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// TOML parse error
    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    /// Package declared more than once
    #[error("Package '{name}' is declared more than once")]
    DuplicatePackage { name: String },

    /// Package with an empty name
    #[error("Package #{index} has an empty name")]
    EmptyName { index: usize },

    /// Two packages map to the same stage name
    #[error("Packages '{first}' and '{second}' both use stage name '{stage}'")]
    StageNameCollision {
        first: String,
        second: String,
        stage: String,
    },

    /// Package stage name is reserved for the final image
    #[error("Package '{name}' uses the stage name reserved for the final image")]
    ReservedStageName { name: String },
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Missing dependency
    #[error("Missing dependency: '{dependency}' required by '{package}'")]
    MissingDependency { package: String, dependency: String },
}

/// Remote branch lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// git binary could not be located
    #[error("git executable not found in PATH")]
    GitNotFound,

    /// ls-remote returned a failure
    #[error("Failed to list branches of '{repo}': {error}")]
    LsRemoteFailed { repo: String, error: String },

    /// ls-remote output could not be parsed
    #[error("Unexpected ls-remote output for '{repo}': {line}")]
    MalformedOutput { repo: String, line: String },
}

/// Artifact builder errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// Builder tool could not be located
    #[error("{tool} executable not found in PATH")]
    ToolNotFound { tool: String },

    /// Failed to spawn or talk to the builder process
    #[error("Failed to run builder for '{tag}': {error}")]
    SpawnFailed { tag: String, error: String },

    /// Builder exited unsuccessfully
    #[error("Build of '{tag}' failed ({status}): {stderr}")]
    BuildFailed {
        tag: String,
        status: String,
        stderr: String,
    },

    /// IO error while writing build output
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Failure of a single package stage, captured on its record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Revision lookup failed
    #[error("Revision lookup failed: {0}")]
    Git(#[from] GitError),

    /// No revision could be determined
    #[error("No revision resolved for '{package}' (branch '{branch}', no master/main fallback)")]
    UnresolvedRevision { package: String, branch: String },

    /// A dependency finished without producing a tag
    #[error("Dependency '{dependency}' of '{package}' did not produce an image")]
    DependencyUnavailable { package: String, dependency: String },

    /// Builder failure
    #[error("Builder error: {0}")]
    Builder(#[from] BuilderError),

    /// Stage task stopped unexpectedly
    #[error("Stage '{package}' aborted: {error}")]
    Aborted { package: String, error: String },
}

/// Orchestration errors
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Dependency graph is invalid
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// A stage failed
    #[error("Stage '{package}' failed: {source}")]
    Stage {
        package: String,
        #[source]
        source: StageError,
    },
}

/// Top-level stagebuild error type
#[derive(Error, Debug)]
pub enum StagebuildError {
    /// Package stages failed
    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),

    /// Final image failed
    #[error("Final image failed: {0}")]
    FinalImage(#[from] StageError),
}
