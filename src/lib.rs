//! Stagebuild - dependency-ordered parallel container image builder
//!
//! Builds one image layer per package of a dependency graph, each tagged by
//! a hash of its fully materialized build instructions, and combines them
//! into a final image. Unchanged packages keep their tags and are never
//! rebuilt.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic (no I/O operations)
//! - [`infra`] - Infrastructure layer (git, docker)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
