//! Core business logic module
//!
//! Everything here is independent of git and docker; those are reached
//! through the [`revision::BranchLister`] and
//! [`orchestrator::ArtifactBuilder`] traits implemented in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (stages.toml) parsing and validation
//! - [`resolver`] - Dependency graph validation and build order
//! - [`revision`] - Revision selection from upstream branches
//! - [`materialize`] - Stage text rendering
//! - [`tag`] - Content-addressed tags
//! - [`registry`] - Shared per-stage state of a run
//! - [`events`] - Stage lifecycle events
//! - [`orchestrator`] - Dependency-ordered parallel build

pub mod events;
pub mod manifest;
pub mod materialize;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod revision;
pub mod tag;
