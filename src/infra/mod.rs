//! Infrastructure layer
//!
//! Handles all external processes: git for branch listings, docker for
//! image builds. This module is the only place where side effects occur.

pub mod docker;
pub mod git;
