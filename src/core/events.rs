//! Stage lifecycle events
//!
//! The orchestrator reports progress through a [`BuildObserver`]; the CLI
//! drives a progress bar from it and tests record it.

use crate::core::registry::BuildOutcome;
use crate::core::revision::RevisionSource;

/// Something that happened to a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Task began running
    Started { name: String },
    /// Revision determined
    RevisionResolved {
        name: String,
        revision: String,
        source: RevisionSource,
    },
    /// Every dependency reached a terminal state
    DependenciesReady { name: String },
    /// Stage text rendered and tagged
    Materialized { name: String, tag: String },
    /// Stage finished
    Finished {
        name: String,
        result: Result<BuildOutcome, String>,
        elapsed_ms: u128,
    },
}

impl StageEvent {
    /// Package the event belongs to
    pub fn name(&self) -> &str {
        match self {
            Self::Started { name }
            | Self::RevisionResolved { name, .. }
            | Self::DependenciesReady { name }
            | Self::Materialized { name, .. }
            | Self::Finished { name, .. } => name,
        }
    }
}

/// Receives stage events; called from many tasks concurrently
pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: StageEvent);
}

/// Observer that discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {
    fn on_event(&self, _event: StageEvent) {}
}
