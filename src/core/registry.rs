//! Shared stage registry
//!
//! One [`StageRecord`] per package holds everything computed during a run:
//! state, resolved revision, tag, outcome and captured failure. Records are
//! looked up by package name. A single mutex guards the whole map and is only
//! held for in-memory reads and writes; state changes are published through a
//! `watch` channel per record so dependents can wait without the lock.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::error::StageError;

/// Lifecycle of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Registered, not yet started
    Pending,
    /// Task is running
    Running,
    /// Image built or already present
    Succeeded,
    /// Task failed; the failure is on the record
    Failed,
}

impl StageState {
    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a successful stage got its image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    /// The builder produced a new image
    Built,
    /// An image with the same tag already existed
    Cached,
}

/// Computed data of one stage
#[derive(Debug)]
struct StageRecord {
    state: watch::Sender<StageState>,
    revision: Option<String>,
    tag: Option<String>,
    outcome: Option<BuildOutcome>,
    failure: Option<StageError>,
}

impl StageRecord {
    fn new() -> Self {
        let (state, _) = watch::channel(StageState::Pending);
        Self {
            state,
            revision: None,
            tag: None,
            outcome: None,
            failure: None,
        }
    }

    fn current(&self) -> StageState {
        *self.state.borrow()
    }
}

/// Point-in-time copy of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    /// Package name
    pub name: String,
    /// Current state
    pub state: StageState,
    /// Resolved revision
    pub revision: Option<String>,
    /// Computed tag
    pub tag: Option<String>,
    /// Outcome of a successful stage
    pub outcome: Option<BuildOutcome>,
}

/// Registry of every stage in one run
#[derive(Debug, Default)]
pub struct StageRegistry {
    records: Mutex<HashMap<String, StageRecord>>,
}

impl StageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StageRecord>> {
        // A panicking task cannot leave a record half-written: every critical
        // section is a single field assignment.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register every name in one critical section
    ///
    /// Names already present are left untouched.
    pub fn register_all<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut records = self.lock();
        for name in names {
            records
                .entry(name.to_string())
                .or_insert_with(StageRecord::new);
        }
    }

    /// Whether a stage is registered
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Current state of a stage
    pub fn state(&self, name: &str) -> Option<StageState> {
        self.lock().get(name).map(StageRecord::current)
    }

    /// State receiver of a stage, for waiting outside the lock
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<StageState>> {
        self.lock().get(name).map(|r| r.state.subscribe())
    }

    /// Mark a pending stage as running
    pub fn mark_running(&self, name: &str) {
        if let Some(record) = self.lock().get(name) {
            record
                .state
                .send_if_modified(|state| advance(state, StageState::Running));
        }
    }

    /// Record the resolved revision; the first write wins
    pub fn record_revision(&self, name: &str, revision: &str) -> bool {
        match self.lock().get_mut(name) {
            Some(record) if record.revision.is_none() => {
                record.revision = Some(revision.to_string());
                true
            }
            _ => false,
        }
    }

    /// Resolved revision of a stage
    pub fn revision(&self, name: &str) -> Option<String> {
        self.lock().get(name).and_then(|r| r.revision.clone())
    }

    /// Record the computed tag
    pub fn record_tag(&self, name: &str, tag: &str) {
        if let Some(record) = self.lock().get_mut(name) {
            record.tag = Some(tag.to_string());
        }
    }

    /// Computed tag of a stage
    pub fn tag(&self, name: &str) -> Option<String> {
        self.lock().get(name).and_then(|r| r.tag.clone())
    }

    /// Tags of several stages, read in one critical section
    pub fn tags<'a, I>(&self, names: I) -> Vec<(String, Option<String>)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let records = self.lock();
        names
            .into_iter()
            .map(|n| (n.clone(), records.get(n).and_then(|r| r.tag.clone())))
            .collect()
    }

    /// Move a stage to its terminal state
    ///
    /// Finishing an already terminal stage is ignored.
    pub fn finish(&self, name: &str, result: Result<BuildOutcome, StageError>) {
        let mut records = self.lock();
        let Some(record) = records.get_mut(name) else {
            return;
        };
        if record.current().is_terminal() {
            return;
        }
        let next = match result {
            Ok(outcome) => {
                record.outcome = Some(outcome);
                StageState::Succeeded
            }
            Err(error) => {
                record.failure = Some(error);
                StageState::Failed
            }
        };
        record
            .state
            .send_if_modified(|state| advance(state, next));
    }

    /// Captured failure of a stage
    pub fn failure(&self, name: &str) -> Option<StageError> {
        self.lock().get(name).and_then(|r| r.failure.clone())
    }

    /// Snapshot of a stage
    pub fn snapshot(&self, name: &str) -> Option<StageSnapshot> {
        self.lock().get(name).map(|r| StageSnapshot {
            name: name.to_string(),
            state: r.current(),
            revision: r.revision.clone(),
            tag: r.tag.clone(),
            outcome: r.outcome,
        })
    }
}

/// Apply a forward-only transition
fn advance(state: &mut StageState, next: StageState) -> bool {
    if state.is_terminal() || next <= *state {
        return false;
    }
    *state = next;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_starts_pending() {
        let registry = StageRegistry::new();
        registry.register_all(["a", "b"]);
        assert_eq!(registry.state("a"), Some(StageState::Pending));
        assert_eq!(registry.state("b"), Some(StageState::Pending));
        assert_eq!(registry.state("c"), None);
    }

    #[test]
    fn test_state_is_monotonic() {
        let registry = StageRegistry::new();
        registry.register_all(["a"]);
        registry.mark_running("a");
        registry.finish("a", Ok(BuildOutcome::Built));
        registry.mark_running("a");
        registry.finish(
            "a",
            Err(StageError::Aborted {
                package: "a".to_string(),
                error: "late".to_string(),
            }),
        );

        assert_eq!(registry.state("a"), Some(StageState::Succeeded));
        assert_eq!(registry.failure("a"), None);
    }

    #[test]
    fn test_first_revision_wins() {
        let registry = StageRegistry::new();
        registry.register_all(["a"]);
        assert!(registry.record_revision("a", "r1"));
        assert!(!registry.record_revision("a", "r2"));
        assert_eq!(registry.revision("a").as_deref(), Some("r1"));
    }

    #[test]
    fn test_failure_captured() {
        let registry = StageRegistry::new();
        registry.register_all(["a"]);
        let error = StageError::UnresolvedRevision {
            package: "a".to_string(),
            branch: "dev".to_string(),
        };
        registry.finish("a", Err(error.clone()));

        assert_eq!(registry.state("a"), Some(StageState::Failed));
        assert_eq!(registry.failure("a"), Some(error));
        let snapshot = registry.snapshot("a").unwrap();
        assert_eq!(snapshot.outcome, None);
    }

    #[tokio::test]
    async fn test_subscriber_sees_terminal_state() {
        let registry = std::sync::Arc::new(StageRegistry::new());
        registry.register_all(["a"]);
        let mut rx = registry.subscribe("a").unwrap();

        let writer = registry.clone();
        tokio::spawn(async move {
            writer.mark_running("a");
            writer.record_tag("a", "repo-a:w-0");
            writer.finish("a", Ok(BuildOutcome::Cached));
        });

        let state = *rx.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(state, StageState::Succeeded);
        assert_eq!(registry.tag("a").as_deref(), Some("repo-a:w-0"));
    }
}
