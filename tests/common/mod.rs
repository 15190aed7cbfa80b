//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project directory and in-memory stand-ins for git and the image builder.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use stagebuild::core::events::{BuildObserver, StageEvent};
use stagebuild::core::orchestrator::ArtifactBuilder;
use stagebuild::core::revision::{BranchLister, RemoteBranch};
use stagebuild::error::{BuilderError, GitError};

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Manifest with fully pinned revisions, buildable without git or docker
pub const PINNED_MANIFEST: &str = r#"
[image]
name = "test/unit-test"
base = "ubuntu:noble"

[[package]]
name = "boost"
rev = "1.86.0"
url = "https://example.com/boost-{rev}.tar.gz"
steps = ["./b2 install --prefix={prefix}"]

[[package]]
name = "openbmc/sdbusplus"
depends = ["boost"]
rev = "0123abcd"
steps = ["meson setup build", "ninja -C build install"]

[[package]]
name = "nlohmann/json"
rev = "v3.11.3"
steps = ["cmake -B build", "cmake --install build"]

[[package]]
name = "openbmc/phosphor-logging"
depends = ["openbmc/sdbusplus", "nlohmann/json"]
rev = "feedbeef"
steps = ["meson setup build", "ninja -C build install"]
"#;

/// Manifest whose packages depend on each other
pub const CYCLIC_MANIFEST: &str = r#"
[[package]]
name = "a"
rev = "1"
depends = ["b"]

[[package]]
name = "b"
rev = "1"
depends = ["a"]
"#;

/// Repository a package is looked up at with the default git host
pub fn repo(name: &str) -> String {
    format!("https://github.com/{name}")
}

/// Branch lister answering from a fixed table
#[derive(Default)]
pub struct StaticLister {
    repos: HashMap<String, Result<Vec<RemoteBranch>, GitError>>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Branches of a package on the default git host
    pub fn with_branches(mut self, package: &str, branches: &[(&str, &str)]) -> Self {
        let branches = branches
            .iter()
            .map(|(name, commit)| RemoteBranch::new(name, commit))
            .collect();
        self.repos.insert(repo(package), Ok(branches));
        self
    }

    /// Make lookups of a package fail
    pub fn with_error(mut self, package: &str, error: GitError) -> Self {
        self.repos.insert(repo(package), Err(error));
        self
    }

    /// Make lookups of a package panic
    pub fn panicking(mut self, package: &str) -> Self {
        self.panicking.insert(repo(package));
        self
    }

    /// Number of lookups made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BranchLister for StaticLister {
    fn list_branches(&self, repo: &str) -> Result<Vec<RemoteBranch>, GitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(repo) {
            panic!("branch listing of {repo} panicked");
        }
        self.repos.get(repo).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// One call to [`RecordingBuilder::build`]
#[derive(Debug, Clone)]
pub struct BuildCall {
    pub stage: String,
    pub tag: String,
    pub instructions: String,
    pub started: Instant,
    pub finished: Instant,
}

/// In-memory image store recording every build
#[derive(Default)]
pub struct RecordingBuilder {
    images: Mutex<HashSet<String>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<BuildCall>>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every build take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make builds of `stage` fail
    pub fn failing(mut self, stage: &str) -> Self {
        self.failing.insert(stage.to_string());
        self
    }

    /// Make builds of `stage` panic
    pub fn panicking(mut self, stage: &str) -> Self {
        self.panicking.insert(stage.to_string());
        self
    }

    /// Every build so far, in completion order
    pub fn calls(&self) -> Vec<BuildCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The build of `stage`, if any
    pub fn call(&self, stage: &str) -> Option<BuildCall> {
        self.calls().into_iter().find(|c| c.stage == stage)
    }

    /// Stages built so far
    pub fn built_stages(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.stage).collect()
    }
}

impl ArtifactBuilder for RecordingBuilder {
    fn exists(&self, tag: &str) -> Result<bool, BuilderError> {
        Ok(self.images.lock().unwrap().contains(tag))
    }

    fn build(&self, stage: &str, tag: &str, instructions: &str) -> Result<(), BuilderError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panicking.contains(stage) {
            panic!("build of {stage} panicked");
        }
        if self.failing.contains(stage) {
            return Err(BuilderError::BuildFailed {
                tag: tag.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "recipe failed".to_string(),
            });
        }
        self.images.lock().unwrap().insert(tag.to_string());
        self.calls.lock().unwrap().push(BuildCall {
            stage: stage.to_string(),
            tag: tag.to_string(),
            instructions: instructions.to_string(),
            started,
            finished: Instant::now(),
        });
        Ok(())
    }
}

/// Observer keeping every event
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of one package, in order
    pub fn events_for(&self, name: &str) -> Vec<StageEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }
}

impl BuildObserver for RecordingObserver {
    fn on_event(&self, event: StageEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Observer that panics on selected events
pub struct PanickingObserver {
    trigger: Box<dyn Fn(&StageEvent) -> bool + Send + Sync>,
}

impl PanickingObserver {
    /// Panic when `name` starts
    pub fn on_started(name: &str) -> Self {
        let name = name.to_string();
        Self {
            trigger: Box::new(move |e| matches!(e, StageEvent::Started { name: n } if *n == name)),
        }
    }

    /// Panic when `name` finishes
    pub fn on_finished(name: &str) -> Self {
        let name = name.to_string();
        Self {
            trigger: Box::new(move |e| {
                matches!(e, StageEvent::Finished { name: n, .. } if *n == name)
            }),
        }
    }
}

impl BuildObserver for PanickingObserver {
    fn on_event(&self, event: StageEvent) {
        if (self.trigger)(&event) {
            panic!("observer panicked on {}", event.name());
        }
    }
}
