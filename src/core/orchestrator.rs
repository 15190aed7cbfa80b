//! Build orchestration
//!
//! Builds one image per package. Every package runs in its own tokio task,
//! all started together; a task only waits on the tasks of its declared
//! dependencies, so independent packages build concurrently while each
//! package's stage text can embed the finished tags of its dependencies.
//!
//! Per task:
//!
//! 1. resolve the revision (pinned, override, or upstream branch head)
//! 2. wait until every dependency is terminal
//! 3. render the stage text and hash it into a tag
//! 4. skip if the builder already has that tag, build otherwise
//!
//! Failures are captured on the stage record and never cancel siblings.
//! Once every task has been joined, the first failure in manifest order is
//! returned.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::config::defaults;
use crate::core::events::{BuildObserver, NoopObserver, StageEvent};
use crate::core::manifest::{ImageConfig, Manifest, PackageSpec};
use crate::core::materialize::{self, BuiltPackage, DependencyTag};
use crate::core::registry::{BuildOutcome, StageRegistry, StageSnapshot, StageState};
use crate::core::resolver::DependencyGraph;
use crate::core::revision::{select_revision, BranchLister, RevisionPolicy, RevisionSource};
use crate::core::tag::TagScheme;
use crate::error::{BuilderError, OrchestratorError, StageError, StagebuildError};

/// Builds and stores images by tag
///
/// Implementations may block; the orchestrator calls them on the blocking pool.
pub trait ArtifactBuilder: Send + Sync {
    /// Whether an image with `tag` already exists
    fn exists(&self, tag: &str) -> Result<bool, BuilderError>;

    /// Build `instructions` and store the result as `tag`
    fn build(&self, stage: &str, tag: &str, instructions: &str) -> Result<(), BuilderError>;
}

/// Orchestrator settings
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Revision policy; an empty branch means the manifest's branch
    pub policy: RevisionPolicy,
    /// Rebuild even when the tag already exists
    pub force: bool,
}

/// Result of a successful run, stages in manifest order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Every stage
    pub stages: Vec<StageSnapshot>,
}

impl BuildReport {
    /// Snapshot of one stage
    pub fn stage(&self, name: &str) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Tag of one stage
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.stage(name).and_then(|s| s.tag.as_deref())
    }

    /// Number of stages with the given outcome
    pub fn count(&self, outcome: BuildOutcome) -> usize {
        self.stages
            .iter()
            .filter(|s| s.outcome == Some(outcome))
            .count()
    }

    /// Every stage as an input of the final image
    pub fn built_packages(&self) -> Vec<BuiltPackage> {
        self.stages
            .iter()
            .filter_map(|s| {
                Some(BuiltPackage {
                    name: s.name.clone(),
                    revision: s.revision.clone()?,
                    tag: s.tag.clone()?,
                })
            })
            .collect()
    }
}

/// The final combined image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalImage {
    /// Final image tag
    pub tag: String,
    /// Whether it was built or already present
    pub outcome: BuildOutcome,
    /// Package stages it was assembled from
    pub report: BuildReport,
}

/// Everything a stage task needs, shared by all tasks of one run
struct StageContext {
    image: ImageConfig,
    policy: RevisionPolicy,
    force: bool,
    tags: TagScheme,
    registry: Arc<StageRegistry>,
    lister: Arc<dyn BranchLister>,
    builder: Arc<dyn ArtifactBuilder>,
    observer: Arc<dyn BuildObserver>,
}

/// Dependency-ordered parallel image builder
pub struct Orchestrator {
    lister: Arc<dyn BranchLister>,
    builder: Arc<dyn ArtifactBuilder>,
    observer: Arc<dyn BuildObserver>,
    tags: TagScheme,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        lister: Arc<dyn BranchLister>,
        builder: Arc<dyn ArtifactBuilder>,
        tags: TagScheme,
    ) -> Self {
        Self {
            lister,
            builder,
            observer: Arc::new(NoopObserver),
            tags,
            options: OrchestratorOptions::default(),
        }
    }

    /// Report stage events to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set options
    #[must_use]
    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Tag scheme of this run
    pub fn tags(&self) -> &TagScheme {
        &self.tags
    }

    /// Build every package of `manifest`
    ///
    /// The graph is validated first: a missing dependency or a cycle is
    /// reported before any task starts.
    pub async fn generate_all(&self, manifest: &Manifest) -> Result<BuildReport, OrchestratorError> {
        DependencyGraph::from_manifest(manifest).validate()?;

        let registry = Arc::new(StageRegistry::new());
        // All records exist before the first task can look one up
        registry.register_all(manifest.packages.iter().map(|p| p.name.as_str()));

        let mut policy = self.options.policy.clone();
        if policy.branch.is_empty() {
            policy.branch.clone_from(&manifest.image.branch);
        }
        let ctx = Arc::new(StageContext {
            image: manifest.image.clone(),
            policy,
            force: self.options.force,
            tags: self.tags.clone(),
            registry: registry.clone(),
            lister: self.lister.clone(),
            builder: self.builder.clone(),
            observer: self.observer.clone(),
        });

        tracing::info!(
            "Building {} packages on branch '{}'",
            manifest.packages.len(),
            ctx.policy.branch
        );

        let handles: Vec<_> = manifest
            .packages
            .iter()
            .map(|spec| {
                let ctx = ctx.clone();
                let spec = spec.clone();
                let name = spec.name.clone();
                (name, tokio::spawn(async move { run_stage(&ctx, &spec).await }))
            })
            .collect();

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                registry.finish(
                    &name,
                    Err(StageError::Aborted {
                        package: name.clone(),
                        error: e.to_string(),
                    }),
                );
            }
        }

        for spec in &manifest.packages {
            if let Some(source) = registry.failure(&spec.name) {
                return Err(OrchestratorError::Stage {
                    package: spec.name.clone(),
                    source,
                });
            }
        }

        let stages = manifest
            .packages
            .iter()
            .filter_map(|spec| registry.snapshot(&spec.name))
            .collect();
        Ok(BuildReport { stages })
    }

    /// Build the final image combining every stage of `report`
    pub async fn build_final(
        &self,
        image: &ImageConfig,
        report: BuildReport,
    ) -> Result<FinalImage, StageError> {
        let text = materialize::render_final(image, &report.built_packages());
        let tag = self.tags.tag(None, &text);
        tracing::debug!("Final image {tag}:\n{text}");

        let outcome = run_builder(
            self.builder.clone(),
            defaults::FINAL_STAGE.to_string(),
            tag.clone(),
            text,
            self.options.force,
        )
        .await?;

        Ok(FinalImage {
            tag,
            outcome,
            report,
        })
    }

    /// Build every package, then the final image
    pub async fn build_image(&self, manifest: &Manifest) -> Result<FinalImage, StagebuildError> {
        let report = self.generate_all(manifest).await?;
        Ok(self.build_final(&manifest.image, report).await?)
    }
}

/// Task body: run one stage and record its terminal state
async fn run_stage(ctx: &StageContext, spec: &PackageSpec) {
    let start = Instant::now();
    ctx.registry.mark_running(&spec.name);

    // Everything between Running and the terminal state runs under one
    // catch_unwind, so dependents always see this record finish
    let result = AssertUnwindSafe(async {
        ctx.observer.on_event(StageEvent::Started {
            name: spec.name.clone(),
        });
        build_stage(ctx, spec).await
    })
    .catch_unwind()
    .await
    .unwrap_or_else(|payload| {
        Err(StageError::Aborted {
            package: spec.name.clone(),
            error: panic_message(payload.as_ref()),
        })
    });

    match &result {
        Ok(BuildOutcome::Cached) => tracing::info!("Package {} is up to date, skipping", spec.name),
        Ok(BuildOutcome::Built) => tracing::info!("Built package {}", spec.name),
        Err(e) => tracing::warn!("Package {} failed: {e}", spec.name),
    }

    let event = StageEvent::Finished {
        name: spec.name.clone(),
        result: result.clone().map_err(|e| e.to_string()),
        elapsed_ms: start.elapsed().as_millis(),
    };
    ctx.registry.finish(&spec.name, result);
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.observer.on_event(event))) {
        tracing::warn!(
            "Observer panicked on {}: {}",
            spec.name,
            panic_message(payload.as_ref())
        );
    }
}

async fn build_stage(ctx: &StageContext, spec: &PackageSpec) -> Result<BuildOutcome, StageError> {
    resolve_revision(ctx, spec).await?;
    wait_for_dependencies(ctx, spec).await?;
    ctx.observer.on_event(StageEvent::DependenciesReady {
        name: spec.name.clone(),
    });

    let revision =
        ctx.registry
            .revision(&spec.name)
            .ok_or_else(|| StageError::UnresolvedRevision {
                package: spec.name.clone(),
                branch: ctx.policy.branch.clone(),
            })?;

    let mut dependencies = Vec::with_capacity(spec.depends.len());
    for (name, tag) in ctx.registry.tags(&spec.depends) {
        let tag = tag.ok_or_else(|| StageError::DependencyUnavailable {
            package: spec.name.clone(),
            dependency: name.clone(),
        })?;
        dependencies.push(DependencyTag { name, tag });
    }

    let stage = spec.stage_name();
    let text = materialize::render_stage(&ctx.image, spec, &revision, &dependencies);
    let tag = ctx.tags.tag(Some(&stage), &text);
    ctx.registry.record_tag(&spec.name, &tag);
    tracing::debug!("Stage {stage} -> {tag}:\n{text}");
    ctx.observer.on_event(StageEvent::Materialized {
        name: spec.name.clone(),
        tag: tag.clone(),
    });

    run_builder(ctx.builder.clone(), stage, tag, text, ctx.force).await
}

/// Resolve and record the revision of `spec`
///
/// Leaves the revision unset when upstream has neither the configured branch
/// nor a fallback; materialization reports that.
async fn resolve_revision(ctx: &StageContext, spec: &PackageSpec) -> Result<(), StageError> {
    let resolved = match ctx.policy.static_revision(spec) {
        Some(found) => Some(found),
        None => {
            let repo = spec.repository(&ctx.image.git_host);
            tracing::debug!("Looking up branch '{}' of {repo}", ctx.policy.branch);
            let lister = ctx.lister.clone();
            let branches = tokio::task::spawn_blocking(move || lister.list_branches(&repo))
                .await
                .map_err(|e| StageError::Aborted {
                    package: spec.name.clone(),
                    error: e.to_string(),
                })??;
            select_revision(&branches, &ctx.policy.branch)
        }
    };

    let Some((revision, source)) = resolved else {
        tracing::warn!(
            "No branch '{}' nor master/main found for {}",
            ctx.policy.branch,
            spec.name
        );
        return Ok(());
    };

    if source == RevisionSource::Fallback {
        tracing::warn!(
            "Branch '{}' not found for {}, using default branch",
            ctx.policy.branch,
            spec.name
        );
    }
    ctx.registry.record_revision(&spec.name, &revision);
    ctx.observer.on_event(StageEvent::RevisionResolved {
        name: spec.name.clone(),
        revision,
        source,
    });
    Ok(())
}

/// Wait until every dependency is terminal; a failed dependency fails `spec`
async fn wait_for_dependencies(ctx: &StageContext, spec: &PackageSpec) -> Result<(), StageError> {
    let mut receivers = Vec::with_capacity(spec.depends.len());
    for dep in &spec.depends {
        let rx = ctx
            .registry
            .subscribe(dep)
            .ok_or_else(|| StageError::DependencyUnavailable {
                package: spec.name.clone(),
                dependency: dep.clone(),
            })?;
        receivers.push((dep.clone(), rx));
    }

    let waits = receivers.into_iter().map(|(dep, mut rx)| async move {
        let state = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s)
            .map_err(|e| StageError::Aborted {
                package: spec.name.clone(),
                error: format!("lost dependency '{dep}': {e}"),
            })?;
        if state == StageState::Failed {
            return Err(StageError::DependencyUnavailable {
                package: spec.name.clone(),
                dependency: dep,
            });
        }
        Ok(())
    });
    // Wait for all of them even when one has already failed
    join_all(waits).await.into_iter().collect()
}

/// Skip or build one image on the blocking pool
async fn run_builder(
    builder: Arc<dyn ArtifactBuilder>,
    stage: String,
    tag: String,
    text: String,
    force: bool,
) -> Result<BuildOutcome, StageError> {
    let package = stage.clone();
    tokio::task::spawn_blocking(move || -> Result<BuildOutcome, StageError> {
        if !force && builder.exists(&tag)? {
            return Ok(BuildOutcome::Cached);
        }
        builder.build(&stage, &tag, &text)?;
        Ok(BuildOutcome::Built)
    })
    .await
    .map_err(|e| StageError::Aborted {
        package,
        error: e.to_string(),
    })?
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
