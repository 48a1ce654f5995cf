//! Build executor: drives one repository checkout from source tree to binaries
//!
//! A run transforms the tree, picks a strategy through the detection
//! cascade, resolves the build order and then builds each project once all
//! of its predecessors are terminal. With `jobs = 1` this is a strict
//! sequential pass over the resolved order; with more jobs, independent
//! projects share a bounded worker pool.

mod project;
mod result;

pub use result::{BuildResult, BuildStatus, FatalError, RunSummary, TransformSummary};

use crate::artifacts::ArtifactStore;
use crate::config::{BuildConfig, FailurePolicy};
use crate::detection::{
    default_detectors, detect_strategy, load_projects, Detector, RepoScan, Strategy,
};
use crate::graph::{BuildGraph, CycleError};
use crate::manifest::{ManifestContext, ParseError, ProjectDescriptor};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::toolchain::cmake::mingw_toolchain_file;
use crate::toolchain::{CommandRunner, ProcessRunner};
use crate::transform::Pipeline;
use crate::util::paths;
use project::{build_project, ProjectJob, RunShared};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Directory under the output root for generated files and scratch space
pub const WORK_DIR_NAME: &str = ".wincross";

/// Run-level failures; per-project failures live in [`BuildResult`]
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No build system detected under {}", .root.display())]
    NoBuildSystemDetected { root: PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable kind name used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::NoBuildSystemDetected { .. } => "no_build_system_detected",
            BuildError::Parse(_) => "parse_error",
            BuildError::Cycle(_) => "cycle_error",
            BuildError::Cancelled => "cancelled",
            BuildError::Io { .. } => "io_error",
        }
    }
}

/// What the cascade would build, without building anything
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub root: PathBuf,
    pub strategy: Strategy,
    pub manifests: Vec<PathBuf>,
    /// Projects in resolved build order
    pub build_order: Vec<ProjectDescriptor>,
    /// Manifests that failed to parse and were skipped
    pub skipped: Vec<String>,
    /// `project -> reference` pairs that named no known project
    pub dangling: Vec<String>,
}

pub struct BuildExecutor {
    config: BuildConfig,
    runner: Arc<dyn CommandRunner>,
    progress: Arc<dyn ProgressHandler>,
    cancel: CancellationToken,
    detectors: Vec<Box<dyn Detector>>,
}

impl BuildExecutor {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            runner: Arc::new(ProcessRunner),
            progress: Arc::new(NoOpHandler),
            cancel: CancellationToken::new(),
            detectors: default_detectors(),
        }
    }

    /// Replaces the process runner (tests use a fake toolchain)
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run: no new project starts and in-flight steps are killed
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(&event);
    }

    fn canonical_root(repo: &Path) -> Result<PathBuf, BuildError> {
        fs::canonicalize(repo).map_err(|e| BuildError::io(repo, e))
    }

    /// Absolute output root, so it can be excluded from every tree walk
    fn output_root(&self, root: &Path) -> PathBuf {
        let output = self.config.output_root(root);
        if output.is_absolute() {
            return output;
        }
        match std::env::current_dir() {
            Ok(cwd) => paths::normalize(&cwd.join(output)),
            Err(_) => output,
        }
    }

    /// Runs detection and order resolution without touching the tree
    pub fn detect(&self, repo: &Path) -> Result<DetectionReport, BuildError> {
        let root = Self::canonical_root(repo)?;
        let output_root = self.output_root(&root);
        let scan = RepoScan::new(&root, &[output_root]);

        let detected = detect_strategy(&scan, &self.detectors)
            .ok_or_else(|| BuildError::NoBuildSystemDetected { root: root.clone() })?;
        let ctx = ManifestContext::new(&root, &self.config);
        let loaded = load_projects(&scan, &detected, &ctx)?;

        let graph = BuildGraph::new(loaded.projects);
        let build_order = graph.build_order()?.into_iter().cloned().collect();

        Ok(DetectionReport {
            root,
            strategy: detected.strategy,
            manifests: detected.manifests,
            build_order,
            skipped: loaded.skipped.iter().map(ToString::to_string).collect(),
            dangling: graph
                .dangling()
                .iter()
                .map(|d| format!("{} -> {}", d.project, d.reference))
                .collect(),
        })
    }

    /// Full run; fatal conditions are recorded in the summary's `fatal` field
    pub async fn run(&self, repo: &Path) -> RunSummary {
        let start = Instant::now();
        let root = fs::canonicalize(repo).unwrap_or_else(|_| repo.to_path_buf());
        let mut summary = RunSummary::new(&root, &self.output_root(&root), &self.config);

        if let Err(err) = self.execute(repo, &mut summary).await {
            error!(error = %err, "Run failed");
            self.emit(ProgressEvent::RunFailed {
                error: err.to_string(),
            });
            summary.fatal = Some(FatalError {
                kind: err.kind(),
                message: err.to_string(),
            });
        }
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        summary
    }

    /// Full run, filling `summary` as it goes
    ///
    /// Whatever was recorded before a fatal error (strategy, finished
    /// projects) stays in `summary`.
    pub async fn execute(&self, repo: &Path, summary: &mut RunSummary) -> Result<(), BuildError> {
        let start = Instant::now();
        let root = Self::canonical_root(repo)?;
        let output_root = self.output_root(&root);
        summary.repo = root.clone();
        summary.output_dir = output_root.clone();

        info!(repo = %root.display(), output = %output_root.display(), "Starting build run");
        self.emit(ProgressEvent::RunStarted {
            repo_path: root.display().to_string(),
        });
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let work_dir = output_root.join(WORK_DIR_NAME);
        fs::create_dir_all(&work_dir).map_err(|e| BuildError::io(&work_dir, e))?;
        let toolchain_file = work_dir.join(format!("mingw-{}.cmake", self.config.arch));
        fs::write(&toolchain_file, mingw_toolchain_file(self.config.arch))
            .map_err(|e| BuildError::io(&toolchain_file, e))?;

        let pipeline = Pipeline::new().exclude(output_root.clone());
        let report = pipeline.run(&root);
        summary.transform = TransformSummary {
            files_changed: report.files_changed(),
            errors: report.errors.iter().map(ToString::to_string).collect(),
            warnings: report.warnings.clone(),
        };
        self.emit(ProgressEvent::PipelineComplete {
            files_changed: report.files_changed(),
            errors: report.errors.len(),
            elapsed: report.elapsed,
        });

        let scan = RepoScan::new(&root, &[output_root.clone()]);
        let detected = detect_strategy(&scan, &self.detectors)
            .ok_or_else(|| BuildError::NoBuildSystemDetected { root: root.clone() })?;
        summary.strategy = Some(detected.strategy);
        summary.manifests = detected.manifests.clone();
        self.emit(ProgressEvent::StrategySelected {
            strategy: detected.strategy,
            manifests: detected.manifests.len(),
        });

        let ctx = ManifestContext::new(&root, &self.config);
        let loaded = load_projects(&scan, &detected, &ctx)?;
        summary.skipped_manifests = loaded.skipped.iter().map(ToString::to_string).collect();
        let graph = BuildGraph::new(loaded.projects);
        let order: Vec<ProjectDescriptor> = graph.resolve()?;
        summary.build_order = order.iter().map(|p| p.id.clone()).collect();
        info!(projects = order.len(), order = ?summary.build_order, "Resolved build order");

        let shared = Arc::new(RunShared {
            config: self.config.clone(),
            root: root.clone(),
            output_root: output_root.clone(),
            toolchain_file,
            store: ArtifactStore::new(),
            pipeline,
            runner: self.runner.clone(),
            cancel: self.cancel.clone(),
        });
        self.schedule(&shared, &graph, &order, summary).await;
        summary.artifacts = shared.store.snapshot();

        let succeeded = summary.count(BuildStatus::Success);
        let failed = summary.count(BuildStatus::Failed);
        let skipped = summary.count(BuildStatus::Skipped);
        info!(succeeded, failed, skipped, "Build run complete");
        self.emit(ProgressEvent::RunCompleted {
            succeeded,
            failed,
            skipped,
            total_time: start.elapsed(),
        });
        Ok(())
    }

    /// Starts each project once its predecessors are terminal, up to `jobs` at a time
    async fn schedule(
        &self,
        shared: &Arc<RunShared>,
        graph: &BuildGraph,
        order: &[ProjectDescriptor],
        summary: &mut RunSummary,
    ) {
        let total = order.len();
        let jobs = self.config.jobs.max(1);
        let dirs = output_dir_names(order);

        let mut status: HashMap<String, BuildStatus> = HashMap::new();
        let mut results: HashMap<String, BuildResult> = HashMap::new();
        let mut started: HashSet<String> = HashSet::new();
        let mut running: JoinSet<(String, BuildResult)> = JoinSet::new();
        let mut halted: Option<&'static str> = None;
        let mut position = 0;

        loop {
            if halted.is_none() && self.cancel.is_cancelled() {
                warn!("Run cancelled, no further projects will start");
                summary.cancelled = true;
                halted = Some("run cancelled");
            }

            for project in order {
                if halted.is_some() || running.len() >= jobs {
                    break;
                }
                if started.contains(&project.id) {
                    continue;
                }
                let predecessors = graph.predecessors(&project.id);

                let broken = predecessors
                    .iter()
                    .find(|p| matches!(status.get(**p), Some(BuildStatus::Failed | BuildStatus::Skipped)));
                if let Some(broken) = broken {
                    let reason = format!("dependency {} did not build", broken);
                    info!(project = %project.id, dependency = %broken, "Skipping project");
                    started.insert(project.id.clone());
                    let result = BuildResult::skipped(&project.id, &project.name, project.kind, reason);
                    self.finish(&mut status, &mut results, result);
                    continue;
                }
                if !predecessors
                    .iter()
                    .all(|p| status.get(*p) == Some(&BuildStatus::Success))
                {
                    continue;
                }

                started.insert(project.id.clone());
                position += 1;
                self.emit(ProgressEvent::ProjectStarted {
                    project: project.id.clone(),
                    position,
                    total,
                });

                let dir_name = dirs.get(&project.id).cloned().unwrap_or_else(|| project.name.clone());
                let job = ProjectJob {
                    project: project.clone(),
                    output_dir: shared.output_root.join(&dir_name),
                    scratch_dir: shared.output_root.join(WORK_DIR_NAME).join("work").join(&dir_name),
                    predecessors: predecessors.iter().map(|p| p.to_string()).collect(),
                    predecessor_outputs: predecessors
                        .iter()
                        .filter_map(|p| graph.project(p))
                        .flat_map(|p| p.expected_outputs())
                        .map(|name| name.to_lowercase())
                        .collect(),
                };
                let task_shared = Arc::clone(shared);
                running.spawn(async move {
                    let id = job.project.id.clone();
                    let (name, kind) = (job.project.name.clone(), job.project.kind);
                    let outcome = tokio::spawn(async move { build_project(&task_shared, &job).await }).await;
                    let result = outcome.unwrap_or_else(|err| {
                        let mut result = BuildResult::skipped(&id, &name, kind, format!("build task aborted: {}", err));
                        result.status = BuildStatus::Failed;
                        result
                    });
                    (id, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (id, result) = match joined {
                Ok(finished) => finished,
                Err(err) => {
                    error!(error = %err, "Project task failed to join");
                    continue;
                }
            };
            if result.status == BuildStatus::Failed
                && self.config.failure_policy == FailurePolicy::StopOnFirstFailure
                && halted.is_none()
            {
                warn!(project = %id, "Stopping after first failure");
                halted = Some("stopped after an earlier failure");
            }
            self.finish(&mut status, &mut results, result);
        }

        for project in order {
            if results.contains_key(&project.id) {
                continue;
            }
            let reason = halted.unwrap_or("never became ready");
            let result = BuildResult::skipped(&project.id, &project.name, project.kind, reason);
            self.finish(&mut status, &mut results, result);
        }

        summary.results = order.iter().filter_map(|p| results.remove(&p.id)).collect();
    }

    fn finish(
        &self,
        status: &mut HashMap<String, BuildStatus>,
        results: &mut HashMap<String, BuildResult>,
        result: BuildResult,
    ) {
        self.emit(ProgressEvent::ProjectFinished {
            project: result.project.clone(),
            status: result.status,
            elapsed: std::time::Duration::from_millis(result.elapsed_ms),
        });
        status.insert(result.project.clone(), result.status);
        results.insert(result.project.clone(), result);
    }
}

/// One output subdirectory per project, named after it; clashes get a numeric suffix
fn output_dir_names(order: &[ProjectDescriptor]) -> HashMap<String, String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = HashMap::new();
    for project in order {
        let base = crate::toolchain::cmake::target_name(&project.name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !taken.insert(candidate.to_lowercase()) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        names.insert(project.id.clone(), candidate);
    }
    names
}
