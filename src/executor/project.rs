//! Building a single project: pipeline, patcher, toolchain, artifacts

use super::result::{BuildResult, BuildStatus};
use crate::artifacts::{ArtifactStore, ResourcePatcher};
use crate::config::BuildConfig;
use crate::manifest::ProjectDescriptor;
use crate::toolchain::{collect_outputs, plan_for, CommandRunner, LogTail, PlanContext};
use crate::transform::Pipeline;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run-wide state every project build reads
pub(crate) struct RunShared {
    pub config: BuildConfig,
    pub root: PathBuf,
    pub output_root: PathBuf,
    pub toolchain_file: PathBuf,
    pub store: ArtifactStore,
    pub pipeline: Pipeline,
    pub runner: Arc<dyn CommandRunner>,
    pub cancel: CancellationToken,
}

/// One project plus what its predecessors were supposed to produce
pub(crate) struct ProjectJob {
    pub project: ProjectDescriptor,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub predecessors: Vec<String>,
    pub predecessor_outputs: HashSet<String>,
}

fn failed(job: &ProjectJob, start: Instant, error: String, log: LogTail, warnings: Vec<String>) -> BuildResult {
    BuildResult {
        project: job.project.id.clone(),
        name: job.project.name.clone(),
        kind: job.project.kind,
        status: BuildStatus::Failed,
        artifacts: Vec::new(),
        log: log.lines().map(str::to_string).collect(),
        log_dropped: log.dropped(),
        step_index: 0,
        steps_total: 0,
        elapsed_ms: start.elapsed().as_millis() as u64,
        error: Some(error),
        warnings,
    }
}

/// Import libraries already produced by the given predecessors
fn linked_artifacts(store: &ArtifactStore, predecessors: &[String]) -> Vec<PathBuf> {
    let mut linked: Vec<PathBuf> = Vec::new();
    for artifact in store.snapshot() {
        if !predecessors.contains(&artifact.owner) {
            continue;
        }
        let name = artifact.name.to_lowercase();
        if (name.ends_with(".a") || name.ends_with(".lib")) && !linked.contains(&artifact.path) {
            linked.push(artifact.path);
        }
    }
    linked
}

fn relative_to(root: &Path, path: &Path) -> String {
    crate::util::paths::display_relative(root, path)
}

/// Builds `job.project`; toolchain failures end up in the result, never as errors
pub(crate) async fn build_project(shared: &RunShared, job: &ProjectJob) -> BuildResult {
    let start = Instant::now();
    let project = &job.project;
    let mut warnings = Vec::new();

    let transform = shared.pipeline.run_within(&shared.root, &project.path);
    if !transform.is_noop() {
        debug!(
            project = %project.id,
            files_changed = transform.files_changed(),
            "Pipeline changed files on the per-project pass"
        );
    }

    let patch = ResourcePatcher::new(&shared.store)
        .exclude(shared.output_root.clone())
        .patch_project(&project.path, &job.predecessor_outputs);
    for reference in &patch.unresolved {
        debug!(project = %project.id, reference = %reference, "Reference not yet resolvable, will retry");
    }
    for reference in &patch.missing_dependencies {
        warn!(
            project = %project.id,
            reference = %reference,
            "Reference to a dependency's output did not resolve; build order or dependency build is broken"
        );
        warnings.push(format!("unresolved dependency output: {}", reference));
    }

    let ctx = PlanContext {
        config: &shared.config,
        output_dir: job.output_dir.clone(),
        scratch_dir: job.scratch_dir.clone(),
        toolchain_file: shared.toolchain_file.clone(),
        linked_artifacts: linked_artifacts(&shared.store, &job.predecessors),
        excluded: vec![shared.output_root.clone()],
    };
    let plan = match plan_for(project, &ctx) {
        Ok(plan) => plan,
        Err(err) => {
            warn!(project = %project.id, error = %err, "Failed to plan build");
            let log = LogTail::new(shared.config.log_tail_lines);
            return failed(job, start, format!("failed to plan build: {}", err), log, warnings);
        }
    };

    let started_at = SystemTime::now();
    let mut log = LogTail::new(shared.config.log_tail_lines);
    let total = plan.steps.len();

    for (index, step) in plan.steps.iter().enumerate() {
        log.push(format!("$ {}", step.command_line()));
        info!(project = %project.id, step = %step.label, "Running step {}/{}", index + 1, total);

        let outcome = shared
            .runner
            .run(
                step,
                shared.config.step_timeout(),
                shared.config.log_tail_lines,
                &shared.cancel,
            )
            .await;

        let error = match outcome {
            Ok(output) => {
                log.extend(&output.tail);
                if output.success() {
                    continue;
                }
                match output.exit_code {
                    Some(code) => format!("step '{}' exited with code {}", step.label, code),
                    None => format!("step '{}' was terminated by a signal", step.label),
                }
            }
            Err(err) => {
                if let Some(tail) = err.tail() {
                    log.extend(tail);
                }
                err.to_string()
            }
        };

        warn!(project = %project.id, step = %step.label, error = %error, "Project build failed");
        let mut result = failed(job, start, error, log, warnings);
        result.step_index = index;
        result.steps_total = total;
        return result;
    }

    let outputs = match collect_outputs(&plan, started_at) {
        Ok(outputs) => outputs,
        Err(err) => {
            let error = format!("failed to collect outputs: {}", err);
            let mut result = failed(job, start, error, log, warnings);
            result.step_index = total;
            result.steps_total = total;
            return result;
        }
    };
    if outputs.is_empty() {
        warn!(project = %project.id, "Build succeeded but produced no binaries");
        warnings.push("no binaries found in the output directory".to_string());
    }
    let artifacts = shared.store.register_outputs(&project.id, &outputs);

    info!(
        project = %project.id,
        artifacts = artifacts.len(),
        output = %relative_to(&shared.output_root, &job.output_dir),
        elapsed_ms = start.elapsed().as_millis(),
        "Project built"
    );

    BuildResult {
        project: project.id.clone(),
        name: project.name.clone(),
        kind: project.kind,
        status: BuildStatus::Success,
        artifacts,
        log: log.lines().map(str::to_string).collect(),
        log_dropped: log.dropped(),
        step_index: total,
        steps_total: total,
        elapsed_ms: start.elapsed().as_millis() as u64,
        error: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_linked_artifacts_only_from_predecessors() {
        let store = ArtifactStore::new();
        store.register_outputs(
            "LibA",
            &[
                PathBuf::from("/out/LibA/LibA.dll"),
                PathBuf::from("/out/LibA/LibA.dll.a"),
            ],
        );
        store.put("Other.lib", Path::new("/out/Other/Other.lib"), "Other");

        let linked = linked_artifacts(&store, &["LibA".to_string()]);
        assert_eq!(linked, vec![PathBuf::from("/out/LibA/LibA.dll.a")]);
    }
}
