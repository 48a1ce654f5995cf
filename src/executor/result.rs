//! Per-project outcomes and the run summary

use crate::artifacts::Artifact;
use crate::config::BuildConfig;
use crate::detection::Strategy;
use crate::manifest::ProjectKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one project build
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    /// Project id
    pub project: String,
    pub name: String,
    pub kind: ProjectKind,
    pub status: BuildStatus,
    pub artifacts: Vec<Artifact>,
    /// Bounded tail of the combined tool output
    pub log: Vec<String>,
    /// Lines dropped from the front of `log`
    pub log_dropped: usize,
    /// Index of the step that failed, or the step count on success
    pub step_index: usize,
    pub steps_total: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl BuildResult {
    pub(crate) fn skipped(id: &str, name: &str, kind: ProjectKind, reason: impl Into<String>) -> Self {
        Self {
            project: id.to_string(),
            name: name.to_string(),
            kind,
            status: BuildStatus::Skipped,
            artifacts: Vec::new(),
            log: Vec::new(),
            log_dropped: 0,
            step_index: 0,
            steps_total: 0,
            elapsed_ms: 0,
            error: Some(reason.into()),
            warnings: Vec::new(),
        }
    }

    /// Log tail as text, with a marker for omitted lines
    pub fn log_text(&self) -> String {
        let mut text = String::new();
        if self.log_dropped > 0 {
            text.push_str(&format!("[... {} earlier lines omitted ...]\n", self.log_dropped));
        }
        for line in &self.log {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// What the transformation pipeline did before any build step
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformSummary {
    pub files_changed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// A condition that ended the run early
#[derive(Debug, Clone, Serialize)]
pub struct FatalError {
    /// Stable machine-readable kind, e.g. `no_build_system_detected`
    pub kind: &'static str,
    pub message: String,
}

/// Everything `build-summary.json` records about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub repo: PathBuf,
    pub output_dir: PathBuf,
    pub arch: String,
    pub configuration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    pub extra_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub manifests: Vec<PathBuf>,
    /// Manifests that failed to parse and were left out
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_manifests: Vec<String>,
    pub build_order: Vec<String>,
    pub transform: TransformSummary,
    pub results: Vec<BuildResult>,
    pub artifacts: Vec<Artifact>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalError>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn new(repo: &Path, output_dir: &Path, config: &BuildConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            repo: repo.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            arch: config.arch.to_string(),
            configuration: config.configuration.to_string(),
            git_ref: config.git_ref.clone(),
            extra_flags: config.extra_flags.clone(),
            strategy: None,
            manifests: Vec::new(),
            skipped_manifests: Vec::new(),
            build_order: Vec::new(),
            transform: TransformSummary::default(),
            results: Vec::new(),
            artifacts: Vec::new(),
            cancelled: false,
            fatal: None,
            elapsed_ms: 0,
        }
    }

    pub fn count(&self, status: BuildStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result(&self, project: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.project == project)
    }

    /// True when nothing was fatal, nothing was cancelled and every project built
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
            && !self.cancelled
            && self.results.iter().all(|r| r.status == BuildStatus::Success)
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
