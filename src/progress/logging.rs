//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::executor::BuildStatus;
use tracing::{debug, error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { repo_path } => {
                info!(repo = %repo_path, "Starting build run");
            }
            ProgressEvent::PipelineComplete {
                files_changed,
                errors,
                elapsed,
            } => {
                if *errors > 0 {
                    warn!(
                        files_changed,
                        errors,
                        elapsed_ms = elapsed.as_millis(),
                        "Source transformation finished with skipped files"
                    );
                } else {
                    info!(
                        files_changed,
                        elapsed_ms = elapsed.as_millis(),
                        "Source transformation finished"
                    );
                }
            }
            ProgressEvent::StrategySelected {
                strategy,
                manifests,
            } => {
                info!(strategy = %strategy, manifests, "Build strategy selected");
            }
            ProgressEvent::ProjectStarted {
                project,
                position,
                total,
            } => {
                info!(project = %project, "[{}/{}] Building", position, total);
            }
            ProgressEvent::ProjectFinished {
                project,
                status,
                elapsed,
            } => match status {
                BuildStatus::Success => {
                    info!(project = %project, elapsed_ms = elapsed.as_millis(), "Build succeeded");
                }
                BuildStatus::Failed => {
                    warn!(project = %project, elapsed_ms = elapsed.as_millis(), "Build failed");
                }
                BuildStatus::Skipped => {
                    debug!(project = %project, "Build skipped");
                }
            },
            ProgressEvent::RunCompleted {
                succeeded,
                failed,
                skipped,
                total_time,
            } => {
                info!(
                    succeeded,
                    failed,
                    skipped,
                    total_time_ms = total_time.as_millis(),
                    "Run complete"
                );
            }
            ProgressEvent::RunFailed { error: message } => {
                error!(error = %message, "Run failed");
            }
        }
    }
}
