//! Progress handler trait and events

use crate::detection::Strategy;
use crate::executor::BuildStatus;
use std::time::Duration;

/// Events emitted while a repository is being built
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    RunStarted { repo_path: String },

    /// Transformation pipeline finished over the whole tree
    PipelineComplete {
        files_changed: usize,
        errors: usize,
        elapsed: Duration,
    },

    /// Detection cascade picked a strategy
    StrategySelected {
        strategy: Strategy,
        manifests: usize,
    },

    /// A project's first toolchain step is about to run
    ProjectStarted {
        project: String,
        position: usize,
        total: usize,
    },

    /// A project reached a terminal state
    ProjectFinished {
        project: String,
        status: BuildStatus,
        elapsed: Duration,
    },

    /// Run completed (possibly with failed projects)
    RunCompleted {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        total_time: Duration,
    },

    /// Run aborted with a fatal error
    RunFailed { error: String },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        NoOpHandler.on_progress(&ProgressEvent::RunStarted {
            repo_path: "/test".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::RunStarted {
            repo_path: "/test".to_string(),
        });
        handler.on_progress(&ProgressEvent::StrategySelected {
            strategy: Strategy::Solution,
            manifests: 1,
        });
        handler.on_progress(&ProgressEvent::ProjectFinished {
            project: "LibA".to_string(),
            status: BuildStatus::Success,
            elapsed: Duration::from_secs(3),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
