//! External process execution with bounded output capture

use super::Step;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Last N lines of a tool's combined stdout/stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    limit: usize,
    lines: VecDeque<String>,
    dropped: usize,
}

impl LogTail {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            lines: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line.into());
    }

    /// Appends another tail, keeping the combined result bounded
    pub fn extend(&mut self, other: &LogTail) {
        self.dropped += other.dropped;
        for line in &other.lines {
            self.push(line.clone());
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines that fell off the front
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if self.dropped > 0 {
            text.push_str(&format!("[... {} earlier lines omitted ...]\n", self.dropped));
        }
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut {
        program: String,
        secs: u64,
        tail: LogTail,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String, tail: LogTail },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolchainError {
    /// Output captured before the step was stopped, if any
    pub fn tail(&self) -> Option<&LogTail> {
        match self {
            ToolchainError::TimedOut { tail, .. } | ToolchainError::Cancelled { tail, .. } => Some(tail),
            _ => None,
        }
    }
}

/// What a finished step reported
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub tail: LogTail,
    pub elapsed: Duration,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one toolchain step; swapped for a fake in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        step: &Step,
        timeout: Duration,
        tail_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<StepOutput, ToolchainError>;
}

/// Real processes via `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        step: &Step,
        timeout: Duration,
        tail_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<StepOutput, ToolchainError> {
        let start = Instant::now();
        let mut cmd = Command::new(&step.program);
        cmd.args(&step.args)
            .envs(step.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &step.cwd {
            cmd.current_dir(dir);
        }

        debug!(step = %step.label, command = %step.command_line(), "Spawning toolchain step");
        let mut child = cmd.spawn().map_err(|source| ToolchainError::Spawn {
            program: step.program.clone(),
            source,
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let mut tail = LogTail::new(tail_lines);
        let deadline_at = tokio::time::Instant::now() + timeout;
        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let status = loop {
            tokio::select! {
                Some(line) = rx.recv() => tail.push(line),
                status = child.wait() => {
                    break status.map_err(|source| ToolchainError::Wait {
                        program: step.program.clone(),
                        source,
                    })?;
                }
                _ = &mut deadline => {
                    warn!(step = %step.label, secs = timeout.as_secs(), "Step timed out, killing process");
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "Failed to kill timed-out process");
                    }
                    return Err(ToolchainError::TimedOut {
                        program: step.program.clone(),
                        secs: timeout.as_secs(),
                        tail,
                    });
                }
                _ = cancel.cancelled() => {
                    warn!(step = %step.label, "Run cancelled, killing process");
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "Failed to kill cancelled process");
                    }
                    return Err(ToolchainError::Cancelled {
                        program: step.program.clone(),
                        tail,
                    });
                }
            }
        };

        // A background grandchild can hold the pipes open past exit
        let drain = async {
            while let Some(line) = rx.recv().await {
                tail.push(line);
            }
        };
        let remaining = deadline_at.saturating_duration_since(tokio::time::Instant::now());
        if tokio::time::timeout(remaining, drain).await.is_err() {
            warn!(
                step = %step.label,
                "Output pipes still open after the process exited; stopped reading at the step deadline"
            );
        }

        Ok(StepOutput {
            exit_code: status.code(),
            tail,
            elapsed: start.elapsed(),
        })
    }
}
