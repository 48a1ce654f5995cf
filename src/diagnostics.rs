//! Run artifacts written next to the binaries
//!
//! `build-summary.json` is written for every run. When the run ends with a
//! non-zero status, `logs/diagnostics.txt` (configuration, status table,
//! tool versions, environment) and `logs/build.log` (failed projects' log
//! tails) are written as well.

use crate::config::Architecture;
use crate::executor::{BuildStatus, RunSummary};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const SUMMARY_FILE: &str = "build-summary.json";
pub const LOGS_DIR: &str = "logs";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.txt";
pub const BUILD_LOG_FILE: &str = "build.log";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const ENVIRONMENT_KEYS: &[&str] = &["PATH", "WINEPREFIX", "DOTNET_ROOT"];

/// `--version` output of one external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub tool: String,
    /// First line of output, or `None` when the tool is missing or hung
    pub version: Option<String>,
}

/// Tools whose versions matter when reading a failed run
pub fn probed_tools(arch: Architecture) -> Vec<String> {
    let triple = arch.mingw_triple();
    vec![
        format!("{}-gcc", triple),
        format!("{}-g++", triple),
        format!("{}-windres", triple),
        "cmake".to_string(),
        "make".to_string(),
        "dotnet".to_string(),
        "msbuild".to_string(),
        "wine".to_string(),
    ]
}

async fn probe(tool: &str) -> Option<String> {
    let output = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) => {
            let text = if output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).to_string()
            } else {
                String::from_utf8_lossy(&output.stdout).to_string()
            };
            text.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)
        }
        Ok(Err(err)) => {
            debug!(tool, error = %err, "Tool not available");
            None
        }
        Err(_) => {
            debug!(tool, "Version probe timed out");
            None
        }
    }
}

/// Runs `<tool> --version` for every tool, tolerating missing ones
pub async fn probe_tool_versions(tools: &[String]) -> Vec<ToolVersion> {
    let mut versions = Vec::with_capacity(tools.len());
    for tool in tools {
        versions.push(ToolVersion {
            tool: tool.clone(),
            version: probe(tool).await,
        });
    }
    versions
}

pub fn write_summary(summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(&summary.output_dir)
        .with_context(|| format!("Failed to create output directory {}", summary.output_dir.display()))?;
    let path = summary.output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize build summary")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Human-readable diagnostics report
pub fn render_diagnostics(summary: &RunSummary, tools: &[ToolVersion], env: &[(String, Option<String>)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "wincross diagnostics");
    let _ = writeln!(out, "generated: {}", Utc::now().to_rfc3339());
    let _ = writeln!(out, "run id: {}", summary.run_id);
    let _ = writeln!(out, "started: {}", summary.started_at.to_rfc3339());
    let _ = writeln!(out, "repository: {}", summary.repo.display());
    let _ = writeln!(out, "output: {}", summary.output_dir.display());
    out.push('\n');

    out.push_str("[configuration]\n");
    let _ = writeln!(out, "arch: {}", summary.arch);
    let _ = writeln!(out, "configuration: {}", summary.configuration);
    let _ = writeln!(out, "ref: {}", summary.git_ref.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "extra flags: {}", summary.extra_flags.join(" "));
    let strategy = summary
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(out, "strategy: {}", strategy);
    if let Some(fatal) = &summary.fatal {
        let _ = writeln!(out, "fatal: {} ({})", fatal.message, fatal.kind);
    }
    if summary.cancelled {
        out.push_str("cancelled: yes\n");
    }
    out.push('\n');

    out.push_str("[projects]\n");
    if summary.results.is_empty() {
        out.push_str("(none)\n");
    }
    let width = summary.results.iter().map(|r| r.project.len()).max().unwrap_or(0);
    for result in &summary.results {
        let _ = write!(
            out,
            "{:<width$}  {:<7}  step {}/{}  {} ms",
            result.project,
            result.status.to_string(),
            result.step_index,
            result.steps_total,
            result.elapsed_ms,
            width = width
        );
        if let Some(error) = &result.error {
            let _ = write!(out, "  {}", error);
        }
        out.push('\n');
    }
    out.push('\n');

    if !summary.transform.errors.is_empty() || !summary.transform.warnings.is_empty() {
        out.push_str("[transformation]\n");
        for error in &summary.transform.errors {
            let _ = writeln!(out, "error: {}", error);
        }
        for warning in &summary.transform.warnings {
            let _ = writeln!(out, "warning: {}", warning);
        }
        out.push('\n');
    }

    out.push_str("[tools]\n");
    for tool in tools {
        let _ = writeln!(out, "{}: {}", tool.tool, tool.version.as_deref().unwrap_or("not found"));
    }
    out.push('\n');

    out.push_str("[environment]\n");
    for (key, value) in env {
        let _ = writeln!(out, "{}={}", key, value.as_deref().unwrap_or(""));
    }
    out
}

/// Log tails of every failed project, in build order
pub fn render_build_log(summary: &RunSummary) -> String {
    let mut out = String::new();
    for result in summary.results.iter().filter(|r| r.status == BuildStatus::Failed) {
        let _ = writeln!(out, "===== {} ({}) =====", result.project, result.kind);
        if let Some(error) = &result.error {
            let _ = writeln!(out, "error: {}", error);
        }
        out.push_str(&result.log_text());
        out.push('\n');
    }
    if out.is_empty() {
        if let Some(fatal) = &summary.fatal {
            let _ = writeln!(out, "fatal: {}", fatal.message);
        }
    }
    out
}

fn environment_subset() -> Vec<(String, Option<String>)> {
    ENVIRONMENT_KEYS
        .iter()
        .map(|key| (key.to_string(), std::env::var(key).ok()))
        .collect()
}

/// Writes `logs/diagnostics.txt` and `logs/build.log`
pub fn write_bundle(summary: &RunSummary, tools: &[ToolVersion]) -> Result<Vec<PathBuf>> {
    let logs = summary.output_dir.join(LOGS_DIR);
    fs::create_dir_all(&logs).with_context(|| format!("Failed to create {}", logs.display()))?;

    let diagnostics = logs.join(DIAGNOSTICS_FILE);
    fs::write(&diagnostics, render_diagnostics(summary, tools, &environment_subset()))
        .with_context(|| format!("Failed to write {}", diagnostics.display()))?;

    let build_log = logs.join(BUILD_LOG_FILE);
    fs::write(&build_log, render_build_log(summary))
        .with_context(|| format!("Failed to write {}", build_log.display()))?;

    Ok(vec![diagnostics, build_log])
}

/// Writes everything a finished run leaves behind; returns the written paths
pub async fn finalize(summary: &RunSummary, arch: Architecture) -> Result<Vec<PathBuf>> {
    let mut written = vec![write_summary(summary)?];
    if summary.exit_code() != 0 {
        let tools = probe_tool_versions(&probed_tools(arch)).await;
        written.extend(write_bundle(summary, &tools)?);
        warn!(logs = %summary.output_dir.join(LOGS_DIR).display(), "Run failed, diagnostics written");
    } else {
        info!(summary = %written[0].display(), "Build summary written");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::executor::{BuildResult, FatalError};
    use crate::manifest::ProjectKind;
    use std::path::Path;
    use tempfile::TempDir;

    fn failed_summary(out: &Path) -> RunSummary {
        let mut summary = RunSummary::new(Path::new("/repo"), out, &BuildConfig::builtin());
        let mut failed = BuildResult::skipped("LibA/LibA.vcxproj", "LibA", ProjectKind::CppVcxproj, "step 'build' exited with code 2");
        failed.status = BuildStatus::Failed;
        failed.log = vec!["$ cmake --build".to_string(), "error: missing windows.h".to_string()];
        failed.log_dropped = 40;
        summary.results.push(failed);
        summary.results.push(BuildResult::skipped(
            "App/App.vcxproj",
            "App",
            ProjectKind::CppVcxproj,
            "dependency LibA/LibA.vcxproj did not build",
        ));
        summary
    }

    #[test]
    fn test_render_diagnostics_sections() {
        let summary = failed_summary(Path::new("/out"));
        let tools = vec![
            ToolVersion {
                tool: "cmake".to_string(),
                version: Some("cmake version 3.28.1".to_string()),
            },
            ToolVersion {
                tool: "wine".to_string(),
                version: None,
            },
        ];
        let env = vec![("WINEPREFIX".to_string(), None)];
        let text = render_diagnostics(&summary, &tools, &env);

        assert!(text.contains(&format!("run id: {}", summary.run_id)));
        assert!(text.contains("arch: x64"));
        assert!(text.contains("configuration: Release"));
        assert!(text.contains("LibA/LibA.vcxproj  failed"));
        assert!(text.contains("cmake: cmake version 3.28.1"));
        assert!(text.contains("wine: not found"));
        assert!(text.contains("WINEPREFIX="));
    }

    #[test]
    fn test_build_log_only_failed_projects() {
        let summary = failed_summary(Path::new("/out"));
        let log = render_build_log(&summary);
        assert!(log.contains("===== LibA/LibA.vcxproj (cpp-vcxproj) ====="));
        assert!(log.contains("[... 40 earlier lines omitted ...]"));
        assert!(log.contains("error: missing windows.h"));
        assert!(!log.contains("App/App.vcxproj"));
    }

    #[test]
    fn test_build_log_for_fatal_run() {
        let mut summary = RunSummary::new(Path::new("/repo"), Path::new("/out"), &BuildConfig::builtin());
        summary.fatal = Some(FatalError {
            kind: "no_build_system_detected",
            message: "No build system detected under /repo".to_string(),
        });
        assert_eq!(render_build_log(&summary), "fatal: No build system detected under /repo\n");
    }

    #[tokio::test]
    async fn test_finalize_writes_bundle_on_failure() {
        let out = TempDir::new().unwrap();
        let summary = failed_summary(out.path());
        let written = finalize(&summary, Architecture::X64).await.unwrap();

        assert_eq!(written.len(), 3);
        assert!(out.path().join(SUMMARY_FILE).exists());
        assert!(out.path().join("logs/diagnostics.txt").exists());
        assert!(out.path().join("logs/build.log").exists());
    }

    #[tokio::test]
    async fn test_finalize_success_writes_summary_only() {
        let out = TempDir::new().unwrap();
        let summary = RunSummary::new(Path::new("/repo"), out.path(), &BuildConfig::builtin());
        let written = finalize(&summary, Architecture::X64).await.unwrap();

        assert_eq!(written, vec![out.path().join(SUMMARY_FILE)]);
        assert!(!out.path().join(LOGS_DIR).exists());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(json["run_id"], summary.run_id);
    }
}
