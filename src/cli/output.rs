//! Output formatting for command results
//!
//! JSON output is the serde form of the underlying report. Human output is
//! a short boxed summary meant for a terminal.

use anyhow::{Context, Result};
use std::fmt::Write as _;

use crate::executor::{BuildStatus, DetectionReport, RunSummary};
use crate::transform::TransformReport;
use crate::util::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_detection(&self, report: &DetectionReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize detection report to JSON")
            }
            OutputFormat::Human => Ok(self.detection_human(report)),
        }
    }

    pub fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(summary).context("Failed to serialize run summary to JSON")
            }
            OutputFormat::Human => Ok(self.summary_human(summary)),
        }
    }

    pub fn format_transform(&self, report: &TransformReport, root: &std::path::Path) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize transformation report to JSON")
            }
            OutputFormat::Human => Ok(self.transform_human(report, root)),
        }
    }

    fn detection_human(&self, report: &DetectionReport) -> String {
        let mut output = String::new();
        output.push_str("\u{2713} Build Strategy\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        let _ = writeln!(output, "Repository:  {}", report.root.display());
        let _ = writeln!(output, "Strategy:    {}", report.strategy);
        if !report.manifests.is_empty() {
            let manifests: Vec<String> = report
                .manifests
                .iter()
                .map(|m| paths::display_relative(&report.root, m))
                .collect();
            let _ = writeln!(output, "Manifests:   {}", manifests.join(", "));
        }
        output.push('\n');

        output.push_str("Build Order:\n");
        for (i, project) in report.build_order.iter().enumerate() {
            let connector = if i + 1 == report.build_order.len() {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            let library = if project.produces_library { " [library]" } else { "" };
            let _ = write!(
                output,
                "{}\u{2500} {}. {} ({}){}",
                connector,
                i + 1,
                project.id,
                project.kind,
                library
            );
            if !project.explicit_deps.is_empty() {
                let deps: Vec<&str> = project.explicit_deps.iter().map(String::as_str).collect();
                let _ = write!(output, " <- {}", deps.join(", "));
            }
            output.push('\n');
        }

        if !report.skipped.is_empty() || !report.dangling.is_empty() {
            output.push_str("\n\u{26A0} Warnings:\n");
            for skipped in &report.skipped {
                let _ = writeln!(output, "  - skipped: {}", skipped);
            }
            for dangling in &report.dangling {
                let _ = writeln!(output, "  - unknown reference: {}", dangling);
            }
        }
        output
    }

    fn summary_human(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        if summary.is_success() {
            output.push_str("\u{2713} Build Succeeded\n");
        } else {
            output.push_str("\u{2717} Build Failed\n");
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        let strategy = summary
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let _ = writeln!(output, "Strategy:       {}", strategy);
        let _ = writeln!(output, "Target:         {} {}", summary.configuration, summary.arch);
        let _ = writeln!(output, "Files adapted:  {}", summary.transform.files_changed);
        let _ = writeln!(output, "Output:         {}", summary.output_dir.display());
        output.push('\n');

        if !summary.results.is_empty() {
            output.push_str("Projects:\n");
            for result in &summary.results {
                let symbol = match result.status {
                    BuildStatus::Success => "\u{2713}",
                    BuildStatus::Failed => "\u{2717}",
                    BuildStatus::Skipped => "-",
                };
                let _ = write!(output, "  {} {} ({} ms)", symbol, result.project, result.elapsed_ms);
                if let Some(error) = &result.error {
                    let _ = write!(output, ": {}", error);
                }
                output.push('\n');
                for artifact in &result.artifacts {
                    let _ = writeln!(output, "      {}", artifact.path.display());
                }
            }
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "{} succeeded, {} failed, {} skipped in {} ms",
            summary.count(BuildStatus::Success),
            summary.count(BuildStatus::Failed),
            summary.count(BuildStatus::Skipped),
            summary.elapsed_ms
        );
        if summary.cancelled {
            output.push_str("Run was cancelled\n");
        }
        if let Some(fatal) = &summary.fatal {
            let _ = writeln!(output, "Fatal: {}", fatal.message);
        }
        output
    }

    fn transform_human(&self, report: &TransformReport, root: &std::path::Path) -> String {
        let mut output = String::new();
        output.push_str("Source Transformation\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        if report.is_noop() {
            output.push_str("No changes (tree already adapted)\n");
        }
        for (rule, files) in &report.changes {
            let _ = writeln!(output, "{} ({} files):", rule, files.len());
            for file in files {
                let _ = writeln!(output, "  {}", paths::display_relative(root, file));
            }
        }
        if !report.warnings.is_empty() {
            output.push_str("\n\u{26A0} Warnings:\n");
            for warning in &report.warnings {
                let _ = writeln!(output, "  - {}", warning);
            }
        }
        if !report.errors.is_empty() {
            output.push_str("\nSkipped files:\n");
            for error in &report.errors {
                let _ = writeln!(output, "  - {}", error);
            }
        }
        let _ = writeln!(output, "\n{} files changed in {} ms", report.files_changed(), report.elapsed.as_millis());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::detection::Strategy;
    use crate::executor::BuildResult;
    use crate::manifest::{ProjectDescriptor, ProjectKind};
    use std::path::{Path, PathBuf};

    fn report() -> DetectionReport {
        let root = Path::new("/repo");
        let mut lib = ProjectDescriptor::directory_unit(root, &root.join("LibA"), None, ProjectKind::CppVcxproj, 0);
        lib.id = "LibA/LibA.vcxproj".to_string();
        lib.produces_library = true;
        let mut app = ProjectDescriptor::directory_unit(root, &root.join("AppB"), None, ProjectKind::CppVcxproj, 1);
        app.id = "AppB/AppB.vcxproj".to_string();
        app.explicit_deps.insert(lib.id.clone());

        DetectionReport {
            root: root.to_path_buf(),
            strategy: Strategy::Solution,
            manifests: vec![PathBuf::from("/repo/All.sln")],
            build_order: vec![lib, app],
            skipped: Vec::new(),
            dangling: vec!["AppB/AppB.vcxproj -> Missing/Missing.vcxproj".to_string()],
        }
    }

    #[test]
    fn test_detection_human() {
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_detection(&report())
            .unwrap();
        assert!(text.contains("Strategy:    solution"));
        assert!(text.contains("Manifests:   All.sln"));
        assert!(text.contains("1. LibA/LibA.vcxproj (cpp-vcxproj) [library]"));
        assert!(text.contains("2. AppB/AppB.vcxproj (cpp-vcxproj) <- LibA/LibA.vcxproj"));
        assert!(text.contains("unknown reference: AppB/AppB.vcxproj -> Missing/Missing.vcxproj"));
    }

    #[test]
    fn test_detection_json() {
        let text = OutputFormatter::new(OutputFormat::Json)
            .format_detection(&report())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["strategy"], "solution");
        assert_eq!(json["build_order"][0]["id"], "LibA/LibA.vcxproj");
    }

    #[test]
    fn test_summary_human_failure() {
        let mut summary = RunSummary::new(Path::new("/repo"), Path::new("/repo/wincross-out"), &BuildConfig::builtin());
        summary.strategy = Some(Strategy::CMake);
        let mut failed = BuildResult::skipped("src", "src", ProjectKind::CMakeProject, "step 'build' exited with code 2");
        failed.status = BuildStatus::Failed;
        summary.results.push(failed);

        let text = OutputFormatter::new(OutputFormat::Human)
            .format_summary(&summary)
            .unwrap();
        assert!(text.starts_with("\u{2717} Build Failed"));
        assert!(text.contains("Strategy:       cmake"));
        assert!(text.contains("\u{2717} src (0 ms): step 'build' exited with code 2"));
        assert!(text.contains("0 succeeded, 1 failed, 0 skipped"));
    }

    #[test]
    fn test_transform_noop() {
        let report = TransformReport::default();
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_transform(&report, Path::new("/repo"))
            .unwrap();
        assert!(text.contains("No changes (tree already adapted)"));
    }
}
