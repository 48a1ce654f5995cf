//! CLI integration tests
//!
//! These run the compiled binary and check exit codes, output formats and
//! the files a run leaves behind. None of them invoke a real toolchain.

mod common;

use common::{solution_repo, write};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn wincross(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wincross"))
        .args(args)
        .env_remove("RUST_LOG")
        .env("WINCROSS_LOG_LEVEL", "error")
        .output()
        .expect("Failed to execute wincross")
}

fn path(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

#[test]
fn test_cli_help() {
    let output = wincross(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wincross"));
    assert!(stdout.contains("build"));
    assert!(stdout.contains("detect"));
    assert!(stdout.contains("transform"));
}

#[test]
fn test_cli_version() {
    let output = wincross(&["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_detect_json_output() {
    let repo = TempDir::new().unwrap();
    solution_repo(repo.path());

    let output = wincross(&["detect", &path(repo.path()), "--format", "json"]);
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["strategy"], "solution");
    assert_eq!(json["build_order"][0]["id"], "LibA/LibA.vcxproj");
    assert_eq!(json["build_order"][1]["id"], "AppB/AppB.vcxproj");
}

#[test]
fn test_detect_human_output() {
    let repo = TempDir::new().unwrap();
    write(repo.path(), "CMakeLists.txt", "project(demo)\n");
    write(repo.path(), "src/CMakeLists.txt", "add_executable(demo main.c)\n");

    let output = wincross(&["detect", &path(repo.path())]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Strategy:    cmake"));
    assert!(stdout.contains("1. CMakeLists.txt (cmake)"));
}

#[test]
fn test_detect_nothing_to_build() {
    let repo = TempDir::new().unwrap();
    write(repo.path(), "README.md", "docs only\n");

    let output = wincross(&["detect", &path(repo.path())]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No build system detected"));
}

#[test]
fn test_invalid_arch_exits_with_2_and_touches_nothing() {
    let repo = TempDir::new().unwrap();
    write(repo.path(), "Main.C", "int main(void) { return 0; }\n");

    let output = wincross(&["build", &path(repo.path()), "--arch", "arm64"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("arch"));
    assert!(repo.path().join("Main.C").exists());
    assert!(!repo.path().join("wincross-out").exists());
}

#[test]
fn test_missing_repository_exits_with_2() {
    let output = wincross(&["build", "/definitely/not/a/repo"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_failed_run_writes_summary_and_diagnostics() {
    let repo = TempDir::new().unwrap();
    write(repo.path(), "README.md", "docs only\n");

    let output = wincross(&["build", &path(repo.path()), "--format", "json"]);
    assert_eq!(output.status.code(), Some(1));

    let out = repo.path().join("wincross-out");
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("build-summary.json")).unwrap()).unwrap();
    assert_eq!(summary["fatal"]["kind"], "no_build_system_detected");
    assert!(out.join("logs/diagnostics.txt").exists());
    assert!(out.join("logs/build.log").exists());

    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(stdout["run_id"], summary["run_id"]);
}

#[test]
fn test_transform_command_is_idempotent() {
    let repo = TempDir::new().unwrap();
    write(repo.path(), "Main.C", "int main(void) { return 0; }\n");

    let first = wincross(&["transform", &path(repo.path()), "--format", "json"]);
    assert_eq!(first.status.code(), Some(0));
    assert!(repo.path().join("main.c").exists());

    let second = wincross(&["transform", &path(repo.path())]);
    assert_eq!(second.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&second.stdout).contains("No changes"));
}
