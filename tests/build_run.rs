//! End-to-end runs of the build executor against a fake toolchain

mod common;

use common::{solution_repo, write, FakeToolchain};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use wincross::{BuildConfig, BuildExecutor, BuildStatus, FailurePolicy, Strategy};

fn config(out: &TempDir) -> BuildConfig {
    let mut config = BuildConfig::builtin();
    config.output_dir = Some(out.path().to_path_buf());
    config
}

#[tokio::test]
async fn test_solution_builds_library_before_application() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    solution_repo(repo.path());

    let toolchain = Arc::new(
        FakeToolchain::new()
            .produces("LibA", &["LibA.dll", "LibA.dll.a"])
            .produces("AppB", &["AppB.exe"]),
    );
    let summary = BuildExecutor::new(config(&out))
        .with_runner(toolchain.clone())
        .run(repo.path())
        .await;

    assert!(summary.fatal.is_none(), "unexpected fatal error: {:?}", summary.fatal);
    assert_eq!(summary.strategy, Some(Strategy::Solution));
    assert_eq!(summary.build_order, vec!["LibA/LibA.vcxproj", "AppB/AppB.vcxproj"]);
    assert_eq!(summary.results.len(), 2);
    assert!(summary.results.iter().all(|r| r.status == BuildStatus::Success));
    assert_eq!(summary.exit_code(), 0);

    let dll = out.path().join("LibA/LibA.dll");
    let rc = fs::read_to_string(repo.path().join("AppB/app.rc")).unwrap();
    assert!(
        rc.contains(&dll.to_string_lossy().replace('\\', "/")),
        "resource reference was not rewritten: {}",
        rc
    );

    // The import library of LibA is linked into AppB's generated CMakeLists
    let lists = fs::read_to_string(out.path().join(".wincross/work/AppB/cmake/CMakeLists.txt")).unwrap();
    assert!(lists.contains("LibA.dll.a"));

    let names: Vec<&str> = summary.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert!(names.contains(&"LibA.dll"));
    assert!(names.contains(&"LibA.lib"));
    assert!(names.contains(&"AppB.exe"));

    let configured: Vec<String> = toolchain
        .calls()
        .iter()
        .filter(|s| s.label == "configure")
        .map(|s| s.command_line())
        .collect();
    assert_eq!(configured.len(), 2);
    assert!(configured[0].contains("work/LibA"));
    assert!(configured[1].contains("work/AppB"));
}

#[tokio::test]
async fn test_generated_iid_table_is_compiled_into_project() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    solution_repo(repo.path());
    write(
        repo.path(),
        "LibA/iface.h",
        "MIDL_INTERFACE(\"33333333-3333-3333-3333-333333333333\")\nIGreeter : public IUnknown {};\n",
    );

    let toolchain = Arc::new(
        FakeToolchain::new()
            .produces("LibA", &["LibA.dll", "LibA.dll.a"])
            .produces("AppB", &["AppB.exe"]),
    );
    let summary = BuildExecutor::new(config(&out))
        .with_runner(toolchain)
        .run(repo.path())
        .await;
    assert_eq!(summary.exit_code(), 0);

    let table = repo.path().join("LibA/iface_h_iid.c");
    assert!(fs::read_to_string(&table).unwrap().contains("DEFINE_GUID(IID_IGreeter"));

    let lists = fs::read_to_string(out.path().join(".wincross/work/LibA/cmake/CMakeLists.txt")).unwrap();
    assert!(lists.contains("iface_h_iid.c"), "generated table missing from SOURCES: {}", lists);
    let app_lists = fs::read_to_string(out.path().join(".wincross/work/AppB/cmake/CMakeLists.txt")).unwrap();
    assert!(!app_lists.contains("iface_h_iid.c"));
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    solution_repo(repo.path());

    let toolchain = Arc::new(FakeToolchain::new().failing_on("work/LibA"));
    let summary = BuildExecutor::new(config(&out))
        .with_runner(toolchain.clone())
        .run(repo.path())
        .await;

    let lib = summary.result("LibA/LibA.vcxproj").unwrap();
    assert_eq!(lib.status, BuildStatus::Failed);
    assert_eq!(lib.error.as_deref(), Some("step 'configure' exited with code 2"));
    assert!(lib.log.iter().any(|l| l.contains("simulated failure")));

    let app = summary.result("AppB/AppB.vcxproj").unwrap();
    assert_eq!(app.status, BuildStatus::Skipped);
    assert_eq!(app.error.as_deref(), Some("dependency LibA/LibA.vcxproj did not build"));
    assert!(toolchain.calls().iter().all(|s| !s.command_line().contains("work/AppB")));

    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_stop_on_first_failure_skips_remaining_projects() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    for unit in ["alpha", "beta", "gamma"] {
        write(
            repo.path(),
            &format!("{}/CMakeLists.txt", unit),
            &format!("project({})\nadd_executable({} main.c)\n", unit, unit),
        );
        write(repo.path(), &format!("{}/main.c", unit), "int main(void) { return 0; }\n");
    }

    let mut cfg = config(&out);
    cfg.failure_policy = FailurePolicy::StopOnFirstFailure;
    let summary = BuildExecutor::new(cfg)
        .with_runner(Arc::new(FakeToolchain::new().failing_on("work/alpha")))
        .run(repo.path())
        .await;

    assert_eq!(summary.strategy, Some(Strategy::CMake));
    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.results[0].status, BuildStatus::Failed);
    for skipped in &summary.results[1..] {
        assert_eq!(skipped.status, BuildStatus::Skipped);
        assert_eq!(skipped.error.as_deref(), Some("stopped after an earlier failure"));
    }
}

#[tokio::test]
async fn test_continue_on_failure_builds_independent_projects() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    for unit in ["alpha", "beta"] {
        write(repo.path(), &format!("{}/CMakeLists.txt", unit), "project(x)\n");
    }

    let mut cfg = config(&out);
    cfg.jobs = 2;
    let summary = BuildExecutor::new(cfg)
        .with_runner(Arc::new(
            FakeToolchain::new()
                .failing_on("work/alpha")
                .produces("beta", &["beta.exe"]),
        ))
        .run(repo.path())
        .await;

    assert_eq!(summary.result("alpha/CMakeLists.txt").unwrap().status, BuildStatus::Failed);
    assert_eq!(summary.result("beta/CMakeLists.txt").unwrap().status, BuildStatus::Success);
    assert_eq!(summary.results[0].project, "alpha/CMakeLists.txt");
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_raw_sources_build_as_one_unit() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write(repo.path(), "main.c", "#include \"util.h\"\nint main(void) { return helper(); }\n");
    write(repo.path(), "util.c", "int helper(void) { return 0; }\n");
    write(repo.path(), "util.h", "int helper(void);\n");

    let summary = BuildExecutor::new(config(&out))
        .with_runner(Arc::new(FakeToolchain::new()))
        .run(repo.path())
        .await;

    assert_eq!(summary.strategy, Some(Strategy::RawSources));
    assert_eq!(summary.results.len(), 1);
    let unit = &summary.results[0];
    assert_eq!(unit.status, BuildStatus::Success);
    assert_eq!(unit.steps_total, 3);
    assert_eq!(unit.artifacts.len(), 1);
    assert!(unit.artifacts[0].name.ends_with(".exe"));
}

#[tokio::test]
async fn test_no_build_system_is_fatal() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write(repo.path(), "README.md", "# nothing to build\n");

    let summary = BuildExecutor::new(config(&out))
        .with_runner(Arc::new(FakeToolchain::new()))
        .run(repo.path())
        .await;

    let fatal = summary.fatal.as_ref().expect("fatal error recorded");
    assert_eq!(fatal.kind, "no_build_system_detected");
    assert!(summary.results.is_empty());
    assert!(summary.strategy.is_none());
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    solution_repo(repo.path());

    let executor = BuildExecutor::new(config(&out)).with_runner(Arc::new(FakeToolchain::new()));
    executor.cancellation_token().cancel();
    let summary = executor.run(repo.path()).await;

    assert_eq!(summary.fatal.as_ref().map(|f| f.kind), Some("cancelled"));
    assert!(summary.results.is_empty());
    // The tree is untouched when nothing ran
    assert!(fs::read_to_string(repo.path().join("AppB/app.rc")).unwrap().contains("..\\\\LibA"));
}

#[tokio::test]
async fn test_detect_reports_order_without_building() {
    let repo = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    solution_repo(repo.path());

    let report = BuildExecutor::new(config(&out)).detect(repo.path()).unwrap();
    assert_eq!(report.strategy, Strategy::Solution);
    let ids: Vec<&str> = report.build_order.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["LibA/LibA.vcxproj", "AppB/AppB.vcxproj"]);
    assert!(report.build_order[0].produces_library);
    assert!(!out.path().join(".wincross").exists());
}
