//! Source transformation over realistic trees

mod common;

use common::write;
use std::fs;
use tempfile::TempDir;
use wincross::Pipeline;

fn utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

#[test]
fn test_pipeline_adapts_tree_and_is_idempotent() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    write(
        root,
        "src/Engine.CPP",
        "#include \"Config.h\"\nvoid run() {\n  __try {\n    step();\n  }\n  __except (EXCEPTION_EXECUTE_HANDLER) {\n    recover();\n  }\n}\n",
    );
    write(root, "src/Config.h", "#pragma once\n#define MAX_STEPS 4\n");
    fs::write(root.join("src/app.rc"), utf16le("#include \"resource.h\"\r\n1 ICON \"app.ico\"\r\n")).unwrap();
    write(root, "src/snapshot.cpp", "#include <Windows.h>\n#include <ProcessSnapshot.h>\nHPSS snap;\n");
    write(
        root,
        "src/desktop.cpp",
        "#include <ShObjIDL.h>\nIVirtualDesktopManager *manager = nullptr;\n",
    );
    write(
        root,
        "include/alpha.h",
        "#pragma once\nMIDL_INTERFACE(\"11111111-2222-3333-4444-555555555555\")\nIAlpha : public IUnknown {};\n",
    );
    write(
        root,
        "rpc/Remote.idl",
        "[ uuid(12345678-1234-1234-1234-123456789abc), version(1.0) ]\ninterface Remote\n{\n    long Ping([in] handle_t h);\n}\n",
    );
    write(root, "rpc/Remote_c.c", "#include \"Remote_h.h\"\n");

    let pipeline = Pipeline::new();
    let first = pipeline.run(root);
    assert!(first.errors.is_empty(), "unexpected errors: {:?}", first.errors);
    assert!(!first.is_noop());

    let engine = fs::read_to_string(root.join("src/engine.cpp")).unwrap();
    assert!(!root.join("src/Engine.CPP").exists());
    assert!(engine.contains("#include \"config.h\""));
    assert!(!engine.contains("__try"));
    assert!(engine.contains("catch (...)"));
    assert!(root.join("src/config.h").exists());

    let rc = fs::read(root.join("src/app.rc")).unwrap();
    assert_eq!(rc, b"#include \"resource.h\"\n1 ICON \"app.ico\"\n".to_vec());

    let snapshot = fs::read_to_string(root.join("src/snapshot.cpp")).unwrap();
    assert!(snapshot.contains("#include \"../compat_stubs/processsnapshot.h\""));
    assert!(root.join("compat_stubs/processsnapshot.h").exists());

    let desktop = fs::read_to_string(root.join("src/desktop.cpp")).unwrap();
    assert!(desktop.contains("IVirtualDesktopManager : public IUnknown"));

    let table = fs::read_to_string(root.join("include/alpha_h_iid.c")).unwrap();
    assert!(table.contains("DEFINE_GUID(IID_IAlpha"));

    assert!(root.join("rpc/remote_h.h").exists());
    assert_eq!(
        fs::read_to_string(root.join("rpc/remote_c.c")).unwrap(),
        "#include \"remote_h.h\"\n"
    );

    let second = pipeline.run(root);
    assert!(second.is_noop(), "second pass changed files: {:?}", second.changes);
}

#[test]
fn test_case_collision_keeps_lowercase_file() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    write(root, "Utils.H", "/* upper */\n");
    write(root, "utils.h", "/* lower */\n");
    write(root, "main.c", "#include \"Utils.H\"\nint main(void) { return 0; }\n");

    let report = Pipeline::new().run(root);

    assert_eq!(fs::read_to_string(root.join("utils.h")).unwrap(), "/* lower */\n");
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("Case-fold collision") && w.contains("Utils.H")));
    assert!(report.errors.is_empty());
}

#[test]
fn test_scoped_run_leaves_other_projects_alone() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    write(root, "LibA/Shared.C", "int shared;\n");
    write(root, "AppB/Main.C", "int main(void) { return 0; }\n");

    let report = Pipeline::new().run_within(root, &root.join("AppB"));

    assert!(root.join("AppB/main.c").exists());
    assert!(root.join("LibA/Shared.C").exists());
    assert!(report.changed_by("case_fold").iter().all(|p| p.starts_with(root.join("AppB"))));
}

#[test]
fn test_excluded_output_root_is_not_touched() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    write(root, "main.c", "int main(void) { return 0; }\n");
    write(root, "wincross-out/Generated.C", "int generated;\n");

    Pipeline::new().exclude(root.join("wincross-out")).run(root);

    assert!(root.join("wincross-out/Generated.C").exists());
}
