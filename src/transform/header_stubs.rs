//! Stub headers for SDK headers MinGW does not ship

use super::include_case::include_regex;
use super::{write_new_file, Change, SourceText, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::Captures;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory of the tree root that receives synthesized headers
pub const STUB_DIR_NAME: &str = "compat_stubs";

struct Stub {
    header: &'static str,
    body: &'static str,
}

const STUBS: &[Stub] = &[
    Stub {
        header: "processsnapshot.h",
        body: "\
#include <windows.h>

typedef HANDLE HPSS;

typedef enum {
    PSS_CAPTURE_NONE = 0x00000000,
    PSS_CAPTURE_VA_CLONE = 0x00000001,
    PSS_CAPTURE_HANDLES = 0x00000004,
    PSS_CAPTURE_HANDLE_NAME_INFORMATION = 0x00000008,
    PSS_CAPTURE_THREADS = 0x00000080,
    PSS_CAPTURE_THREAD_CONTEXT = 0x00000100
} PSS_CAPTURE_FLAGS;

typedef enum {
    PSS_QUERY_PROCESS_INFORMATION = 0,
    PSS_QUERY_VA_CLONE_INFORMATION = 1,
    PSS_QUERY_HANDLE_INFORMATION = 4,
    PSS_QUERY_THREAD_INFORMATION = 7
} PSS_QUERY_INFORMATION_CLASS;

typedef DWORD (WINAPI *PFN_PssCaptureSnapshot)(HANDLE, PSS_CAPTURE_FLAGS, DWORD, HPSS *);
typedef DWORD (WINAPI *PFN_PssFreeSnapshot)(HANDLE, HPSS);
typedef DWORD (WINAPI *PFN_PssQuerySnapshot)(HPSS, PSS_QUERY_INFORMATION_CLASS, void *, DWORD);
",
    },
    Stub {
        header: "dontuse.h",
        body: "/* Banned-API markers only; nothing to declare. */\n",
    },
    Stub {
        header: "dpapi.h",
        body: "#include <windows.h>\n#include <wincrypt.h>\n",
    },
];

fn stub_for(name: &str) -> Option<&'static Stub> {
    STUBS.iter().find(|s| s.header.eq_ignore_ascii_case(name))
}

fn render_stub(stub: &Stub) -> String {
    let guard = format!(
        "WINCROSS_STUB_{}",
        stub.header
            .to_ascii_uppercase()
            .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
    );
    format!(
        "/* Minimal stand-in for {}, generated by wincross */\n#ifndef {guard}\n#define {guard}\n\n{}\n#endif /* {guard} */\n",
        stub.header,
        stub.body,
        guard = guard
    )
}

pub struct HeaderStubRule;

impl TransformRule for HeaderStubRule {
    fn name(&self) -> &'static str {
        "header_stubs"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_native_code(path)
    }

    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let source = SourceText::read(path).map_err(|e| TransformError::new(self.name(), path, e))?;
        let stub_dir = ctx.stub_dir();
        let from_dir = path.parent().unwrap_or(ctx.root()).to_path_buf();

        let mut needed: Vec<&'static Stub> = Vec::new();
        let rewritten = include_regex()
            .replace_all(&source.text, |caps: &Captures| {
                let target = paths::to_unix(&caps[3]);
                if target.contains(&format!("{}/", STUB_DIR_NAME)) {
                    return caps[0].to_string();
                }
                let base = target.rsplit('/').next().unwrap_or(&target);
                match stub_for(base) {
                    Some(stub) => {
                        if !needed.iter().any(|s| s.header == stub.header) {
                            needed.push(stub);
                        }
                        let rel = paths::relative_path(&from_dir, &stub_dir.join(stub.header));
                        format!("{}\"{}\"", &caps[1], rel)
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        if needed.is_empty() {
            return Ok(Change::Unchanged);
        }

        let mut touched: Vec<PathBuf> = Vec::new();
        for stub in needed {
            let stub_path = stub_dir.join(stub.header);
            if write_new_file(self.name(), &stub_path, &render_stub(stub))? {
                touched.push(stub_path);
            }
        }

        if rewritten != source.text {
            fs::write(path, source.encode(&rewritten))
                .map_err(|e| TransformError::new(self.name(), path, e))?;
            touched.push(path.to_path_buf());
        }

        Ok(if touched.is_empty() {
            Change::Unchanged
        } else {
            Change::Generated(touched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stub_created_and_include_rewritten() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/diag")).unwrap();
        let file = dir.path().join("src/diag/dump.c");
        fs::write(&file, "#include <windows.h>\n#include <ProcessSnapshot.h>\n").unwrap();

        let mut ctx = TreeContext::scan(dir.path());
        let change = HeaderStubRule.apply(&file, &mut ctx).unwrap();

        let stub = dir.path().join("compat_stubs/processsnapshot.h");
        assert_eq!(change, Change::Generated(vec![stub.clone(), file.clone()]));
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "#include <windows.h>\n#include \"../../compat_stubs/processsnapshot.h\"\n"
        );
        let body = fs::read_to_string(&stub).unwrap();
        assert!(body.contains("#ifndef WINCROSS_STUB_PROCESSSNAPSHOT_H"));
        assert!(body.contains("typedef HANDLE HPSS;"));

        let again = HeaderStubRule.apply(&file, &mut ctx).unwrap();
        assert_eq!(again, Change::Unchanged);
    }

    #[test]
    fn test_existing_stub_not_overwritten() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("compat_stubs")).unwrap();
        fs::write(dir.path().join("compat_stubs/dontuse.h"), "custom").unwrap();
        let file = dir.path().join("main.c");
        fs::write(&file, "#include \"dontuse.h\"\n").unwrap();

        let mut ctx = TreeContext::scan(dir.path());
        let change = HeaderStubRule.apply(&file, &mut ctx).unwrap();

        assert_eq!(change, Change::Generated(vec![file.clone()]));
        assert_eq!(
            fs::read_to_string(dir.path().join("compat_stubs/dontuse.h")).unwrap(),
            "custom"
        );
        assert_eq!(fs::read_to_string(&file).unwrap(), "#include \"compat_stubs/dontuse.h\"\n");
    }

    #[test]
    fn test_no_matching_include() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.c");
        fs::write(&file, "#include <stdio.h>\n").unwrap();

        let mut ctx = TreeContext::scan(dir.path());
        assert_eq!(HeaderStubRule.apply(&file, &mut ctx).unwrap(), Change::Unchanged);
        assert!(!dir.path().join("compat_stubs").exists());
    }
}
