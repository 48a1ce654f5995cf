//! Filename case-folding
//!
//! MSVC projects resolve `#include "Foo.h"` against `foo.h` because NTFS is
//! case-insensitive. Native files with uppercase basenames are renamed to an
//! all-lowercase basename; `IncludeCaseRule` then fixes the references.
//!
//! On a collision the file already holding the lowercase name wins. The
//! mixed-case file is left in place and reported as a warning. Among several
//! mixed-case spellings, the first in sorted path order is the one renamed.

use super::{Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use std::fs;
use std::path::Path;

pub struct CaseFoldRule;

impl TransformRule for CaseFoldRule {
    fn name(&self) -> &'static str {
        "case_fold"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_native_code(path)
            && path
                .file_name()
                .map_or(false, |n| n.to_string_lossy().chars().any(|c| c.is_uppercase()))
    }

    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let (Some(name), Some(parent)) = (path.file_name(), path.parent()) else {
            return Ok(Change::Unchanged);
        };
        let name = name.to_string_lossy().to_string();
        let folded = name.to_lowercase();
        if folded == name {
            return Ok(Change::Unchanged);
        }

        // Exact-name lookup so case-insensitive hosts don't report the file itself
        if name_taken(parent, &folded).map_err(|e| TransformError::new(self.name(), path, e))? {
            ctx.warn(format!(
                "Case-fold collision: {} folds onto existing {}, keeping {}",
                paths::display_relative(ctx.root(), path),
                folded,
                folded
            ));
            return Ok(Change::Unchanged);
        }

        let target = parent.join(&folded);
        fs::rename(path, &target).map_err(|e| TransformError::new(self.name(), path, e))?;
        Ok(Change::Renamed(target))
    }
}

fn name_taken(dir: &Path, name: &str) -> std::io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_renames_uppercase_source() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("MainWindow.CPP"), "int x;").unwrap();

        let mut ctx = TreeContext::scan(dir.path());
        let file = dir.path().join("MainWindow.CPP");
        assert!(CaseFoldRule.matches(&file));

        let change = CaseFoldRule.apply(&file, &mut ctx).unwrap();
        assert_eq!(change, Change::Renamed(dir.path().join("mainwindow.cpp")));
        assert!(dir.path().join("mainwindow.cpp").exists());
    }

    #[test]
    fn test_collision_keeps_lowercase_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Utils.H"), "upper").unwrap();
        fs::write(dir.path().join("utils.h"), "lower").unwrap();

        let mut ctx = TreeContext::scan(dir.path());
        let change = CaseFoldRule
            .apply(&dir.path().join("Utils.H"), &mut ctx)
            .unwrap();

        assert_eq!(change, Change::Unchanged);
        assert_eq!(fs::read_to_string(dir.path().join("utils.h")).unwrap(), "lower");
        assert_eq!(ctx.take_warnings().len(), 1);
    }

    #[test]
    fn test_first_mixed_case_spelling_in_path_order_is_renamed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("UTILS.h"), "shouting").unwrap();
        fs::write(dir.path().join("Utils.H"), "title").unwrap();

        let pipeline = crate::transform::Pipeline::with_rules(vec![Box::new(CaseFoldRule)]);
        let report = pipeline.run(dir.path());

        assert_eq!(report.changed_by("case_fold"), &[dir.path().join("utils.h")]);
        assert_eq!(fs::read_to_string(dir.path().join("utils.h")).unwrap(), "shouting");
        assert!(dir.path().join("Utils.H").exists());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_ignores_non_native_files() {
        assert!(!CaseFoldRule.matches(Path::new("/r/ReadMe.md")));
        assert!(!CaseFoldRule.matches(Path::new("/r/App.csproj")));
        assert!(!CaseFoldRule.matches(Path::new("/r/main.c")));
    }
}
