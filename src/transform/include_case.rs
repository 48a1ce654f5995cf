//! Include-path case rewriting

use super::{rewrite_file, Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

/// Matches `#include "x"` and `#include <x>` at the start of a line
pub(crate) fn include_regex() -> &'static Regex {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    INCLUDE.get_or_init(|| {
        Regex::new(r#"(?m)^([ \t]*#[ \t]*include[ \t]*)(["<])([^">\r\n]+)([">])"#)
            .expect("valid regex")
    })
}

/// Rewrites includes whose target was case-folded to the folded name
pub struct IncludeCaseRule;

impl TransformRule for IncludeCaseRule {
    fn name(&self) -> &'static str {
        "include_case"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_native_code(path)
    }

    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError> {
        rewrite_file(self.name(), path, |text| {
            Some(rewrite_includes(text, |name| ctx.has_native_file(name)))
        })
    }
}

/// Lowercases the basename of every include that `is_folded` accepts, and
/// turns backslash separators into forward slashes
pub fn rewrite_includes(text: &str, is_folded: impl Fn(&str) -> bool) -> String {
    include_regex()
        .replace_all(text, |caps: &Captures| {
            let target = paths::to_unix(&caps[3]);
            let (dir, base) = match target.rfind('/') {
                Some(i) => target.split_at(i + 1),
                None => ("", target.as_str()),
            };
            let folded = base.to_lowercase();
            let base = if folded != base && is_folded(&folded) {
                folded.as_str()
            } else {
                base
            };
            format!("{}{}{}{}{}", &caps[1], &caps[2], dir, base, &caps[4])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folded(name: &str) -> bool {
        matches!(name, "utils.h" | "resource.h" | "mainwindow.h")
    }

    #[test]
    fn test_rewrites_quoted_and_angle_forms() {
        let src = "#include \"Utils.h\"\n#include <Resource.H>\n#include <Other.h>\n";
        assert_eq!(
            rewrite_includes(src, folded),
            "#include \"utils.h\"\n#include <resource.h>\n#include <Other.h>\n"
        );
    }

    #[test]
    fn test_keeps_directory_case_and_fixes_separators() {
        let src = "  #  include \"UI\\MainWindow.h\"\n";
        assert_eq!(
            rewrite_includes(src, folded),
            "  #  include \"UI/mainwindow.h\"\n"
        );
    }

    #[test]
    fn test_idempotent() {
        let src = "#include \"Utils.h\"\nint x;\n";
        let once = rewrite_includes(src, folded);
        assert_eq!(rewrite_includes(&once, folded), once);
    }

    #[test]
    fn test_ignores_non_directives() {
        let src = "// see \"Utils.h\"\nconst char* s = \"#include <Utils.h>\";\n";
        assert_eq!(rewrite_includes(src, folded), src);
    }
}
