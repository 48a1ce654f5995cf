//! Compiler-compatibility patches
//!
//! Textual rewrites for MSVC-only syntax: the variadic-macro comma,
//! `_M_*` architecture macros and structured exception handling.
//!
//! The SEH rewrite is lossy on purpose. `__try`/`__except` becomes an
//! `if(1)`/`else if(0)` scaffold in C and `try`/`catch (...)` in C++. Neither
//! catches hardware faults; the goal is only that the code compiles.

use super::{rewrite_file, Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const ARCH_ALIAS_MARKER: &str = "WINCROSS_ARCH_ALIASES";

const ARCH_ALIAS_BLOCK: &str = "\
#ifndef WINCROSS_ARCH_ALIASES
#define WINCROSS_ARCH_ALIASES
#if defined(__x86_64__) && !defined(_M_X64)
#define _M_X64 100
#endif
#if defined(__x86_64__) && !defined(_M_AMD64)
#define _M_AMD64 100
#endif
#if defined(__i386__) && !defined(_M_IX86)
#define _M_IX86 600
#endif
#if defined(__aarch64__) && !defined(_M_ARM64)
#define _M_ARM64 1
#endif
#endif /* WINCROSS_ARCH_ALIASES */
";

/// Which replacement shape SEH blocks get
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SehDialect {
    /// `if(1){..} else if(0){..}`; also used for headers
    C,
    /// `try{..} catch (...){..}`
    Cpp,
}

impl SehDialect {
    fn for_path(path: &Path) -> Self {
        if paths::is_cpp_source(path) {
            SehDialect::Cpp
        } else {
            SehDialect::C
        }
    }
}

pub struct CompatMacroRule;

impl TransformRule for CompatMacroRule {
    fn name(&self) -> &'static str {
        "compat_macros"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_c_source(path) || paths::is_cpp_source(path) || paths::is_header(path)
    }

    fn apply(&self, path: &Path, _ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let dialect = SehDialect::for_path(path);
        rewrite_file(self.name(), path, |text| {
            let text = fix_variadic_commas(text);
            let text = add_arch_aliases(&text);
            Some(rewrite_seh(&text, dialect))
        })
    }
}

/// `, __VA_ARGS__` swallows nothing in GCC when the pack is empty; `##` does
fn fix_variadic_commas(text: &str) -> String {
    static VA_ARGS: OnceLock<Regex> = OnceLock::new();
    let re = VA_ARGS.get_or_init(|| Regex::new(r",([ \t]*)__VA_ARGS__").expect("valid regex"));
    re.replace_all(text, ",${1}##__VA_ARGS__").into_owned()
}

fn add_arch_aliases(text: &str) -> String {
    static ARCH: OnceLock<Regex> = OnceLock::new();
    let re = ARCH.get_or_init(|| {
        Regex::new(r"\b_M_(?:X64|AMD64|IX86|ARM64)\b").expect("valid regex")
    });

    if text.contains(ARCH_ALIAS_MARKER) || !re.is_match(text) {
        return text.to_string();
    }
    format!("{}{}", ARCH_ALIAS_BLOCK, text)
}

/// Rewrites every well-formed `__try` block; malformed ones are left as is
pub fn rewrite_seh(src: &str, dialect: SehDialect) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(next) = skip_literal_or_comment(bytes, i) {
            i = next;
            continue;
        }

        if starts_word(bytes, i, "__try") {
            if let Some((replacement, end)) = rewrite_try_at(src, i, dialect) {
                out.push_str(&src[copied..i]);
                out.push_str(&replacement);
                copied = end;
                i = end;
                continue;
            }
            i += "__try".len();
            continue;
        }

        i += 1;
    }

    out.push_str(&src[copied..]);
    out
}

/// Parses `__try {..} __except(..) {..}` or `__try {..} __finally {..}` at `start`
fn rewrite_try_at(src: &str, start: usize, dialect: SehDialect) -> Option<(String, usize)> {
    let bytes = src.as_bytes();

    let open = skip_trivia(bytes, start + "__try".len());
    let close = matching_delimiter(bytes, open, b'{', b'}')?;
    let body = rewrite_seh(&src[open + 1..close], dialect);

    let after = skip_trivia(bytes, close + 1);
    if starts_word(bytes, after, "__except") {
        let paren = skip_trivia(bytes, after + "__except".len());
        let paren_close = matching_delimiter(bytes, paren, b'(', b')')?;
        let h_open = skip_trivia(bytes, paren_close + 1);
        let h_close = matching_delimiter(bytes, h_open, b'{', b'}')?;
        let handler = strip_exception_intrinsics(&rewrite_seh(&src[h_open + 1..h_close], dialect));

        let replacement = match dialect {
            SehDialect::C => format!("if(1){{{}}} else if(0){{{}}}", body, handler),
            SehDialect::Cpp => format!("try{{{}}} catch (...){{{}}}", body, handler),
        };
        Some((replacement, h_close + 1))
    } else if starts_word(bytes, after, "__finally") {
        let f_open = skip_trivia(bytes, after + "__finally".len());
        let f_close = matching_delimiter(bytes, f_open, b'{', b'}')?;
        let finally = rewrite_seh(&src[f_open + 1..f_close], dialect);
        Some((format!("if(1){{{}}} if(1){{{}}}", body, finally), f_close + 1))
    } else {
        None
    }
}

fn strip_exception_intrinsics(handler: &str) -> String {
    static INTRINSICS: OnceLock<Regex> = OnceLock::new();
    let re = INTRINSICS.get_or_init(|| {
        Regex::new(r"\b(GetExceptionCode|GetExceptionInformation)\s*\(\s*\)").expect("valid regex")
    });
    re.replace_all(handler, |caps: &regex::Captures| {
        if &caps[1] == "GetExceptionCode" {
            "0".to_string()
        } else {
            "NULL".to_string()
        }
    })
    .into_owned()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn starts_word(bytes: &[u8], at: usize, word: &str) -> bool {
    let end = at + word.len();
    end <= bytes.len()
        && &bytes[at..end] == word.as_bytes()
        && (at == 0 || !is_ident_byte(bytes[at - 1]))
        && (end == bytes.len() || !is_ident_byte(bytes[end]))
}

/// If a string, char literal or comment starts at `i`, returns the index just past it
fn skip_literal_or_comment(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        b'"' | b'\'' => {
            let quote = bytes[i];
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    b'\n' => return Some(j),
                    b if b == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'/' if bytes.get(i + 1) == Some(&b'/') => {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| i + p);
            Some(end)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let end = bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2);
            Some(end)
        }
        _ => None,
    }
}

fn skip_trivia(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
        } else if bytes[i] == b'/' && matches!(bytes.get(i + 1), Some(b'/') | Some(b'*')) {
            i = skip_literal_or_comment(bytes, i).unwrap_or(i + 1);
        } else {
            break;
        }
    }
    i
}

/// Index of the delimiter closing the one at `open`, skipping literals and comments
fn matching_delimiter(bytes: &[u8], open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    if bytes.get(open) != Some(&open_ch) {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(next) = skip_literal_or_comment(bytes, i) {
            i = next;
            continue;
        }
        if bytes[i] == open_ch {
            depth += 1;
        } else if bytes[i] == close_ch {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seh_c_scaffold() {
        let src = "__try { x(); } __except(1) { y(); }";
        assert_eq!(
            rewrite_seh(src, SehDialect::C),
            "if(1){ x(); } else if(0){ y(); }"
        );
    }

    #[test]
    fn test_seh_cpp_try_catch() {
        let src = "__try {\n  run();\n}\n__except (EXCEPTION_EXECUTE_HANDLER) {\n  log(GetExceptionCode());\n}\n";
        assert_eq!(
            rewrite_seh(src, SehDialect::Cpp),
            "try{\n  run();\n} catch (...){\n  log(0);\n}\n"
        );
    }

    #[test]
    fn test_seh_nested_and_finally() {
        let src = "__try { __try { a(); } __finally { b(); } } __except(filter(GetExceptionInformation())) { c(); }";
        assert_eq!(
            rewrite_seh(src, SehDialect::C),
            "if(1){ if(1){ a(); } if(1){ b(); } } else if(0){ c(); }"
        );
    }

    #[test]
    fn test_seh_braces_in_strings_and_comments() {
        let src = "__try { puts(\"}\"); /* } */ } __except(1) { }";
        assert_eq!(
            rewrite_seh(src, SehDialect::C),
            "if(1){ puts(\"}\"); /* } */ } else if(0){ }"
        );
    }

    #[test]
    fn test_seh_malformed_left_alone() {
        let src = "__try { x(); ";
        assert_eq!(rewrite_seh(src, SehDialect::C), src);
        let no_handler = "__try { x(); } y();";
        assert_eq!(rewrite_seh(no_handler, SehDialect::C), no_handler);
    }

    #[test]
    fn test_seh_ignores_lookalikes() {
        let src = "int my__try = 0; // __try { }\nconst char* s = \"__try {}\";";
        assert_eq!(rewrite_seh(src, SehDialect::Cpp), src);
    }

    #[test]
    fn test_variadic_commas() {
        let src = "#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)\n";
        let once = fix_variadic_commas(src);
        assert_eq!(once, "#define LOG(fmt, ...) printf(fmt, ##__VA_ARGS__)\n");
        assert_eq!(fix_variadic_commas(&once), once);
    }

    #[test]
    fn test_arch_aliases_inserted_once() {
        let src = "#ifdef _M_X64\nint wide;\n#endif\n";
        let once = add_arch_aliases(src);
        assert!(once.starts_with("#ifndef WINCROSS_ARCH_ALIASES"));
        assert!(once.ends_with(src));
        assert_eq!(add_arch_aliases(&once), once);

        let plain = "int x;\n";
        assert_eq!(add_arch_aliases(plain), plain);
    }

    #[test]
    fn test_dialect_by_extension() {
        assert_eq!(SehDialect::for_path(Path::new("a.c")), SehDialect::C);
        assert_eq!(SehDialect::for_path(Path::new("a.h")), SehDialect::C);
        assert_eq!(SehDialect::for_path(Path::new("a.cpp")), SehDialect::Cpp);
    }
}
