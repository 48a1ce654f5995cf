//! MIDL-equivalent header generation for RPC interfaces
//!
//! Some repositories check in the `_c.c`/`_s.c` stubs MIDL produced but not
//! the header. We rebuild a header good enough to compile those stubs.

use super::include_case::{include_regex, rewrite_includes};
use super::{rewrite_file, write_new_file, Change, SourceText, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const COMPANION_SUFFIXES: &[&str] = &["_c.c", "_s.c", "_p.c", "_i.c"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlTypedef {
    pub struct_name: String,
    pub body: String,
    pub typedef_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlFunction {
    pub return_type: String,
    pub name: String,
    pub params: String,
}

/// What the header generator extracts from one `.idl` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlInterface {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub version: String,
    pub typedefs: Vec<IdlTypedef>,
    pub functions: Vec<IdlFunction>,
}

impl IdlInterface {
    /// Strict parse: interface name, uuid and balanced braces are required
    pub fn parse(text: &str) -> Result<Self, String> {
        let code = strip_comments(text);
        let opens = code.matches('{').count();
        let closes = code.matches('}').count();
        if opens != closes {
            return Err(format!("unbalanced braces ({} open, {} close)", opens, closes));
        }

        let parsed = Self::parse_lenient(text);
        if parsed.uuid.is_none() {
            return Err("no uuid(...) attribute".to_string());
        }
        if parsed.name.is_none() {
            return Err("no interface declaration".to_string());
        }
        Ok(parsed)
    }

    /// Best-effort parse that never fails
    pub fn parse_lenient(text: &str) -> Self {
        static UUID: OnceLock<Regex> = OnceLock::new();
        static VERSION: OnceLock<Regex> = OnceLock::new();
        static NAME: OnceLock<Regex> = OnceLock::new();

        let code = strip_comments(text);
        let uuid = regex(&UUID, r"uuid\s*\(\s*([0-9a-fA-F-]+)\s*\)")
            .captures(&code)
            .map(|c| c[1].to_string());
        let version = regex(&VERSION, r"version\s*\(\s*(\d+\.\d+)\s*\)")
            .captures(&code)
            .map_or_else(|| "1.0".to_string(), |c| c[1].to_string());
        let name = regex(&NAME, r"\binterface\s+(\w+)")
            .captures(&code)
            .map(|c| c[1].to_string());

        Self {
            name,
            uuid,
            version,
            typedefs: parse_typedefs(&code),
            functions: parse_functions(text),
        }
    }

    pub fn render_header(&self, idl_stem: &str) -> String {
        let guard = format!(
            "__{}_H__",
            idl_stem
                .to_ascii_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        );
        let mut lines: Vec<String> = vec![
            format!("/* MIDL-compatible header generated by wincross from {}.idl */", idl_stem),
            format!("#ifndef {}", guard),
            format!("#define {}", guard),
            String::new(),
            "#ifndef __REQUIRED_RPCNDR_H_VERSION__".into(),
            "#define __REQUIRED_RPCNDR_H_VERSION__ 475".into(),
            "#endif".into(),
            String::new(),
            "#include <rpc.h>".into(),
            "#include <rpcndr.h>".into(),
            String::new(),
            "#ifndef COM_NO_WINDOWS_H".into(),
            "#include <windows.h>".into(),
            "#include <ole2.h>".into(),
            "#endif".into(),
            String::new(),
            "#ifdef __cplusplus".into(),
            "extern \"C\" {".into(),
            "#endif".into(),
            String::new(),
        ];

        lines.push(format!(
            "/* Interface: {} */",
            self.name.as_deref().unwrap_or("unknown")
        ));
        lines.push(format!("/* UUID: {} */", self.uuid.as_deref().unwrap_or("unknown")));
        lines.push(format!("/* Version: {} */", self.version));
        if let Some(name) = &self.name {
            let version = self.version.replace('.', "_");
            lines.push(String::new());
            lines.push(format!("extern RPC_IF_HANDLE {}_v{}_c_ifspec;", name, version));
            lines.push(format!("extern RPC_IF_HANDLE {}_v{}_s_ifspec;", name, version));
        }
        lines.push(String::new());

        if !self.typedefs.is_empty() {
            lines.push("/* Type definitions */".into());
            for td in &self.typedefs {
                lines.push(format!("typedef struct {}", td.struct_name));
                lines.push("{".into());
                lines.push(td.body.clone());
                lines.push(format!("}} {};", td.typedef_name));
                lines.push(String::new());
            }
        }

        if !self.functions.is_empty() {
            lines.push("/* Function prototypes */".into());
            for f in &self.functions {
                let params = if f.params.is_empty() { "void" } else { f.params.as_str() };
                lines.push(format!("{} {}({});", f.return_type, f.name, params));
            }
            lines.push(String::new());
        }

        lines.extend([
            "#ifdef __cplusplus".to_string(),
            "}".to_string(),
            "#endif".to_string(),
            String::new(),
            format!("#endif /* {} */", guard),
            String::new(),
        ]);
        lines.join("\n")
    }
}

fn strip_comments(text: &str) -> String {
    static COMMENTS: OnceLock<Regex> = OnceLock::new();
    regex(&COMMENTS, r"(?s)/\*.*?\*/|//[^\n]*")
        .replace_all(text, "")
        .into_owned()
}

/// Drops `[in]`, `[string, unique]` and friends, keeping array declarators
fn strip_attributes(text: &str) -> String {
    static ATTRIBUTES: OnceLock<Regex> = OnceLock::new();
    regex(&ATTRIBUTES, r"(?m)(^|[(,;{])([ \t]*)\[[^\]]*\][ \t]*")
        .replace_all(text, "$1$2")
        .into_owned()
}

fn convert_types(text: &str) -> String {
    static HYPER: OnceLock<Regex> = OnceLock::new();
    static HANDLE: OnceLock<Regex> = OnceLock::new();
    let text = regex(&HYPER, r"\bhyper\b").replace_all(text, "__int64");
    regex(&HANDLE, r"\bhandle_t\b")
        .replace_all(&text, "RPC_BINDING_HANDLE")
        .into_owned()
}

fn parse_typedefs(code: &str) -> Vec<IdlTypedef> {
    static TYPEDEF: OnceLock<Regex> = OnceLock::new();
    regex(
        &TYPEDEF,
        r"typedef\s+(?:\[[^\]]*\]\s*)?struct\s+(\w+)\s*\{([^}]+)\}\s*(\w+)\s*;",
    )
    .captures_iter(code)
    .map(|c| IdlTypedef {
        struct_name: c[1].to_string(),
        body: convert_types(&strip_attributes(&c[2])),
        typedef_name: c[3].to_string(),
    })
    .collect()
}

fn parse_functions(text: &str) -> Vec<IdlFunction> {
    static FUNCTION: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let ws = regex(&WHITESPACE, r"\s+");

    regex(
        &FUNCTION,
        r"(?m)^[ \t]*(long|void|int|short|HRESULT|error_status_t)\s+(\w+)\s*\(([^;]*)\)\s*;([ \t]*//[^\n]*)?",
    )
    .captures_iter(text)
    .map(|c| {
        let comment = c.get(4).map_or("", |m| m.as_str()).to_lowercase();
        let params = if comment.contains("not used") {
            "RPC_BINDING_HANDLE IDL_handle".to_string()
        } else {
            let cleaned = convert_types(&strip_attributes(&format!("({}", &c[3])));
            ws.replace_all(cleaned.trim_start_matches('('), " ")
                .trim()
                .to_string()
        };
        IdlFunction {
            return_type: c[1].to_string(),
            name: c[2].to_string(),
            params,
        }
    })
    .collect()
}

/// Builds the header text, falling back to the lenient parser on failure
pub fn generate_header(idl_text: &str, idl_stem: &str) -> (String, Option<String>) {
    match IdlInterface::parse(idl_text) {
        Ok(iface) => (iface.render_header(idl_stem), None),
        Err(cause) => (
            IdlInterface::parse_lenient(idl_text).render_header(idl_stem),
            Some(cause),
        ),
    }
}

pub struct MidlHeaderRule;

impl MidlHeaderRule {
    fn companions(idl: &Path, ctx: &TreeContext) -> Vec<PathBuf> {
        let (Some(dir), Some(stem)) = (idl.parent(), idl.file_stem()) else {
            return Vec::new();
        };
        let stem = stem.to_string_lossy().to_lowercase();
        ctx.files()
            .iter()
            .filter(|f| f.parent() == Some(dir))
            .filter(|f| {
                let name = f
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                COMPANION_SUFFIXES
                    .iter()
                    .any(|suffix| name == format!("{}{}", stem, suffix))
            })
            .cloned()
            .collect()
    }

    /// Lowercased name of the header the companions include, else `<stem>_h.h`
    fn header_name(stem: &str, companions: &[PathBuf]) -> String {
        let prefix = stem.to_lowercase();
        for companion in companions {
            let Ok(source) = SourceText::read(companion) else {
                continue;
            };
            for caps in include_regex().captures_iter(&source.text) {
                let target = paths::to_unix(&caps[3]);
                let lower = target.rsplit('/').next().unwrap_or(&target).to_lowercase();
                if &caps[2] == "\"" && lower.ends_with(".h") && lower.starts_with(&prefix) {
                    return lower;
                }
            }
        }
        format!("{}_h.h", prefix)
    }
}

impl TransformRule for MidlHeaderRule {
    fn name(&self) -> &'static str {
        "midl_headers"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::extension(path).as_deref() == Some("idl")
    }

    /// The header is always written lowercase, and companion includes are
    /// folded to it in the same pass so a later run has nothing to rename.
    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let companions = Self::companions(path, ctx);
        if companions.is_empty() {
            return Ok(Change::Unchanged);
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let header_name = Self::header_name(&stem, &companions);

        let mut touched = Vec::new();
        for companion in &companions {
            let change = rewrite_file(self.name(), companion, |text| {
                Some(rewrite_includes(text, |name| name == header_name))
            })?;
            if change == Change::Rewritten {
                touched.push(companion.clone());
            }
        }

        let header = path.with_file_name(&header_name);
        if !header.exists() {
            let source = SourceText::read(path).map_err(|e| TransformError::new(self.name(), path, e))?;
            let (content, fallback_cause) = generate_header(&source.text, &stem);
            if let Some(cause) = fallback_cause {
                ctx.warn(format!(
                    "IDL {} did not parse cleanly ({}); generated reduced header",
                    paths::display_relative(ctx.root(), path),
                    cause
                ));
            }
            if write_new_file(self.name(), &header, &content)? {
                touched.insert(0, header);
            }
        }

        if touched.is_empty() {
            Ok(Change::Unchanged)
        } else {
            Ok(Change::Generated(touched))
        }
    }
}
