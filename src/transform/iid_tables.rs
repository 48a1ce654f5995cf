//! Interface-ID tables for GUID-annotated declarations
//!
//! MSVC materializes `IID_IFoo` from `__declspec(uuid(...))` on demand.
//! MinGW needs a translation unit that actually defines the symbol.

use super::{write_new_file, Change, SourceText, TransformError, TransformRule, TreeContext, EXCLUDED_DIRS};
use crate::util::paths;
use ignore::WalkBuilder;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const TABLE_SUFFIX: &str = "_iid.c";
const TABLE_BANNER: &str = "/* Interface IDs declared in ";

/// Converts `a5cd92ff-29be-454c-8d04-d82879fb3f1b` into `DEFINE_GUID` arguments
pub fn guid_initializer(guid: &str) -> Option<String> {
    let groups: Vec<&str> = guid.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    if groups.len() != lengths.len()
        || groups
            .iter()
            .zip(lengths)
            .any(|(g, len)| g.len() != len || !g.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }

    let mut parts = vec![
        format!("0x{}", groups[0].to_lowercase()),
        format!("0x{}", groups[1].to_lowercase()),
        format!("0x{}", groups[2].to_lowercase()),
    ];
    let tail = format!("{}{}", groups[3], groups[4]).to_lowercase();
    for i in (0..tail.len()).step_by(2) {
        parts.push(format!("0x{}", &tail[i..i + 2]));
    }
    Some(parts.join(", "))
}

/// Interface name to GUID for every annotated declaration in `text`
fn annotated_interfaces(text: &str) -> BTreeMap<String, String> {
    static ANNOTATED: OnceLock<Regex> = OnceLock::new();
    let re = ANNOTATED.get_or_init(|| {
        Regex::new(
            r#"(?:MIDL_INTERFACE|DECLSPEC_UUID|__declspec\s*\(\s*uuid)\s*\(\s*"([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})"\s*\)\s*\)?\s*(I\w+)"#,
        )
        .expect("valid regex")
    });

    re.captures_iter(text)
        .map(|caps| (caps[2].to_string(), caps[1].to_lowercase()))
        .collect()
}

/// Tables this rule generated under `dir`, sorted
///
/// Manifests never list them, so the build must add them to the target.
pub fn generated_iid_tables(dir: &Path, excluded: &[PathBuf]) -> Vec<PathBuf> {
    let excluded = excluded.to_vec();
    let mut found: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .ignore(false)
        .filter_entry(move |entry| {
            if !entry.file_type().map_or(false, |t| t.is_dir()) {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !EXCLUDED_DIRS.iter().any(|d| name.eq_ignore_ascii_case(d))
                && !excluded.iter().any(|e| entry.path() == e.as_path())
        })
        .build()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map_or(false, |t| t.is_file()))
        .map(|e| e.into_path())
        .filter(|p| {
            p.file_name()
                .map_or(false, |n| n.to_string_lossy().ends_with(TABLE_SUFFIX))
        })
        .filter(|p| fs::read_to_string(p).map_or(false, |text| text.starts_with(TABLE_BANNER)))
        .collect();
    found.sort();
    found
}

pub struct IidTableRule;

impl TransformRule for IidTableRule {
    fn name(&self) -> &'static str {
        "iid_tables"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_header(path)
    }

    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let source = SourceText::read(path).map_err(|e| TransformError::new(self.name(), path, e))?;
        let interfaces = annotated_interfaces(&source.text);
        if interfaces.is_empty() {
            return Ok(Change::Unchanged);
        }

        let defined = ctx.defined_iids();
        let missing: Vec<(String, String)> = interfaces
            .into_iter()
            .filter(|(name, _)| !defined.contains(&format!("IID_{}", name)))
            .filter_map(|(name, guid)| guid_initializer(&guid).map(|init| (name, init)))
            .collect();
        if missing.is_empty() {
            return Ok(Change::Unchanged);
        }

        let header = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        // Named after the whole file name so `x.h` and `x.hpp` never share one
        let table_name = format!("{}{}", header.to_lowercase().replace('.', "_"), TABLE_SUFFIX);
        let target = path.with_file_name(table_name);

        let mut content = format!(
            "{}{}, generated by wincross */\n#include <windows.h>\n#include <initguid.h>\n\n",
            TABLE_BANNER, header
        );
        for (name, init) in &missing {
            content.push_str(&format!("DEFINE_GUID(IID_{}, {});\n", name, init));
        }

        if !write_new_file(self.name(), &target, &content)? {
            return Ok(Change::Unchanged);
        }
        for (name, _) in missing {
            defined.insert(format!("IID_{}", name));
        }
        Ok(Change::Generated(vec![target]))
    }
}
