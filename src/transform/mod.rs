//! Source transformation pipeline
//!
//! Adapts an MSVC-oriented source tree so MinGW can compile it. The pipeline
//! is a fixed, ordered list of [`TransformRule`]s. Each rule runs over every
//! file matching its predicate before the next rule starts, because later
//! rules rely on what earlier ones normalized (include rewriting expects
//! filenames to be case-folded already, and so on).
//!
//! Every rule is idempotent: running the pipeline twice leaves the tree
//! byte-identical to running it once. A rule failing on a single file is
//! logged and that file is skipped; the pipeline itself never aborts.

mod case_fold;
mod com_interfaces;
mod compat;
mod encoding;
mod header_stubs;
mod iid_tables;
mod include_case;
mod known_headers;
mod midl;

pub use case_fold::CaseFoldRule;
pub use com_interfaces::ComInterfaceRule;
pub use compat::{rewrite_seh, CompatMacroRule, SehDialect};
pub use encoding::{normalize_encoding, EncodingRule};
pub use header_stubs::{HeaderStubRule, STUB_DIR_NAME};
pub use iid_tables::{generated_iid_tables, IidTableRule};
pub use include_case::IncludeCaseRule;
pub use known_headers::KnownHeaderRule;
pub use midl::{IdlInterface, MidlHeaderRule};

use crate::util::paths;
use ignore::WalkBuilder;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directories never walked by the pipeline or the detectors
pub const EXCLUDED_DIRS: &[&str] = &[".git", ".vs", "bin", "obj", "node_modules", "packages"];

/// A rule failed on one file
#[derive(Debug, Error, Clone, Serialize)]
#[error("Rule {rule} failed on {}: {cause}", .path.display())]
pub struct TransformError {
    pub rule: &'static str,
    pub path: PathBuf,
    pub cause: String,
}

impl TransformError {
    pub fn new(rule: &'static str, path: &Path, cause: impl ToString) -> Self {
        Self {
            rule,
            path: path.to_path_buf(),
            cause: cause.to_string(),
        }
    }
}

/// What a rule did to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Rewritten,
    Renamed(PathBuf),
    /// Files were created, or rewritten to refer to created files
    Generated(Vec<PathBuf>),
}

/// A named, idempotent rewrite over one file plus tree-wide context
pub trait TransformRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this rule looks at `path` at all
    fn matches(&self, path: &Path) -> bool;

    fn apply(&self, path: &Path, ctx: &mut TreeContext) -> Result<Change, TransformError>;
}

/// Tree-wide facts available to rules, refreshed between rules
pub struct TreeContext {
    root: PathBuf,
    excluded: Vec<PathBuf>,
    files: Vec<PathBuf>,
    native_basenames: HashSet<String>,
    defined_iids: Option<HashSet<String>>,
    warnings: Vec<String>,
}

impl TreeContext {
    /// Walks `root` and snapshots its file list
    pub fn scan(root: &Path) -> Self {
        Self::scan_excluding(root, Vec::new())
    }

    /// Like [`TreeContext::scan`], also skipping the given absolute directories
    pub fn scan_excluding(root: &Path, excluded: Vec<PathBuf>) -> Self {
        let mut ctx = Self {
            root: root.to_path_buf(),
            excluded,
            files: Vec::new(),
            native_basenames: HashSet::new(),
            defined_iids: None,
            warnings: Vec::new(),
        };
        ctx.refresh();
        ctx
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths of every file in the tree, sorted
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Directory holding synthesized stub headers
    pub fn stub_dir(&self) -> PathBuf {
        self.root.join(STUB_DIR_NAME)
    }

    /// True when some C/C++ file in the tree has exactly this (lowercase) basename
    pub fn has_native_file(&self, lowercase_name: &str) -> bool {
        self.native_basenames.contains(lowercase_name)
    }

    /// Interface IDs already defined somewhere in the tree, computed on first use
    pub fn defined_iids(&mut self) -> &mut HashSet<String> {
        if self.defined_iids.is_none() {
            let mut defined = HashSet::new();
            for file in self.files.iter().filter(|f| paths::is_native_code(f)) {
                if let Ok(text) = SourceText::read(file) {
                    collect_iid_definitions(&text.text, &mut defined);
                }
            }
            self.defined_iids = Some(defined);
        }
        self.defined_iids.get_or_insert_with(HashSet::new)
    }

    /// Records a non-fatal warning for the transformation report
    pub fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Re-walks the tree after a rule renamed or generated files
    pub fn refresh(&mut self) {
        let mut files = Vec::new();
        let excluded = self.excluded.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(false)
            .git_exclude(false)
            .ignore(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
                if !is_dir {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if EXCLUDED_DIRS.iter().any(|d| name.eq_ignore_ascii_case(d)) {
                    return false;
                }
                !excluded.iter().any(|e| entry.path() == e.as_path())
            })
            .build();

        for result in walker {
            match result {
                Ok(entry) if entry.file_type().map_or(false, |t| t.is_file()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Failed to read directory entry"),
            }
        }
        files.sort();

        self.native_basenames = files
            .iter()
            .filter(|f| paths::is_native_code(f))
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().to_lowercase()))
            .collect();
        self.files = files;
        self.defined_iids = None;
    }
}

fn collect_iid_definitions(text: &str, into: &mut HashSet<String>) {
    static DEFINITION: OnceLock<Regex> = OnceLock::new();
    let re = DEFINITION.get_or_init(|| {
        Regex::new(
            r"(?:DEFINE_GUID\s*\(\s*|(?:const\s+)?(?:IID|GUID|CLSID)\s+(?:DECLSPEC_SELECTANY\s+)?)(IID_\w+)\s*(?:,|=)",
        )
        .expect("valid regex")
    });
    for caps in re.captures_iter(text) {
        into.insert(caps[1].to_string());
    }
}

/// File text decoded losslessly: UTF-8 when valid, otherwise one char per byte
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    latin1: bool,
}

impl SourceText {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                text: text.to_string(),
                latin1: false,
            },
            Err(_) => Self {
                text: bytes.iter().map(|&b| b as char).collect(),
                latin1: true,
            },
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_bytes(&fs::read(path)?))
    }

    /// Encodes `text` back the way the original was stored
    pub fn encode(&self, text: &str) -> Vec<u8> {
        if self.latin1 {
            text.chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect()
        } else {
            text.as_bytes().to_vec()
        }
    }
}

/// Applies a pure text rewrite to a file, writing only when it changed
pub(crate) fn rewrite_file<F>(rule: &'static str, path: &Path, f: F) -> Result<Change, TransformError>
where
    F: FnOnce(&str) -> Option<String>,
{
    let source = SourceText::read(path).map_err(|e| TransformError::new(rule, path, e))?;
    match f(&source.text) {
        Some(rewritten) if rewritten != source.text => {
            fs::write(path, source.encode(&rewritten))
                .map_err(|e| TransformError::new(rule, path, e))?;
            Ok(Change::Rewritten)
        }
        _ => Ok(Change::Unchanged),
    }
}

/// Writes a generated file unless one already exists at `path`
pub(crate) fn write_new_file(rule: &'static str, path: &Path, content: &str) -> Result<bool, TransformError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransformError::new(rule, path, e))?;
    }
    fs::write(path, content).map_err(|e| TransformError::new(rule, path, e))?;
    Ok(true)
}

/// Per-rule manifest of what the pipeline touched
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    /// Rule name to the files it changed, renamed or generated
    pub changes: BTreeMap<&'static str, Vec<PathBuf>>,
    pub errors: Vec<TransformError>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl TransformReport {
    pub fn files_changed(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    pub fn changed_by(&self, rule: &str) -> &[PathBuf] {
        self.changes.get(rule).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_noop(&self) -> bool {
        self.files_changed() == 0
    }
}

/// The ordered rule list
pub struct Pipeline {
    rules: Vec<Box<dyn TransformRule>>,
    excluded: Vec<PathBuf>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// The standard rule order
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(EncodingRule),
            Box::new(CaseFoldRule),
            Box::new(IncludeCaseRule),
            Box::new(KnownHeaderRule),
            Box::new(CompatMacroRule),
            Box::new(HeaderStubRule),
            Box::new(ComInterfaceRule),
            Box::new(IidTableRule),
            Box::new(MidlHeaderRule),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn TransformRule>>) -> Self {
        Self {
            rules,
            excluded: Vec::new(),
        }
    }

    /// Skips an absolute directory (typically the output root) during the walk
    pub fn exclude(mut self, dir: PathBuf) -> Self {
        self.excluded.push(dir);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Runs every rule over the tree rooted at `root`, in order
    pub fn run(&self, root: &Path) -> TransformReport {
        self.run_within(root, root)
    }

    /// Like [`Pipeline::run`], but only rewrites files under `scope`
    ///
    /// Rules still see the whole tree rooted at `root` as context, so stubs
    /// and interface tables stay shared between projects.
    pub fn run_within(&self, root: &Path, scope: &Path) -> TransformReport {
        let start = Instant::now();
        let mut report = TransformReport::default();
        let mut ctx = TreeContext::scan_excluding(root, self.excluded.clone());

        info!(
            root = %root.display(),
            scope = %scope.display(),
            files = ctx.files().len(),
            rules = self.rules.len(),
            "Running source transformation pipeline"
        );

        for rule in &self.rules {
            let name = rule.name();
            let targets: Vec<PathBuf> = ctx
                .files()
                .iter()
                .filter(|f| f.starts_with(scope) && rule.matches(f))
                .cloned()
                .collect();
            let mut touched = false;

            for file in targets {
                match rule.apply(&file, &mut ctx) {
                    Ok(Change::Unchanged) => {}
                    Ok(Change::Rewritten) => {
                        debug!(rule = name, file = %file.display(), "Rewrote file");
                        report.changes.entry(name).or_default().push(file);
                        touched = true;
                    }
                    Ok(Change::Renamed(to)) => {
                        debug!(rule = name, from = %file.display(), to = %to.display(), "Renamed file");
                        report.changes.entry(name).or_default().push(to);
                        touched = true;
                    }
                    Ok(Change::Generated(created)) => {
                        debug!(rule = name, file = %file.display(), generated = created.len(), "Generated files");
                        report.changes.entry(name).or_default().extend(created);
                        touched = true;
                    }
                    Err(err) => {
                        warn!(rule = name, file = %file.display(), error = %err.cause, "Rule failed, skipping file");
                        report.errors.push(err);
                    }
                }
            }

            report.warnings.extend(ctx.take_warnings());
            if touched {
                ctx.refresh();
            }
        }

        for files in report.changes.values_mut() {
            files.sort();
            files.dedup();
        }
        report.elapsed = start.elapsed();

        info!(
            files_changed = report.files_changed(),
            errors = report.errors.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "Source transformation complete"
        );

        report
    }
}
