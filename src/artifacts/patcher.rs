//! Rewrites references to sibling build outputs inside resource files

use super::ArtifactStore;
use crate::transform::{SourceText, EXCLUDED_DIRS};
use crate::util::paths;
use ignore::WalkBuilder;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Files that embed names of other binaries
const DESCRIPTOR_EXTENSIONS: &[&str] = &["rc", "rc2", "manifest", "config"];

fn reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r#""((?:[^"\s]*[/\\])?)([A-Za-z0-9_.\-]+\.(?i:dll|exe|lib|ocx))""#)
            .expect("valid regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchedReference {
    pub file: PathBuf,
    pub reference: String,
    pub resolved: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub patched: Vec<PatchedReference>,
    /// References that did not resolve in the store at patch time
    pub unresolved: Vec<String>,
    /// Unresolved references naming an output of a declared predecessor
    pub missing_dependencies: Vec<String>,
}

/// Runs once per project, right before its build step
pub struct ResourcePatcher<'a> {
    store: &'a ArtifactStore,
    excluded: Vec<PathBuf>,
}

impl<'a> ResourcePatcher<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self {
            store,
            excluded: Vec::new(),
        }
    }

    /// Skips an absolute directory (typically the output root)
    pub fn exclude(mut self, dir: PathBuf) -> Self {
        self.excluded.push(dir);
        self
    }

    /// Patches every resource or descriptor file under `project_dir`
    ///
    /// `predecessor_outputs` holds the lowercase names the project's
    /// dependencies were expected to produce. A reference to one of those
    /// that is still unresolved means a dependency failed or was ordered
    /// after this project, and is surfaced as a warning.
    pub fn patch_project(&self, project_dir: &Path, predecessor_outputs: &HashSet<String>) -> PatchReport {
        let mut report = PatchReport::default();

        for file in self.descriptor_files(project_dir) {
            if let Err(err) = self.patch_file(&file, predecessor_outputs, &mut report) {
                warn!(file = %file.display(), error = %err, "Failed to patch resource file");
            }
        }

        if !report.patched.is_empty() {
            info!(
                dir = %project_dir.display(),
                references = report.patched.len(),
                "Patched references to built artifacts"
            );
        }
        report
    }

    fn descriptor_files(&self, dir: &Path) -> Vec<PathBuf> {
        let excluded = self.excluded.clone();
        let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(false)
            .ignore(false)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().map_or(false, |t| t.is_dir()) {
                    return !EXCLUDED_DIRS.iter().any(|d| name.eq_ignore_ascii_case(d))
                        && !excluded.iter().any(|e| entry.path() == e.as_path());
                }
                true
            })
            .build()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map_or(false, |t| t.is_file()))
            .map(|e| e.into_path())
            .filter(|p| {
                paths::extension(p).map_or(false, |ext| DESCRIPTOR_EXTENSIONS.contains(&ext.as_str()))
            })
            .collect();
        files.sort();
        files
    }

    fn patch_file(
        &self,
        file: &Path,
        predecessor_outputs: &HashSet<String>,
        report: &mut PatchReport,
    ) -> std::io::Result<()> {
        let source = SourceText::read(file)?;
        let mut patched = Vec::new();

        let rewritten = reference_regex().replace_all(&source.text, |caps: &regex::Captures| {
            let whole = caps[0].to_string();
            let reference = format!("{}{}", &caps[1], &caps[2]);
            let basename = &caps[2];

            match self.store.get(basename) {
                Some(artifact) => {
                    let resolved = artifact.path.to_string_lossy().replace('\\', "/");
                    if reference != resolved {
                        patched.push(PatchedReference {
                            file: file.to_path_buf(),
                            reference,
                            resolved: artifact.path.clone(),
                        });
                    }
                    format!("\"{}\"", resolved)
                }
                None => {
                    let key = basename.to_lowercase();
                    if predecessor_outputs.contains(&key) {
                        warn!(
                            file = %file.display(),
                            reference = %reference,
                            "Reference to a dependency output is still unresolved; was the dependency built first?"
                        );
                        report.missing_dependencies.push(reference.clone());
                    } else {
                        debug!(file = %file.display(), reference = %reference, "Unresolved reference, will retry");
                    }
                    report.unresolved.push(reference);
                    whole
                }
            }
        });

        if rewritten != source.text {
            fs::write(file, source.encode(&rewritten))?;
        }
        report.patched.extend(patched);
        Ok(())
    }
}
