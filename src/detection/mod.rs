//! Detection cascade: picks how a checkout gets built
//!
//! Detectors are tried in a fixed priority order (solution, project files,
//! CMake, Makefile, raw sources). The first one that finds at least one
//! matching file decides the strategy; later detectors are not consulted.

mod detectors;

pub use detectors::{
    CMakeDetector, MakefileDetector, ProjectFileDetector, RawSourceDetector, SolutionDetector,
};

use crate::manifest::{
    load_solution, parse_manifest, ManifestContext, ParseError, ProjectDescriptor, ProjectKind,
};
use crate::transform::EXCLUDED_DIRS;
use crate::util::paths;
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Build strategy, in cascade priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Solution,
    ProjectFiles,
    CMake,
    Makefile,
    RawSources,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Solution => "solution",
            Strategy::ProjectFiles => "project-files",
            Strategy::CMake => "cmake",
            Strategy::Makefile => "makefile",
            Strategy::RawSources => "raw-sources",
        };
        write!(f, "{}", s)
    }
}

/// One walk of the checkout, shared by every detector
#[derive(Debug, Clone)]
pub struct RepoScan {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl RepoScan {
    /// Walks `root`, skipping VCS/IDE/build-output directories and `excluded`
    pub fn new(root: &Path, excluded: &[PathBuf]) -> Self {
        let excluded = excluded.to_vec();
        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(false)
            .git_exclude(false)
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
            .filter_map(|r| match r {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().map_or(false, |t| t.is_file()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        debug!(root = %root.display(), files = files.len(), "Scanned repository");
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Depth below the root: 0 for files directly in it
    pub fn depth(&self, path: &Path) -> usize {
        path.strip_prefix(&self.root)
            .map(|rel| rel.components().count().saturating_sub(1))
            .unwrap_or(usize::MAX)
    }
}

/// Finds the files a strategy would build from
pub trait Detector: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Matching entry-point files, in discovery order; empty means no match
    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf>;
}

/// The standard cascade, highest priority first
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(SolutionDetector),
        Box::new(ProjectFileDetector),
        Box::new(CMakeDetector),
        Box::new(MakefileDetector),
        Box::new(RawSourceDetector),
    ]
}

/// The first detector's verdict that matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedStrategy {
    pub strategy: Strategy,
    pub manifests: Vec<PathBuf>,
}

/// Runs the cascade; `None` means nothing buildable was found
pub fn detect_strategy(scan: &RepoScan, detectors: &[Box<dyn Detector>]) -> Option<DetectedStrategy> {
    for detector in detectors {
        let manifests = detector.detect(scan);
        if manifests.is_empty() {
            debug!(strategy = %detector.strategy(), "Detector found nothing");
            continue;
        }
        info!(
            strategy = %detector.strategy(),
            manifests = manifests.len(),
            "Detected build strategy"
        );
        return Some(DetectedStrategy {
            strategy: detector.strategy(),
            manifests,
        });
    }
    None
}

/// Projects a strategy will build, plus manifests skipped along the way
#[derive(Debug, Clone)]
pub struct LoadedProjects {
    pub projects: Vec<ProjectDescriptor>,
    pub skipped: Vec<ParseError>,
}

/// Turns a detected strategy into project descriptors
///
/// A manifest that fails to parse is skipped with a warning unless it is
/// the only entry point, in which case the error is returned.
pub fn load_projects(
    scan: &RepoScan,
    detected: &DetectedStrategy,
    ctx: &ManifestContext,
) -> Result<LoadedProjects, ParseError> {
    let root = scan.root();
    match detected.strategy {
        Strategy::Solution => {
            // The cascade only builds the preferred solution
            let Some(sln) = detected.manifests.first() else {
                return Ok(LoadedProjects {
                    projects: Vec::new(),
                    skipped: Vec::new(),
                });
            };
            let load = load_solution(sln, ctx)?;
            if load.projects.is_empty() {
                warn!(solution = %sln.display(), "Solution lists no buildable projects");
            }
            Ok(LoadedProjects {
                projects: load.projects,
                skipped: load.skipped,
            })
        }
        Strategy::ProjectFiles => {
            let mut projects = Vec::new();
            let mut skipped = Vec::new();
            for manifest in &detected.manifests {
                match parse_manifest(manifest, ctx, projects.len()) {
                    Ok(project) => projects.push(project),
                    Err(err) if detected.manifests.len() == 1 => return Err(err),
                    Err(err) => {
                        warn!(manifest = %manifest.display(), error = %err, "Skipping unparseable project");
                        skipped.push(err);
                    }
                }
            }
            Ok(LoadedProjects { projects, skipped })
        }
        Strategy::CMake | Strategy::Makefile => {
            let kind = if detected.strategy == Strategy::CMake {
                ProjectKind::CMakeProject
            } else {
                ProjectKind::MakefileProject
            };
            let projects = detected
                .manifests
                .iter()
                .enumerate()
                .map(|(i, manifest)| {
                    let dir = manifest.parent().unwrap_or(root);
                    ProjectDescriptor::directory_unit(root, dir, Some(manifest), kind, i)
                })
                .collect();
            Ok(LoadedProjects {
                projects,
                skipped: Vec::new(),
            })
        }
        Strategy::RawSources => Ok(LoadedProjects {
            projects: vec![standalone_unit(scan)],
            skipped: Vec::new(),
        }),
    }
}

/// Single synthesized unit covering every source under the root
fn standalone_unit(scan: &RepoScan) -> ProjectDescriptor {
    let root = scan.root();
    let mut unit = ProjectDescriptor::directory_unit(root, root, None, ProjectKind::StandaloneSources, 0);
    let relative = |p: &Path| paths::display_relative(root, p);

    let mut include_dirs = BTreeSet::new();
    for file in scan.files() {
        if paths::is_c_source(file) || paths::is_cpp_source(file) {
            unit.settings.sources.push(relative(file));
        } else if paths::is_resource_script(file) && paths::extension(file).as_deref() == Some("rc") {
            unit.settings.resources.push(relative(file));
        } else if paths::is_header(file) {
            unit.settings.headers.push(relative(file));
            if let Some(dir) = file.parent().filter(|d| *d != root) {
                include_dirs.insert(relative(dir));
            }
        }
    }
    unit.settings.include_dirs = include_dirs.into_iter().collect();
    unit
}
