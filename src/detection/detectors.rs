use super::{Detector, RepoScan, Strategy};
use crate::util::paths;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Visual Studio solutions, preferred one first
///
/// The shallowest solution wins; among equally deep ones, a solution named
/// after its directory beats the rest, then lexical order decides.
pub struct SolutionDetector;

fn named_after_dir(path: &Path) -> bool {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
    let dir = path
        .parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().to_lowercase());
    stem.is_some() && stem == dir
}

impl Detector for SolutionDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Solution
    }

    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf> {
        let mut solutions: Vec<PathBuf> = scan
            .files()
            .iter()
            .filter(|p| paths::extension(p).as_deref() == Some("sln"))
            .cloned()
            .collect();
        solutions.sort_by(|a, b| {
            scan.depth(a)
                .cmp(&scan.depth(b))
                .then_with(|| match (named_after_dir(a), named_after_dir(b)) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                })
                .then_with(|| a.cmp(b))
        });
        solutions
    }
}

/// Loose `.vcxproj` / `.csproj` files
pub struct ProjectFileDetector;

impl Detector for ProjectFileDetector {
    fn strategy(&self) -> Strategy {
        Strategy::ProjectFiles
    }

    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf> {
        scan.files()
            .iter()
            .filter(|p| matches!(paths::extension(p).as_deref(), Some("vcxproj" | "csproj")))
            .cloned()
            .collect()
    }
}

/// Keeps only files with no matching file in an ancestor directory
///
/// A nested `CMakeLists.txt` belongs to the top-level one above it.
fn top_level(scan: &RepoScan, matches: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let found: Vec<&PathBuf> = scan.files().iter().filter(|p| matches(p)).collect();
    let dirs: Vec<&Path> = found.iter().filter_map(|p| p.parent()).collect();

    found
        .iter()
        .filter(|p| {
            let Some(dir) = p.parent() else {
                return true;
            };
            !dirs.iter().any(|other| *other != dir && dir.starts_with(other))
        })
        .map(|p| (*p).clone())
        .collect()
}

/// Top-level `CMakeLists.txt` files
pub struct CMakeDetector;

impl Detector for CMakeDetector {
    fn strategy(&self) -> Strategy {
        Strategy::CMake
    }

    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf> {
        top_level(scan, |p| {
            p.file_name()
                .map_or(false, |n| n.to_string_lossy().eq_ignore_ascii_case("CMakeLists.txt"))
        })
    }
}

/// Top-level Makefiles
pub struct MakefileDetector;

impl Detector for MakefileDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Makefile
    }

    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf> {
        top_level(scan, |p| {
            p.file_name().map_or(false, |n| {
                let name = n.to_string_lossy();
                name == "Makefile" || name == "makefile" || name == "GNUmakefile"
            })
        })
    }
}

/// Any C or C++ translation unit; the last resort
pub struct RawSourceDetector;

impl Detector for RawSourceDetector {
    fn strategy(&self) -> Strategy {
        Strategy::RawSources
    }

    fn detect(&self, scan: &RepoScan) -> Vec<PathBuf> {
        scan.files()
            .iter()
            .filter(|p| paths::is_c_source(p) || paths::is_cpp_source(p))
            .cloned()
            .collect()
    }
}
