//! Project descriptor model and manifest parsers
//!
//! Parsers favour best-effort extraction: unknown elements are ignored and
//! only unreadable or structurally broken manifests produce a
//! [`ParseError`].

mod csproj;
mod msbuild;
mod sln;
mod vcxproj;

pub use csproj::parse_csproj;
pub use sln::{parse_solution, SolutionFile, SolutionProject, SolutionProjectType};
pub use vcxproj::parse_vcxproj;

use crate::config::{Architecture, BuildConfig, Configuration};
use crate::transform::SourceText;
use crate::util::paths;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A manifest could not be read or understood
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to parse {}: {cause}", .path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub cause: String,
}

impl ParseError {
    pub fn new(path: &Path, cause: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProjectKind {
    CSharpFramework,
    CSharpModern,
    CppVcxproj,
    CMakeProject,
    MakefileProject,
    StandaloneSources,
}

/// Coarse grouping used to restrict graph resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KindFamily {
    Native,
    Managed,
}

impl ProjectKind {
    pub fn family(&self) -> KindFamily {
        match self {
            ProjectKind::CSharpFramework | ProjectKind::CSharpModern => KindFamily::Managed,
            _ => KindFamily::Native,
        }
    }

    /// Kind hint from a manifest filename; `.csproj` refines on parse
    pub fn from_manifest(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        match paths::extension(path).as_deref() {
            Some("vcxproj") => Some(ProjectKind::CppVcxproj),
            Some("csproj") => Some(ProjectKind::CSharpFramework),
            _ if name == "cmakelists.txt" => Some(ProjectKind::CMakeProject),
            _ if matches!(name.as_str(), "makefile" | "gnumakefile") => {
                Some(ProjectKind::MakefileProject)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectKind::CSharpFramework => "csharp-framework",
            ProjectKind::CSharpModern => "csharp-modern",
            ProjectKind::CppVcxproj => "cpp-vcxproj",
            ProjectKind::CMakeProject => "cmake",
            ProjectKind::MakefileProject => "makefile",
            ProjectKind::StandaloneSources => "standalone-sources",
        };
        write!(f, "{}", s)
    }
}

/// Recognized build options; which fields are populated depends on the kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSettings {
    /// Normalized target architecture (`x64`/`x86`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// `Application`, `DynamicLibrary` or `StaticLibrary`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_dirs: Vec<String>,
    /// Import libraries, without `.lib`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_library: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_set: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpp_standard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<String>,
}

/// One buildable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    /// Manifest (or unit directory) path relative to the repository root
    pub id: String,
    pub name: String,
    pub kind: ProjectKind,
    /// Root directory of the unit
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    pub settings: ConfigSettings,
    pub explicit_deps: BTreeSet<String>,
    pub produces_library: bool,
    pub discovery_index: usize,
}

impl ProjectDescriptor {
    /// A unit without a per-project manifest of its own (CMake, Make, raw sources)
    pub fn directory_unit(
        root: &Path,
        dir: &Path,
        manifest: Option<&Path>,
        kind: ProjectKind,
        discovery_index: usize,
    ) -> Self {
        let name = dir
            .file_name()
            .or_else(|| root.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        Self {
            id: project_id(root, manifest.unwrap_or(dir)),
            name,
            kind,
            path: dir.to_path_buf(),
            manifest: manifest.map(Path::to_path_buf),
            settings: ConfigSettings::default(),
            explicit_deps: BTreeSet::new(),
            produces_library: false,
            discovery_index,
        }
    }

    /// Binary names other projects may refer to this project's output by
    pub fn expected_outputs(&self) -> Vec<String> {
        let name = self
            .settings
            .assembly_name
            .clone()
            .unwrap_or_else(|| self.name.clone());
        match self.kind {
            ProjectKind::CppVcxproj => match self.settings.configuration_type.as_deref() {
                Some("DynamicLibrary") => vec![format!("{}.dll", name), format!("{}.lib", name)],
                Some("StaticLibrary") => vec![format!("{}.lib", name)],
                _ => vec![format!("{}.exe", name)],
            },
            ProjectKind::CSharpFramework | ProjectKind::CSharpModern => {
                if self.produces_library {
                    vec![format!("{}.dll", name)]
                } else {
                    vec![format!("{}.exe", name), format!("{}.dll", name)]
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Stable id for a manifest or unit directory: its path relative to the root
pub fn project_id(root: &Path, path: &Path) -> String {
    let rel = paths::display_relative(root, &paths::normalize(path));
    if rel.is_empty() {
        ".".to_string()
    } else {
        rel
    }
}

/// Everything a parser needs besides the manifest itself
#[derive(Debug, Clone)]
pub struct ManifestContext {
    pub root: PathBuf,
    /// Directory `$(SolutionDir)` expands to; defaults to the project's parent
    pub solution_dir: Option<PathBuf>,
    pub configuration: Configuration,
    pub arch: Architecture,
}

impl ManifestContext {
    pub fn new(root: &Path, config: &BuildConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            solution_dir: None,
            configuration: config.configuration,
            arch: config.arch,
        }
    }

    pub fn for_solution(&self, solution: &Path) -> Self {
        Self {
            solution_dir: solution.parent().map(Path::to_path_buf),
            ..self.clone()
        }
    }

    /// Id a referenced manifest would carry, resolving path case on disk
    pub(crate) fn reference_id(&self, from_dir: &Path, include: &str) -> String {
        let target = paths::normalize(&from_dir.join(paths::to_unix(include)));
        let resolved = paths::find_case_insensitive(&target).unwrap_or(target);
        project_id(&self.root, &resolved)
    }
}

/// Reads manifest text, tolerating BOMs and UTF-16
pub(crate) fn read_manifest_text(path: &Path) -> Result<String, ParseError> {
    let bytes = fs::read(path).map_err(|e| ParseError::new(path, e))?;
    let bytes = match crate::transform::normalize_encoding(&bytes) {
        Ok(Some(normalized)) => normalized,
        Ok(None) => bytes,
        Err(cause) => return Err(ParseError::new(path, cause)),
    };
    Ok(SourceText::from_bytes(&bytes).text)
}

/// Parses a single project manifest, dispatching on its extension
pub fn parse_manifest(
    path: &Path,
    ctx: &ManifestContext,
    discovery_index: usize,
) -> Result<ProjectDescriptor, ParseError> {
    match ProjectKind::from_manifest(path) {
        Some(ProjectKind::CppVcxproj) => parse_vcxproj(path, ctx, discovery_index),
        Some(ProjectKind::CSharpFramework) => parse_csproj(path, ctx, discovery_index),
        _ => Err(ParseError::new(path, "unsupported manifest type")),
    }
}

/// A solution's buildable projects plus the constituents that were skipped
#[derive(Debug, Clone)]
pub struct SolutionLoad {
    pub solution: SolutionFile,
    pub projects: Vec<ProjectDescriptor>,
    pub skipped: Vec<ParseError>,
}

/// Parses a solution and every project it lists
///
/// A constituent that fails to parse is skipped with a warning; only the
/// solution file itself failing is an error.
pub fn load_solution(sln_path: &Path, ctx: &ManifestContext) -> Result<SolutionLoad, ParseError> {
    let solution = parse_solution(sln_path)?;
    let ctx = ctx.for_solution(sln_path);

    let mut projects = Vec::new();
    let mut skipped = Vec::new();
    let mut guid_to_id: HashMap<String, String> = HashMap::new();
    let mut solution_deps: Vec<Vec<String>> = Vec::new();

    for entry in &solution.projects {
        if entry.project_type == SolutionProjectType::SolutionFolder {
            continue;
        }
        if ProjectKind::from_manifest(&entry.path)
            .map_or(true, |k| !matches!(k, ProjectKind::CppVcxproj | ProjectKind::CSharpFramework))
        {
            debug!(project = %entry.name, kind = ?entry.project_type, "Skipping unsupported solution entry");
            continue;
        }

        let Some(manifest) = paths::find_case_insensitive(&entry.path) else {
            let err = ParseError::new(&entry.path, "project file listed in solution does not exist");
            warn!(project = %entry.name, error = %err, "Skipping solution project");
            skipped.push(err);
            continue;
        };

        match parse_manifest(&manifest, &ctx, projects.len()) {
            Ok(descriptor) => {
                guid_to_id.insert(entry.guid.clone(), descriptor.id.clone());
                solution_deps.push(entry.dependencies.clone());
                projects.push(descriptor);
            }
            Err(err) => {
                warn!(project = %entry.name, error = %err, "Skipping unparseable solution project");
                skipped.push(err);
            }
        }
    }

    for (project, deps) in projects.iter_mut().zip(solution_deps) {
        for guid in deps {
            let id = guid_to_id
                .get(&guid)
                .cloned()
                .unwrap_or_else(|| format!("{{{}}}", guid));
            if id != project.id {
                project.explicit_deps.insert(id);
            }
        }
    }

    Ok(SolutionLoad {
        solution,
        projects,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_manifest() {
        assert_eq!(
            ProjectKind::from_manifest(Path::new("a/App.VCXPROJ")),
            Some(ProjectKind::CppVcxproj)
        );
        assert_eq!(
            ProjectKind::from_manifest(Path::new("CMakeLists.txt")),
            Some(ProjectKind::CMakeProject)
        );
        assert_eq!(
            ProjectKind::from_manifest(Path::new("GNUmakefile")),
            Some(ProjectKind::MakefileProject)
        );
        assert_eq!(ProjectKind::from_manifest(Path::new("readme.txt")), None);
    }

    #[test]
    fn test_project_id() {
        let root = Path::new("/repo");
        assert_eq!(project_id(root, Path::new("/repo/LibA/LibA.vcxproj")), "LibA/LibA.vcxproj");
        assert_eq!(project_id(root, Path::new("/repo/App/../LibA/x.csproj")), "LibA/x.csproj");
        assert_eq!(project_id(root, Path::new("/repo")), ".");
    }

    #[test]
    fn test_expected_outputs() {
        let mut d = ProjectDescriptor::directory_unit(
            Path::new("/repo"),
            Path::new("/repo/LibA"),
            Some(Path::new("/repo/LibA/LibA.vcxproj")),
            ProjectKind::CppVcxproj,
            0,
        );
        d.name = "LibA".to_string();
        d.settings.configuration_type = Some("DynamicLibrary".to_string());
        assert_eq!(d.expected_outputs(), vec!["LibA.dll", "LibA.lib"]);
    }

    #[test]
    fn test_load_solution_skips_broken_project() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("LibA")).unwrap();
        fs::create_dir_all(root.join("AppB")).unwrap();
        fs::create_dir_all(root.join("Broken")).unwrap();
        fs::write(
            root.join("LibA/LibA.vcxproj"),
            r#"<Project><PropertyGroup><ConfigurationType>DynamicLibrary</ConfigurationType></PropertyGroup></Project>"#,
        )
        .unwrap();
        fs::write(
            root.join("AppB/AppB.vcxproj"),
            r#"<Project><PropertyGroup><ConfigurationType>Application</ConfigurationType></PropertyGroup></Project>"#,
        )
        .unwrap();
        fs::write(root.join("Broken/Broken.vcxproj"), "<Project><unclosed></Project>").unwrap();
        fs::write(
            root.join("Demo.sln"),
            "Microsoft Visual Studio Solution File, Format Version 12.00\r\n\
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"LibA\", \"LibA\\LibA.vcxproj\", \"{11111111-1111-1111-1111-111111111111}\"\r\n\
EndProject\r\n\
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"AppB\", \"appb\\AppB.vcxproj\", \"{22222222-2222-2222-2222-222222222222}\"\r\n\
\tProjectSection(ProjectDependencies) = postProject\r\n\
\t\t{11111111-1111-1111-1111-111111111111} = {11111111-1111-1111-1111-111111111111}\r\n\
\tEndProjectSection\r\n\
EndProject\r\n\
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"Broken\", \"Broken\\Broken.vcxproj\", \"{33333333-3333-3333-3333-333333333333}\"\r\n\
EndProject\r\n",
        )
        .unwrap();

        let ctx = ManifestContext::new(root, &BuildConfig::builtin());
        let load = load_solution(&root.join("Demo.sln"), &ctx).unwrap();

        assert_eq!(load.projects.len(), 2);
        assert_eq!(load.skipped.len(), 1);
        let app = &load.projects[1];
        assert_eq!(app.id, "AppB/AppB.vcxproj");
        assert!(app.explicit_deps.contains("LibA/LibA.vcxproj"));
        assert!(load.projects[0].produces_library);
    }
}
