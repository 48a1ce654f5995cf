//! Visual Studio solution (`.sln`) parsing
//!
//! Only the project list, `ProjectDependencies` sections and solution
//! configurations are read. Constituent projects are not opened here.

use super::{read_manifest_text, ParseError};
use crate::util::paths;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Project type, from the type GUID in a `Project(...)` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolutionProjectType {
    Cpp,
    CSharp,
    CSharpSdk,
    VbNet,
    SolutionFolder,
    Wix,
    Website,
    Unknown,
}

impl SolutionProjectType {
    pub fn from_type_guid(guid: &str) -> Self {
        match guid.to_ascii_uppercase().as_str() {
            "8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942" => Self::Cpp,
            "FAE04EC0-301F-11D3-BF4B-00C04F79EFBC" => Self::CSharp,
            "9A19103F-16F7-4668-BE54-9A1E7A4F7556" => Self::CSharpSdk,
            "F184B08F-C81C-45F6-A57F-5ABD9991F28F" => Self::VbNet,
            "2150E333-8FDC-42A3-9474-1A3956D46DE8" => Self::SolutionFolder,
            "930C7802-8A8C-48F9-8165-68863BCCD9DD" => Self::Wix,
            "E24C65DC-7377-472B-9ABA-BC803B73C61A" => Self::Website,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionProject {
    pub name: String,
    /// Absolute path, joined onto the solution directory
    pub path: PathBuf,
    pub project_type: SolutionProjectType,
    /// Upper-case GUID without braces
    pub guid: String,
    /// GUIDs from `ProjectSection(ProjectDependencies)`
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionFile {
    pub path: PathBuf,
    pub projects: Vec<SolutionProject>,
    /// `(configuration, platform)` pairs
    pub configurations: Vec<(String, String)>,
}

fn project_block_regex() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| {
        Regex::new(
            r#"(?ms)^\s*Project\("\{([^}]+)\}"\)\s*=\s*"([^"]+)"\s*,\s*"([^"]+)"\s*,\s*"\{([^}]+)\}"(.*?)^\s*EndProject\s*$"#,
        )
        .expect("valid regex")
    })
}

fn section_regex() -> &'static Regex {
    static SECTION: OnceLock<Regex> = OnceLock::new();
    SECTION.get_or_init(|| {
        Regex::new(r"(?s)ProjectSection\(ProjectDependencies\)(.*?)EndProjectSection")
            .expect("valid regex")
    })
}

fn dependency_regex() -> &'static Regex {
    static DEPENDENCY: OnceLock<Regex> = OnceLock::new();
    DEPENDENCY.get_or_init(|| {
        Regex::new(r"\{([^}]+)\}\s*=\s*\{([^}]+)\}").expect("valid regex")
    })
}

fn configurations_regex() -> &'static Regex {
    static CONFIGS: OnceLock<Regex> = OnceLock::new();
    CONFIGS.get_or_init(|| {
        Regex::new(r"(?s)GlobalSection\(SolutionConfigurationPlatforms\)[^\n]*\n(.*?)EndGlobalSection")
            .expect("valid regex")
    })
}

const DEFAULT_CONFIGURATIONS: &[(&str, &str)] = &[
    ("Debug", "Win32"),
    ("Debug", "x64"),
    ("Release", "Win32"),
    ("Release", "x64"),
];

pub fn parse_solution(path: &Path) -> Result<SolutionFile, ParseError> {
    let text = read_manifest_text(path)?;
    let solution_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut projects = Vec::new();
    for caps in project_block_regex().captures_iter(&text) {
        let dependencies = section_regex()
            .captures(&caps[5])
            .map(|section| {
                dependency_regex()
                    .captures_iter(&section[1])
                    .map(|d| d[1].trim().to_ascii_uppercase())
                    .collect()
            })
            .unwrap_or_default();

        projects.push(SolutionProject {
            name: caps[2].to_string(),
            path: solution_dir.join(paths::to_unix(&caps[3])),
            project_type: SolutionProjectType::from_type_guid(&caps[1]),
            guid: caps[4].trim().to_ascii_uppercase(),
            dependencies,
        });
    }

    if projects.is_empty() && !text.contains("Microsoft Visual Studio Solution File") {
        return Err(ParseError::new(path, "not a Visual Studio solution file"));
    }

    let mut configurations: Vec<(String, String)> = Vec::new();
    if let Some(section) = configurations_regex().captures(&text) {
        for line in section[1].lines() {
            let Some((left, _)) = line.split_once('=') else {
                continue;
            };
            let Some((config, platform)) = left.trim().split_once('|') else {
                continue;
            };
            let pair = (config.trim().to_string(), platform.trim().to_string());
            if !configurations.contains(&pair) {
                configurations.push(pair);
            }
        }
    }
    if configurations.is_empty() {
        configurations = DEFAULT_CONFIGURATIONS
            .iter()
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect();
    }

    Ok(SolutionFile {
        path: path.to_path_buf(),
        projects,
        configurations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SOLUTION: &str = "\u{feff}
Microsoft Visual Studio Solution File, Format Version 12.00
# Visual Studio Version 17
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"Core\", \"src\\Core\\Core.vcxproj\", \"{aaaaaaaa-0000-0000-0000-000000000001}\"
EndProject
Project(\"{2150E333-8FDC-42A3-9474-1A3956D46DE8}\") = \"Tools\", \"Tools\", \"{AAAAAAAA-0000-0000-0000-000000000009}\"
EndProject
Project(\"{9A19103F-16F7-4668-BE54-9A1E7A4F7556}\") = \"Cli\", \"src\\Cli\\Cli.csproj\", \"{AAAAAAAA-0000-0000-0000-000000000002}\"
\tProjectSection(ProjectDependencies) = postProject
\t\t{AAAAAAAA-0000-0000-0000-000000000001} = {AAAAAAAA-0000-0000-0000-000000000001}
\tEndProjectSection
EndProject
Global
\tGlobalSection(SolutionConfigurationPlatforms) = preSolution
\t\tDebug|Any CPU = Debug|Any CPU
\t\tRelease|x64 = Release|x64
\tEndGlobalSection
EndGlobal
";

    #[test]
    fn test_parse_projects_and_dependencies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("All.sln");
        fs::write(&path, SOLUTION).unwrap();

        let sln = parse_solution(&path).unwrap();
        assert_eq!(sln.projects.len(), 3);

        let core = &sln.projects[0];
        assert_eq!(core.name, "Core");
        assert_eq!(core.project_type, SolutionProjectType::Cpp);
        assert_eq!(core.guid, "AAAAAAAA-0000-0000-0000-000000000001");
        assert_eq!(core.path, dir.path().join("src/Core/Core.vcxproj"));

        assert_eq!(sln.projects[1].project_type, SolutionProjectType::SolutionFolder);

        let cli = &sln.projects[2];
        assert_eq!(cli.project_type, SolutionProjectType::CSharpSdk);
        assert_eq!(cli.dependencies, vec!["AAAAAAAA-0000-0000-0000-000000000001"]);

        assert_eq!(
            sln.configurations,
            vec![
                ("Debug".to_string(), "Any CPU".to_string()),
                ("Release".to_string(), "x64".to_string())
            ]
        );
    }

    #[test]
    fn test_default_configurations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Empty.sln");
        fs::write(&path, "Microsoft Visual Studio Solution File, Format Version 12.00\n").unwrap();

        let sln = parse_solution(&path).unwrap();
        assert!(sln.projects.is_empty());
        assert_eq!(sln.configurations.len(), 4);
    }

    #[test]
    fn test_rejects_non_solution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.sln");
        fs::write(&path, "just some text").unwrap();
        assert!(parse_solution(&path).is_err());
    }
}
