//! Visual C++ project (`.vcxproj`) parsing

use super::msbuild::Evaluator;
use super::{project_id, read_manifest_text, ConfigSettings, ManifestContext, ParseError, ProjectDescriptor, ProjectKind};
use crate::config::{Architecture, Configuration};
use regex::Regex;
use roxmltree::Document;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

/// Definitions every Windows build of a VS project sees
const IMPLICIT_DEFINES: &[&str] = &["WIN32", "_WINDOWS", "UNICODE", "_UNICODE"];

pub fn parse_vcxproj(
    path: &Path,
    ctx: &ManifestContext,
    discovery_index: usize,
) -> Result<ProjectDescriptor, ParseError> {
    let text = read_manifest_text(path)?;
    let doc = Document::parse(&text).map_err(|e| ParseError::new(path, e))?;
    if !doc.root_element().has_tag_name("Project") {
        return Err(ParseError::new(path, "root element is not <Project>"));
    }

    let project_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let solution_dir = ctx
        .solution_dir
        .clone()
        .or_else(|| project_dir.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| project_dir.to_path_buf());

    let name = first_text(&doc, "ProjectName")
        .or_else(|| first_text(&doc, "RootNamespace"))
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string());

    let configuration = ctx.configuration.to_string();
    let eval = Evaluator::new(&configuration, ctx.arch.msbuild_platform())
        .with_macro("ProjectDir", format!("{}/", project_dir.display()))
        .with_macro("SolutionDir", format!("{}/", solution_dir.display()))
        .with_macro("IntDir", "build/")
        .with_macro("OutDir", "build/")
        .with_macro("TargetName", name.clone())
        .with_macro("ProjectName", name.clone());

    let configuration_type = eval
        .property(&doc, "ConfigurationType")
        .unwrap_or_else(|| "Application".to_string());
    let produces_library = matches!(configuration_type.as_str(), "DynamicLibrary" | "StaticLibrary");

    let mut resources = eval.items(&doc, "ResourceCompile");
    resources.extend(
        eval.items(&doc, "None")
            .into_iter()
            .filter(|i| i.to_ascii_lowercase().ends_with(".rc")),
    );

    let settings = ConfigSettings {
        architecture: Some(ctx.arch.to_string()),
        configuration_type: Some(configuration_type),
        defines: definitions(&eval, &doc, ctx.configuration),
        include_dirs: eval
            .list(&doc, "AdditionalIncludeDirectories")
            .into_iter()
            .map(|d| crate::util::paths::to_unix(&d))
            .collect(),
        libraries: libraries(&eval, &doc),
        sources: eval.items(&doc, "ClCompile"),
        headers: eval.items(&doc, "ClInclude"),
        resources,
        additional_options: additional_options(&eval, &doc),
        runtime_library: Some(eval.property(&doc, "RuntimeLibrary").unwrap_or_else(|| {
            match ctx.configuration {
                Configuration::Release => "MultiThreadedDLL".to_string(),
                Configuration::Debug => "MultiThreadedDebugDLL".to_string(),
            }
        })),
        subsystem: Some(eval.property(&doc, "SubSystem").unwrap_or_else(|| "Console".to_string())),
        character_set: Some(
            eval.property(&doc, "CharacterSet")
                .unwrap_or_else(|| "Unicode".to_string()),
        ),
        cpp_standard: Some(cpp_standard(eval.property(&doc, "LanguageStandard").as_deref())),
        warning_level: Some(warning_level(eval.property(&doc, "WarningLevel").as_deref())),
        optimization: Some(optimization(
            eval.property(&doc, "Optimization").as_deref(),
            ctx.configuration,
        )),
        ..ConfigSettings::default()
    };

    let explicit_deps: BTreeSet<String> = eval
        .items(&doc, "ProjectReference")
        .iter()
        .map(|include| ctx.reference_id(project_dir, include))
        .collect();

    Ok(ProjectDescriptor {
        id: project_id(&ctx.root, path),
        name,
        kind: ProjectKind::CppVcxproj,
        path: project_dir.to_path_buf(),
        manifest: Some(path.to_path_buf()),
        settings,
        explicit_deps,
        produces_library,
        discovery_index,
    })
}

fn first_text(doc: &Document, tag: &str) -> Option<String> {
    doc.descendants()
        .filter(|n| n.has_tag_name(tag))
        .filter_map(|n| n.text())
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

fn definitions(eval: &Evaluator, doc: &Document, configuration: Configuration) -> Vec<String> {
    let mut defines: BTreeSet<String> = eval.list(doc, "PreprocessorDefinitions").into_iter().collect();
    let config_defines: &[&str] = match configuration {
        Configuration::Debug => &["_DEBUG", "DEBUG"],
        Configuration::Release => &["NDEBUG"],
    };
    for define in IMPLICIT_DEFINES.iter().chain(config_defines) {
        defines.insert(define.to_string());
    }
    defines.into_iter().collect()
}

fn libraries(eval: &Evaluator, doc: &Document) -> Vec<String> {
    static LIB_SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = LIB_SUFFIX.get_or_init(|| Regex::new(r"(?i)\.lib$").expect("valid regex"));

    let libs: BTreeSet<String> = eval
        .list(doc, "AdditionalDependencies")
        .iter()
        .map(|lib| re.replace(lib, "").to_string())
        .filter(|lib| !lib.is_empty())
        .collect();
    libs.into_iter().collect()
}

fn additional_options(eval: &Evaluator, doc: &Document) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r#"[^\s"]+|"[^"]*""#).expect("valid regex"));

    let mut options = Vec::new();
    for value in eval.list(doc, "AdditionalOptions") {
        for token in re.find_iter(&value) {
            let token = token.as_str();
            if !token.starts_with("%(") {
                options.push(token.to_string());
            }
        }
    }
    options
}

fn cpp_standard(value: Option<&str>) -> String {
    let value = value.unwrap_or_default().to_ascii_lowercase();
    if value.contains("20") || value.contains("latest") {
        "c++20".to_string()
    } else if value.contains("17") {
        "c++17".to_string()
    } else {
        "c++14".to_string()
    }
}

fn warning_level(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.chars().find(|c| c.is_ascii_digit()))
        .and_then(|c| c.to_digit(10))
        .map_or(3, |d| d as u8)
}

fn optimization(value: Option<&str>, configuration: Configuration) -> String {
    let value = value.unwrap_or_default().to_ascii_lowercase();
    if value.contains("disabled") {
        "-O0"
    } else if value.contains("full") {
        "-O3"
    } else if value.contains("minspace") {
        "-Os"
    } else if value.contains("maxspeed") {
        "-O2"
    } else if configuration == Configuration::Release {
        "-O2"
    } else {
        "-O0"
    }
    .to_string()
}

/// `Win32` in MSBuild terms is `x86` everywhere else
pub(crate) fn normalize_platform(platform: &str) -> Option<Architecture> {
    match platform.to_ascii_lowercase().as_str() {
        "win32" | "x86" => Some(Architecture::X86),
        "x64" | "amd64" => Some(Architecture::X64),
        _ => None,
    }
}
