//! C# project (`.csproj`) parsing, SDK-style and classic

use super::msbuild::{split_list, Evaluator};
use super::vcxproj::normalize_platform;
use super::{project_id, read_manifest_text, ConfigSettings, ManifestContext, ParseError, ProjectDescriptor, ProjectKind};
use roxmltree::Document;
use std::collections::BTreeSet;
use std::path::Path;

/// Managed projects are evaluated against the neutral platform
const MANAGED_PLATFORM: &str = "AnyCPU";

pub fn parse_csproj(
    path: &Path,
    ctx: &ManifestContext,
    discovery_index: usize,
) -> Result<ProjectDescriptor, ParseError> {
    let text = read_manifest_text(path)?;
    let doc = Document::parse(&text).map_err(|e| ParseError::new(path, e))?;
    let root = doc.root_element();
    if !root.has_tag_name("Project") {
        return Err(ParseError::new(path, "root element is not <Project>"));
    }

    let kind = if root.attribute("Sdk").is_some() || doc.descendants().any(|n| n.has_tag_name("Sdk")) {
        ProjectKind::CSharpModern
    } else {
        ProjectKind::CSharpFramework
    };

    let project_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());

    let configuration = ctx.configuration.to_string();
    let eval = Evaluator::new(&configuration, MANAGED_PLATFORM)
        .with_macro("MSBuildProjectName", stem.clone())
        .with_macro("ProjectDir", format!("{}/", project_dir.display()));

    let target_framework = eval
        .property(&doc, "TargetFramework")
        .or_else(|| {
            eval.property(&doc, "TargetFrameworks")
                .and_then(|list| split_list(&list).into_iter().next())
        })
        .or_else(|| eval.property(&doc, "TargetFrameworkVersion"));

    let output_type = eval.property(&doc, "OutputType").unwrap_or_else(|| match kind {
        ProjectKind::CSharpModern => "Exe".to_string(),
        _ => "Library".to_string(),
    });
    let produces_library = output_type.eq_ignore_ascii_case("Library");

    let architecture = eval
        .property(&doc, "PlatformTarget")
        .and_then(|p| normalize_platform(&p))
        .unwrap_or(ctx.arch);

    let defines: Vec<String> = eval
        .property(&doc, "DefineConstants")
        .map(|d| split_list(&d))
        .unwrap_or_default();

    let assembly_name = eval.property(&doc, "AssemblyName");

    let settings = ConfigSettings {
        architecture: Some(architecture.to_string()),
        target_framework,
        output_type: Some(output_type),
        assembly_name: assembly_name.clone(),
        defines,
        sources: eval.items(&doc, "Compile"),
        ..ConfigSettings::default()
    };

    let explicit_deps: BTreeSet<String> = eval
        .items(&doc, "ProjectReference")
        .iter()
        .map(|include| ctx.reference_id(project_dir, include))
        .collect();

    Ok(ProjectDescriptor {
        id: project_id(&ctx.root, path),
        name: stem,
        kind,
        path: project_dir.to_path_buf(),
        manifest: Some(path.to_path_buf()),
        settings,
        explicit_deps,
        produces_library,
        discovery_index,
    })
}
