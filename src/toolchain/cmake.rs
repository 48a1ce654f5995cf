//! CMake generation for Visual C++ projects built with MinGW
//!
//! The generated `CMakeLists.txt` lives in the project's scratch directory,
//! never in the checkout. Every path in it is absolute.

use super::{flags, libraries};
use crate::config::{Architecture, Configuration};
use crate::manifest::ProjectDescriptor;
use crate::util::paths;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Inputs beyond the descriptor itself
#[derive(Debug, Clone)]
pub struct CMakeInputs<'a> {
    pub configuration: Configuration,
    /// Where the target's binaries are placed
    pub output_dir: &'a Path,
    /// Import libraries of predecessor projects, from the artifact store
    pub linked_artifacts: &'a [PathBuf],
    /// Translation units the transform pipeline added to the project
    pub generated_sources: &'a [PathBuf],
}

/// CMake-safe target name
pub fn target_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+') { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "project".to_string()
    } else {
        sanitized
    }
}

/// Quoted CMake argument
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$"))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy().replace('\\', "/"))
}

/// Resolves a manifest-relative file against the (case-folded) tree
///
/// The pipeline lowercases basenames, so a reference that no longer exists
/// as written is looked up case-insensitively, then by its folded name.
pub fn resolve_source(project_dir: &Path, relative: &str) -> PathBuf {
    let joined = paths::normalize(&project_dir.join(paths::to_unix(relative)));
    if let Some(found) = paths::find_case_insensitive(&joined) {
        return found;
    }
    match (joined.parent(), joined.file_name()) {
        (Some(parent), Some(name)) => parent.join(name.to_string_lossy().to_lowercase()),
        _ => joined,
    }
}

fn resolve_include_dir(project_dir: &Path, dir: &str) -> PathBuf {
    let path = Path::new(dir);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        paths::normalize(&project_dir.join(dir))
    };
    paths::find_case_insensitive(&joined).unwrap_or(joined)
}

fn section(out: &mut String, command: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", command);
    for item in items {
        let _ = writeln!(out, "    {}", item);
    }
    out.push_str(")\n\n");
}

/// Renders the `CMakeLists.txt` for a vcxproj descriptor
pub fn generate_cmakelists(project: &ProjectDescriptor, inputs: &CMakeInputs) -> String {
    let settings = &project.settings;
    let target = target_name(&project.name);
    let dir = &project.path;
    let mut out = String::new();

    let _ = writeln!(out, "# Generated by wincross for {}", project.id);
    out.push_str("cmake_minimum_required(VERSION 3.10)\n");
    let _ = writeln!(out, "project({} C CXX)", target);
    out.push('\n');

    let standard = settings
        .cpp_standard
        .as_deref()
        .unwrap_or("c++14")
        .trim_start_matches("c++")
        .to_string();
    let _ = writeln!(out, "set(CMAKE_CXX_STANDARD {})", standard);
    out.push_str("set(CMAKE_CXX_STANDARD_REQUIRED ON)\n\n");

    let mut sources: Vec<String> = settings
        .sources
        .iter()
        .map(|s| quote_path(&resolve_source(dir, s)))
        .collect();
    // The glob below already picks up generated files
    if !sources.is_empty() {
        for generated in inputs.generated_sources {
            let quoted = quote_path(generated);
            if !sources.contains(&quoted) {
                sources.push(quoted);
            }
        }
    }
    let resources: Vec<String> = settings
        .resources
        .iter()
        .map(|r| quote_path(&resolve_source(dir, r)))
        .collect();

    if sources.is_empty() {
        let root = dir.to_string_lossy().replace('\\', "/");
        let _ = writeln!(
            out,
            "file(GLOB_RECURSE SOURCES {} {})",
            quote(&format!("{}/*.cpp", root)),
            quote(&format!("{}/*.c", root))
        );
    } else {
        section(&mut out, "set(SOURCES", &sources);
    }
    if !resources.is_empty() {
        out.push_str("enable_language(RC)\n");
        section(&mut out, "set(RESOURCES", &resources);
    }

    let _ = match settings.configuration_type.as_deref() {
        Some("DynamicLibrary") => writeln!(out, "add_library({} SHARED ${{SOURCES}} ${{RESOURCES}})", target),
        Some("StaticLibrary") => writeln!(out, "add_library({} STATIC ${{SOURCES}})", target),
        _ => writeln!(out, "add_executable({} ${{SOURCES}} ${{RESOURCES}})", target),
    };
    out.push('\n');

    let mut includes = vec![quote_path(dir)];
    for include in &settings.include_dirs {
        let resolved = quote_path(&resolve_include_dir(dir, include));
        if !includes.contains(&resolved) {
            includes.push(resolved);
        }
    }
    section(&mut out, &format!("target_include_directories({} PRIVATE", target), &includes);

    let definitions: Vec<String> = flags::filter_definitions(&settings.defines)
        .iter()
        .map(|d| quote(d))
        .collect();
    section(&mut out, &format!("target_compile_definitions({} PRIVATE", target), &definitions);

    let compile: Vec<String> = flags::compile_options(settings, inputs.configuration)
        .iter()
        .map(|o| quote(o))
        .collect();
    section(&mut out, &format!("target_compile_options({} PRIVATE", target), &compile);

    if settings.configuration_type.as_deref() != Some("StaticLibrary") {
        let link: Vec<String> = flags::link_options(settings).iter().map(|o| quote(o)).collect();
        section(&mut out, &format!("target_link_options({} PRIVATE", target), &link);
    }

    let mut libs: Vec<String> = inputs.linked_artifacts.iter().map(|p| quote_path(p)).collect();
    libs.extend(libraries::link_libraries(&settings.libraries));
    section(&mut out, &format!("target_link_libraries({} PRIVATE", target), &libs);

    let output = quote_path(inputs.output_dir);
    let properties = vec![
        format!("OUTPUT_NAME {}", quote(&project.name)),
        "PREFIX \"\"".to_string(),
        "IMPORT_PREFIX \"\"".to_string(),
        format!("RUNTIME_OUTPUT_DIRECTORY {}", output),
        format!("LIBRARY_OUTPUT_DIRECTORY {}", output),
        format!("ARCHIVE_OUTPUT_DIRECTORY {}", output),
    ];
    section(&mut out, &format!("set_target_properties({} PROPERTIES", target), &properties);

    out
}

/// CMake toolchain file targeting MinGW-w64 for `arch`
pub fn mingw_toolchain_file(arch: Architecture) -> String {
    let triple = arch.mingw_triple();
    format!(
        "# Generated by wincross\n\
set(CMAKE_SYSTEM_NAME Windows)\n\
set(CMAKE_SYSTEM_PROCESSOR {processor})\n\
set(CMAKE_C_COMPILER {triple}-gcc)\n\
set(CMAKE_CXX_COMPILER {triple}-g++)\n\
set(CMAKE_RC_COMPILER {triple}-windres)\n\
set(CMAKE_AR {triple}-ar)\n\
set(CMAKE_FIND_ROOT_PATH /usr/{triple})\n\
set(CMAKE_FIND_ROOT_PATH_MODE_PROGRAM NEVER)\n\
set(CMAKE_FIND_ROOT_PATH_MODE_LIBRARY ONLY)\n\
set(CMAKE_FIND_ROOT_PATH_MODE_INCLUDE ONLY)\n",
        processor = arch.cmake_processor(),
        triple = triple,
    )
}
