//! Path helpers

use std::path::{Component, Path, PathBuf};

/// C and C++ translation units
pub const C_SOURCE_EXTENSIONS: &[&str] = &["c"];
pub const CPP_SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++"];
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl"];
pub const RESOURCE_EXTENSIONS: &[&str] = &["rc", "rc2"];

/// Lowercased extension of a path, if any
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn has_extension(path: &Path, set: &[&str]) -> bool {
    extension(path).map_or(false, |ext| set.contains(&ext.as_str()))
}

pub fn is_c_source(path: &Path) -> bool {
    has_extension(path, C_SOURCE_EXTENSIONS)
}

pub fn is_cpp_source(path: &Path) -> bool {
    has_extension(path, CPP_SOURCE_EXTENSIONS)
}

pub fn is_header(path: &Path) -> bool {
    has_extension(path, HEADER_EXTENSIONS)
}

pub fn is_resource_script(path: &Path) -> bool {
    has_extension(path, RESOURCE_EXTENSIONS)
}

/// Sources, headers and resource scripts: everything a C/C++ build reads
pub fn is_native_code(path: &Path) -> bool {
    is_c_source(path) || is_cpp_source(path) || is_header(path) || is_resource_script(path)
}

/// Files whose text encoding matters to the alternate toolchain
pub fn is_source_like(path: &Path) -> bool {
    is_native_code(path) || has_extension(path, &["idl", "def", "cs", "odl"])
}

/// Converts Windows separators to forward slashes
pub fn to_unix(path: &str) -> String {
    path.replace('\\', "/")
}

/// Path of `target` relative to the directory `from_dir`, using `/`
///
/// Both paths are expected to be absolute (or both relative to the same
/// base) and free of `..` components.
pub fn relative_path(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Display form of `path` relative to `root`, falling back to the full path
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Lexically resolves `.` and `..` components without touching the disk
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Resolves `path` against the filesystem ignoring ASCII case, component by
/// component, for references written on a case-insensitive host
pub fn find_case_insensitive(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }

    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                if candidate.exists() {
                    resolved = candidate;
                    continue;
                }
                let wanted = name.to_string_lossy();
                let dir = if resolved.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    resolved.as_path()
                };
                let found = std::fs::read_dir(dir)
                    .ok()?
                    .filter_map(Result::ok)
                    .map(|e| e.file_name())
                    .find(|n| n.to_string_lossy().eq_ignore_ascii_case(&wanted))?;
                resolved.push(found);
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    Some(resolved)
}
