//! MSVC compiler options translated to their GCC equivalents

use crate::config::Configuration;
use crate::manifest::ConfigSettings;

/// Direct one-to-one translations; an empty replacement means "drop"
const FLAG_TABLE: &[(&str, &str)] = &[
    ("/W0", "-w"),
    ("/W1", "-Wall"),
    ("/W2", "-Wall"),
    ("/W3", "-Wall"),
    ("/W4", "-Wall -Wextra"),
    ("/Wall", "-Wall -Wextra"),
    ("/WX", "-Werror"),
    ("/Od", "-O0"),
    ("/O1", "-O1"),
    ("/O2", "-O2"),
    ("/Ox", "-O3"),
    ("/GS-", ""),
    ("/GS", "-fstack-protector"),
    ("/Gy", "-ffunction-sections"),
    ("/GL", "-flto"),
    ("/MT", "-static"),
    ("/MTd", "-static"),
    ("/MD", ""),
    ("/MDd", ""),
    ("/EHsc", "-fexceptions"),
    ("/EHa", "-fexceptions"),
    ("/Zi", "-g"),
    ("/ZI", "-g"),
    ("/Z7", "-g"),
    ("/RTC1", ""),
    ("/fp:fast", "-ffast-math"),
    ("/fp:precise", ""),
    ("/fp:strict", "-frounding-math"),
    ("/Gd", ""),
    ("/Gr", "-mrtd"),
    ("/Gz", "-mstackrealign"),
    ("/permissive-", "-fpermissive"),
    ("/std:c++14", "-std=c++14"),
    ("/std:c++17", "-std=c++17"),
    ("/std:c++20", "-std=c++20"),
    ("/std:c++latest", "-std=c++20"),
    ("/utf-8", "-finput-charset=UTF-8"),
    ("/Zc:wchar_t", ""),
    ("/Zc:forScope", ""),
    ("/Zc:inline", ""),
];

/// Definitions that only make sense to MSVC or its libraries
pub const SKIPPED_DEFINITIONS: &[&str] = &[
    "_MBCS",
    "_AFXDLL",
    "_ATL_DLL",
    "VC_EXTRALEAN",
    "_CRT_SECURE_NO_WARNINGS",
    "_SCL_SECURE_NO_WARNINGS",
    "_CRT_NONSTDC_NO_DEPRECATE",
    "_CRT_SECURE_NO_DEPRECATE",
];

/// Always passed to MinGW for MSVC-oriented code
pub const BASE_COMPILE_OPTIONS: &[&str] = &[
    "-Wno-deprecated-declarations",
    "-Wno-write-strings",
    "-fno-strict-aliasing",
    "-fms-extensions",
    "-Wno-expansion-to-defined",
];

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Translates one option; `None` means it has no GCC equivalent
pub fn translate_flag(flag: &str) -> Option<Vec<String>> {
    let flag = flag.trim();
    if let Some((_, gcc)) = FLAG_TABLE.iter().find(|(msvc, _)| *msvc == flag) {
        return Some(gcc.split_whitespace().map(str::to_string).collect());
    }
    if let Some(define) = flag.strip_prefix("/D") {
        return Some(vec![format!("-D{}", strip_quotes(define))]);
    }
    if let Some(include) = flag.strip_prefix("/I") {
        return Some(vec![format!("-I{}", strip_quotes(include).replace('\\', "/"))]);
    }
    if flag.starts_with('/') {
        return None;
    }
    Some(vec![flag.to_string()])
}

/// Translates a token list, joining `/D X` and `/I dir` pairs
pub fn translate_flags(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        let token = token.as_str();
        let joined;
        let flag = if matches!(token, "/D" | "/I" | "-D" | "-I") {
            match iter.next() {
                Some(value) => {
                    joined = format!("{}{}", token, value);
                    joined.as_str()
                }
                None => continue,
            }
        } else {
            token
        };

        match translate_flag(flag) {
            Some(translated) => {
                for t in translated {
                    if !out.contains(&t) {
                        out.push(t);
                    }
                }
            }
            None => tracing::debug!(flag, "Dropping MSVC option without GCC equivalent"),
        }
    }
    out
}

pub fn filter_definitions(defines: &[String]) -> Vec<String> {
    defines
        .iter()
        .filter(|d| {
            let name = d.split('=').next().unwrap_or_default();
            !SKIPPED_DEFINITIONS.contains(&name)
        })
        .cloned()
        .collect()
}

fn warning_flags(level: Option<u8>) -> &'static [&'static str] {
    match level {
        Some(0) => &["-w"],
        Some(4) => &["-Wall", "-Wextra"],
        _ => &["-Wall"],
    }
}

/// Full compile option list for a native project
pub fn compile_options(settings: &ConfigSettings, configuration: Configuration) -> Vec<String> {
    let mut options = translate_flags(&settings.additional_options);
    let extra = BASE_COMPILE_OPTIONS
        .iter()
        .chain(warning_flags(settings.warning_level))
        .map(|s| s.to_string())
        .chain(settings.optimization.clone());

    for option in extra {
        if !options.contains(&option) {
            options.push(option);
        }
    }
    if settings.character_set.as_deref() == Some("Unicode") && !options.iter().any(|o| o == "-municode") {
        options.push("-municode".to_string());
    }
    if configuration == Configuration::Debug && !options.iter().any(|o| o == "-g") {
        options.push("-g".to_string());
    }
    options
}

/// Whether the runtime library setting asks for the static CRT
pub fn wants_static_runtime(settings: &ConfigSettings) -> bool {
    settings
        .runtime_library
        .as_deref()
        .map_or(false, |r| r.starts_with("MultiThreaded") && !r.contains("DLL"))
}

pub fn link_options(settings: &ConfigSettings) -> Vec<String> {
    let mut options = Vec::new();
    if settings.character_set.as_deref() == Some("Unicode") {
        options.push("-municode".to_string());
    }

    let subsystem = settings.subsystem.as_deref().unwrap_or("Console").to_lowercase();
    if subsystem.contains("windows") {
        options.push("-mwindows".to_string());
    } else {
        options.push("-mconsole".to_string());
    }

    if wants_static_runtime(settings) {
        options.extend(["-static", "-static-libgcc", "-static-libstdc++"].map(String::from));
    }
    options
}
