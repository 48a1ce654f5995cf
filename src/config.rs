//! Configuration management for wincross
//!
//! Settings are loaded from environment variables with sensible defaults and
//! can then be overridden field by field (the CLI does this). Everything is
//! validated up front: an invalid value is a pre-flight error and nothing has
//! been touched on disk when it is reported.
//!
//! # Environment Variables
//!
//! - `WINCROSS_ARCH`: Target architecture (x64|x86) - default: "x64"
//! - `WINCROSS_CONFIGURATION`: Build configuration (Release|Debug) - default: "Release"
//! - `WINCROSS_GIT_REF`: Git reference the checkout was taken from - optional
//! - `WINCROSS_EXTRA_FLAGS`: Extra compiler flags, passed through verbatim - optional
//! - `WINCROSS_OUTPUT_DIR`: Output root - default: "<repo>/wincross-out"
//! - `WINCROSS_JOBS`: Parallel project builds - default: "1"
//! - `WINCROSS_STOP_ON_FAILURE`: Abort on first failed project (true|false) - default: "false"
//! - `WINCROSS_TIMEOUT`: Per-step timeout in seconds - default: "3600"
//! - `WINCROSS_LOG_TAIL_LINES`: Lines of tool output kept per project - default: "200"
//!
//! # Example
//!
//! ```no_run
//! use wincross::BuildConfig;
//!
//! let mut config = BuildConfig::default();
//! config.jobs = 4;
//! config.validate().expect("Invalid configuration");
//! ```

use serde::Serialize;
use std::env;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_JOBS: usize = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_LOG_TAIL_LINES: usize = 200;
const DEFAULT_OUTPUT_DIR_NAME: &str = "wincross-out";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value outside the accepted set
    #[error("Invalid argument {field}: {value} ({expected})")]
    InvalidArgument {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Target CPU architecture of the produced Windows binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Architecture {
    #[serde(rename = "x64")]
    X64,
    #[serde(rename = "x86")]
    X86,
}

impl Architecture {
    /// MinGW-w64 target triple prefix, e.g. `x86_64-w64-mingw32`
    pub fn mingw_triple(&self) -> &'static str {
        match self {
            Architecture::X64 => "x86_64-w64-mingw32",
            Architecture::X86 => "i686-w64-mingw32",
        }
    }

    /// .NET runtime identifier
    pub fn dotnet_rid(&self) -> &'static str {
        match self {
            Architecture::X64 => "win-x64",
            Architecture::X86 => "win-x86",
        }
    }

    /// Platform name used by MSBuild for native projects
    pub fn msbuild_platform(&self) -> &'static str {
        match self {
            Architecture::X64 => "x64",
            Architecture::X86 => "Win32",
        }
    }

    pub fn cmake_processor(&self) -> &'static str {
        match self {
            Architecture::X64 => "x86_64",
            Architecture::X86 => "i686",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X64 => write!(f, "x64"),
            Architecture::X86 => write!(f, "x86"),
        }
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x64" => Ok(Architecture::X64),
            "x86" => Ok(Architecture::X86),
            _ => Err(ConfigError::InvalidArgument {
                field: "arch",
                value: s.to_string(),
                expected: "x64 or x86",
            }),
        }
    }
}

/// Build configuration passed to every toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Configuration {
    Release,
    Debug,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configuration::Release => write!(f, "Release"),
            Configuration::Debug => write!(f, "Debug"),
        }
    }
}

impl FromStr for Configuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "release" => Ok(Configuration::Release),
            "debug" => Ok(Configuration::Debug),
            _ => Err(ConfigError::InvalidArgument {
                field: "configuration",
                value: s.to_string(),
                expected: "Release or Debug",
            }),
        }
    }
}

/// What happens to the rest of the run when a project fails to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum FailurePolicy {
    /// Keep building projects whose predecessors all succeeded; dependents of
    /// a failed project are skipped.
    #[default]
    ContinueIndependent,
    /// Skip every project that has not started yet.
    StopOnFirstFailure,
}

/// Main configuration structure for a build run
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub arch: Architecture,
    pub configuration: Configuration,
    pub git_ref: Option<String>,
    /// Passed through verbatim to every toolchain
    pub extra_flags: Vec<String>,
    /// Output root; `None` means `<repo>/wincross-out`
    pub output_dir: Option<PathBuf>,
    pub jobs: usize,
    pub failure_policy: FailurePolicy,
    pub step_timeout_secs: u64,
    pub log_tail_lines: usize,
}

impl Default for BuildConfig {
    /// Loads configuration from `WINCROSS_*` environment variables.
    ///
    /// Values that fail to parse fall back to their defaults here; use
    /// [`BuildConfig::from_env`] to surface them as errors instead.
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|_| Self::builtin())
    }
}

impl BuildConfig {
    /// Built-in defaults, ignoring the environment
    pub fn builtin() -> Self {
        Self {
            arch: Architecture::X64,
            configuration: Configuration::Release,
            git_ref: None,
            extra_flags: Vec::new(),
            output_dir: None,
            jobs: DEFAULT_JOBS,
            failure_policy: FailurePolicy::ContinueIndependent,
            step_timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }

    /// Loads configuration from the environment, rejecting unparseable values
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::builtin();

        if let Ok(arch) = env::var("WINCROSS_ARCH") {
            config.arch = arch.parse()?;
        }
        if let Ok(configuration) = env::var("WINCROSS_CONFIGURATION") {
            config.configuration = configuration.parse()?;
        }
        config.git_ref = env::var("WINCROSS_GIT_REF").ok().filter(|r| !r.is_empty());
        if let Ok(flags) = env::var("WINCROSS_EXTRA_FLAGS") {
            config.extra_flags = split_flags(&flags);
        }
        config.output_dir = env::var("WINCROSS_OUTPUT_DIR").ok().map(PathBuf::from);

        if let Ok(jobs) = env::var("WINCROSS_JOBS") {
            config.jobs = parse_number("jobs", &jobs)?;
        }
        if let Ok(stop) = env::var("WINCROSS_STOP_ON_FAILURE") {
            let stop = stop.parse::<bool>().map_err(|_| ConfigError::InvalidArgument {
                field: "stop-on-failure",
                value: stop.clone(),
                expected: "true or false",
            })?;
            if stop {
                config.failure_policy = FailurePolicy::StopOnFirstFailure;
            }
        }
        if let Ok(timeout) = env::var("WINCROSS_TIMEOUT") {
            config.step_timeout_secs = parse_number("timeout", &timeout)?;
        }
        if let Ok(lines) = env::var("WINCROSS_LOG_TAIL_LINES") {
            config.log_tail_lines = parse_number("log-tail-lines", &lines)?;
        }

        Ok(config)
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 || self.jobs > 64 {
            return Err(ConfigError::InvalidArgument {
                field: "jobs",
                value: self.jobs.to_string(),
                expected: "between 1 and 64",
            });
        }

        if self.step_timeout_secs == 0 || self.step_timeout_secs > 86_400 {
            return Err(ConfigError::InvalidArgument {
                field: "timeout",
                value: self.step_timeout_secs.to_string(),
                expected: "between 1 and 86400 seconds",
            });
        }

        if !(10..=10_000).contains(&self.log_tail_lines) {
            return Err(ConfigError::InvalidArgument {
                field: "log-tail-lines",
                value: self.log_tail_lines.to_string(),
                expected: "between 10 and 10000",
            });
        }

        if let Some(git_ref) = &self.git_ref {
            if git_ref.trim().is_empty() || git_ref.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidArgument {
                    field: "ref",
                    value: git_ref.clone(),
                    expected: "a non-empty git reference without whitespace",
                });
            }
        }

        if let Some(dir) = &self.output_dir {
            if dir
                .components()
                .any(|c| matches!(c, Component::Normal(name) if name == ".git"))
            {
                return Err(ConfigError::ValidationFailed(format!(
                    "Output directory must not live inside .git: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Output root for a given repository checkout
    pub fn output_root(&self, repo: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| repo.join(DEFAULT_OUTPUT_DIR_NAME))
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

/// Splits a flag string on whitespace, keeping double-quoted runs together
pub fn split_flags(input: &str) -> Vec<String> {
    let mut flags = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    flags.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        flags.push(current);
    }

    flags
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidArgument {
            field,
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "WINCROSS_ARCH",
            "WINCROSS_CONFIGURATION",
            "WINCROSS_GIT_REF",
            "WINCROSS_EXTRA_FLAGS",
            "WINCROSS_OUTPUT_DIR",
            "WINCROSS_JOBS",
            "WINCROSS_STOP_ON_FAILURE",
            "WINCROSS_TIMEOUT",
            "WINCROSS_LOG_TAIL_LINES",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = BuildConfig::default();
        assert_eq!(config.arch, Architecture::X64);
        assert_eq!(config.configuration, Configuration::Release);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueIndependent);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        env::set_var("WINCROSS_ARCH", "X86");
        env::set_var("WINCROSS_CONFIGURATION", "debug");
        env::set_var("WINCROSS_EXTRA_FLAGS", "-DFOO=1 -fpermissive");
        env::set_var("WINCROSS_STOP_ON_FAILURE", "true");
        env::set_var("WINCROSS_JOBS", "4");

        let config = BuildConfig::from_env().unwrap();
        assert_eq!(config.arch, Architecture::X86);
        assert_eq!(config.configuration, Configuration::Debug);
        assert_eq!(config.extra_flags, vec!["-DFOO=1", "-fpermissive"]);
        assert_eq!(config.failure_policy, FailurePolicy::StopOnFirstFailure);
        assert_eq!(config.jobs, 4);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_arch_from_env() {
        clear_env();
        env::set_var("WINCROSS_ARCH", "arm64");
        let err = BuildConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgument { field: "arch", .. }));
        clear_env();
    }

    #[test]
    fn test_architecture_parsing() {
        assert_eq!("x64".parse::<Architecture>().unwrap(), Architecture::X64);
        assert_eq!(" X86 ".parse::<Architecture>().unwrap(), Architecture::X86);
        assert!("amd64".parse::<Architecture>().is_err());
        assert_eq!(Architecture::X86.mingw_triple(), "i686-w64-mingw32");
        assert_eq!(Architecture::X86.msbuild_platform(), "Win32");
    }

    #[test]
    fn test_configuration_parsing() {
        assert_eq!(
            "RELEASE".parse::<Configuration>().unwrap(),
            Configuration::Release
        );
        assert!("RelWithDebInfo".parse::<Configuration>().is_err());
    }

    #[test]
    fn test_validate_jobs_range() {
        let mut config = BuildConfig::builtin();
        config.jobs = 0;
        assert!(config.validate().is_err());
        config.jobs = 65;
        assert!(config.validate().is_err());
        config.jobs = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout() {
        let mut config = BuildConfig::builtin();
        config.step_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_git_ref() {
        let mut config = BuildConfig::builtin();
        config.git_ref = Some("feature branch".to_string());
        assert!(config.validate().is_err());
        config.git_ref = Some("v1.2.3".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_output_inside_git() {
        let mut config = BuildConfig::builtin();
        config.output_dir = Some(PathBuf::from("/repo/.git/out"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_output_root_default() {
        let config = BuildConfig::builtin();
        assert_eq!(
            config.output_root(Path::new("/src/repo")),
            PathBuf::from("/src/repo/wincross-out")
        );
    }

    #[test]
    fn test_split_flags_quotes() {
        assert_eq!(
            split_flags(r#"-DNAME="a b" -O2"#),
            vec![r#"-DNAME="a b""#.to_string(), "-O2".to_string()]
        );
        assert!(split_flags("   ").is_empty());
    }
}
