//! Command handlers; each returns the process exit code

use super::commands::{BuildArgs, DetectArgs, TransformArgs};
use super::output::OutputFormatter;
use crate::config::{split_flags, BuildConfig, ConfigError, FailurePolicy};
use crate::diagnostics;
use crate::executor::{BuildError, BuildExecutor};
use crate::progress::LoggingHandler;
use crate::transform::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_ARGUMENTS: i32 = 2;

fn repository_path(path: &Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("."));
    if !path.is_dir() {
        return Err(ConfigError::InvalidArgument {
            field: "path",
            value: path.display().to_string(),
            expected: "an existing directory",
        });
    }
    Ok(path)
}

/// Environment config with command-line overrides applied, then validated
pub fn build_config(args: &BuildArgs) -> Result<BuildConfig, ConfigError> {
    let mut config = BuildConfig::from_env()?;
    if let Some(arch) = &args.arch {
        config.arch = arch.parse()?;
    }
    if let Some(configuration) = &args.configuration {
        config.configuration = configuration.parse()?;
    }
    if let Some(git_ref) = &args.git_ref {
        config.git_ref = Some(git_ref.clone());
    }
    if let Some(flags) = &args.extra_flags {
        config.extra_flags = split_flags(flags);
    }
    if let Some(output) = &args.output {
        config.output_dir = Some(output.clone());
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if args.stop_on_failure {
        config.failure_policy = FailurePolicy::StopOnFirstFailure;
    }
    if let Some(timeout) = args.timeout {
        config.step_timeout_secs = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn detect_config(args: &DetectArgs) -> Result<BuildConfig, ConfigError> {
    let mut config = BuildConfig::from_env()?;
    if let Some(arch) = &args.arch {
        config.arch = arch.parse()?;
    }
    if let Some(configuration) = &args.configuration {
        config.configuration = configuration.parse()?;
    }
    config.validate()?;
    Ok(config)
}

fn print_output(output: anyhow::Result<String>, quiet: bool) {
    match output {
        Ok(text) if !quiet => println!("{}", text),
        Ok(_) => {}
        Err(err) => error!("Failed to format output: {:#}", err),
    }
}

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    let (repo, config) = match repository_path(&args.repository_path).and_then(|repo| Ok((repo, build_config(args)?))) {
        Ok(valid) => valid,
        Err(err) => {
            eprintln!("Error: {}", err);
            return EXIT_INVALID_ARGUMENTS;
        }
    };
    debug!(?config, "Build configuration");

    let arch = config.arch;
    let executor = BuildExecutor::new(config).with_progress(Arc::new(LoggingHandler));

    let cancel = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let summary = executor.run(&repo).await;
    match diagnostics::finalize(&summary, arch).await {
        Ok(written) => debug!(files = written.len(), "Run records written"),
        Err(err) => error!("Failed to write run records: {:#}", err),
    }

    let formatter = OutputFormatter::new(args.format.into());
    print_output(formatter.format_summary(&summary), quiet);

    summary.exit_code()
}

pub async fn handle_detect(args: &DetectArgs, quiet: bool) -> i32 {
    let (repo, config) = match repository_path(&args.repository_path).and_then(|repo| Ok((repo, detect_config(args)?))) {
        Ok(valid) => valid,
        Err(err) => {
            eprintln!("Error: {}", err);
            return EXIT_INVALID_ARGUMENTS;
        }
    };

    let executor = BuildExecutor::new(config);
    match executor.detect(&repo) {
        Ok(report) => {
            info!(strategy = %report.strategy, projects = report.build_order.len(), "Detection complete");
            let formatter = OutputFormatter::new(args.format.into());
            print_output(formatter.format_detection(&report), quiet);
            EXIT_SUCCESS
        }
        Err(err) => {
            report_fatal(&err);
            EXIT_FAILURE
        }
    }
}

pub async fn handle_transform(args: &TransformArgs, quiet: bool) -> i32 {
    let repo = match repository_path(&args.repository_path) {
        Ok(repo) => repo,
        Err(err) => {
            eprintln!("Error: {}", err);
            return EXIT_INVALID_ARGUMENTS;
        }
    };
    let config = BuildConfig::default();
    let root = std::fs::canonicalize(&repo).unwrap_or(repo);

    let report = Pipeline::new().exclude(config.output_root(&root)).run(&root);
    let formatter = OutputFormatter::new(args.format.into());
    print_output(formatter.format_transform(&report, &root), quiet);
    EXIT_SUCCESS
}

fn report_fatal(err: &BuildError) {
    error!(kind = err.kind(), "{}", err);
    eprintln!("Error: {}", err);
}
