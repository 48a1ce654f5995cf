//! wincross - cross-compiles Windows source checkouts with an alternate toolchain
//!
//! Given a checkout written for MSVC and Visual Studio, wincross adapts the
//! source tree in place for MinGW, works out how the repository is meant to
//! be built, orders the projects by their dependencies and builds each one,
//! handing every project the binaries its predecessors produced.
//!
//! # Core Concepts
//!
//! - **Transformation**: Idempotent rewrite rules (encoding, filename case,
//!   compiler extensions, header stubs, COM interfaces) applied to the tree
//! - **Detection**: A fixed-priority cascade of build strategies, from
//!   solution files down to loose C/C++ sources
//! - **Build order**: A dependency graph over declared project references,
//!   resolved into a deterministic topological order
//! - **Execution**: One toolchain plan per project, with artifacts
//!   registered and fed to dependents
//!
//! # Example Usage
//!
//! ```no_run
//! use wincross::{BuildConfig, BuildExecutor};
//! use std::path::Path;
//!
//! # async fn run() {
//! let config = BuildConfig::from_env().expect("valid configuration");
//! let summary = BuildExecutor::new(config).run(Path::new("./checkout")).await;
//!
//! for result in &summary.results {
//!     println!("{}: {}", result.project, result.status);
//! }
//! std::process::exit(summary.exit_code());
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`transform`]: Source transformation pipeline and rules
//! - [`detection`]: Build strategy detection cascade
//! - [`manifest`]: Solution and project file parsers
//! - [`graph`]: Dependency graph and build-order resolution
//! - [`toolchain`]: Per-kind build plans and the command runner
//! - [`executor`]: Run orchestration and result records
//! - [`artifacts`]: Artifact store and resource patching

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod detection;
pub mod diagnostics;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod progress;
pub mod toolchain;
pub mod transform;
pub mod util;

pub use artifacts::{Artifact, ArtifactStore};
pub use config::{Architecture, BuildConfig, ConfigError, Configuration, FailurePolicy};
pub use detection::Strategy;
pub use executor::{BuildError, BuildExecutor, BuildResult, BuildStatus, DetectionReport, RunSummary};
pub use manifest::{ProjectDescriptor, ProjectKind};
pub use transform::{Pipeline, TransformReport};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
