//! Utility modules for wincross
//!
//! - Structured logging setup and configuration
//! - Path helpers shared by the transformation rules and toolchains

pub mod logging;
pub mod paths;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
