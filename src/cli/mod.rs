pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CliArgs, Commands, DetectArgs, TransformArgs};
pub use output::{OutputFormat, OutputFormatter};
