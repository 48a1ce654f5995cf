use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cross-compiles Windows source checkouts with MinGW, CMake, Make and dotnet
#[derive(Parser, Debug)]
#[command(
    name = "wincross",
    about = "Cross-compiles Windows source checkouts with MinGW, CMake, Make and dotnet",
    version,
    author,
    long_about = "wincross adapts an MSVC-oriented source tree for an alternate toolchain, \
                  detects how the checkout is meant to be built (solution, project files, \
                  CMake, Makefile or loose sources), resolves the build order and builds \
                  every project, feeding each one the binaries its dependencies produced."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Transform, detect and build a repository checkout",
        long_about = "Runs the full pipeline: source transformation, detection cascade, \
                      build-order resolution and one toolchain invocation per project.\n\n\
                      Examples:\n  \
                      wincross build\n  \
                      wincross build /path/to/repo --arch x86 --configuration Debug\n  \
                      wincross build --jobs 4 --extra-flags \"-DNO_ATL -O1\""
    )]
    Build(BuildArgs),

    #[command(
        about = "Show the selected strategy and build order without building",
        long_about = "Runs the detection cascade and resolves the build order. The source \
                      tree is not modified.\n\n\
                      Examples:\n  \
                      wincross detect\n  \
                      wincross detect /path/to/repo --format json"
    )]
    Detect(DetectArgs),

    #[command(
        about = "Run only the source transformation pipeline",
        long_about = "Applies every transformation rule to the tree in place and prints \
                      which files each rule changed. Running it twice is a no-op.\n\n\
                      Examples:\n  \
                      wincross transform /path/to/repo"
    )]
    Transform(TransformArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PATH", help = "Path to repository (defaults to current directory)")]
    pub repository_path: Option<PathBuf>,

    #[arg(long, value_name = "ARCH", help = "Target architecture: x64 or x86")]
    pub arch: Option<String>,

    #[arg(
        short = 'c',
        long,
        value_name = "CONFIGURATION",
        help = "Build configuration: Release or Debug"
    )]
    pub configuration: Option<String>,

    #[arg(
        long = "ref",
        value_name = "REF",
        help = "Git reference the checkout was taken from (recorded in diagnostics)"
    )]
    pub git_ref: Option<String>,

    #[arg(
        long,
        value_name = "FLAGS",
        allow_hyphen_values = true,
        help = "Extra compiler flags, passed through verbatim"
    )]
    pub extra_flags: Option<String>,

    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        help = "Output root (defaults to <repo>/wincross-out)"
    )]
    pub output: Option<PathBuf>,

    #[arg(short = 'j', long, value_name = "N", help = "Projects built in parallel")]
    pub jobs: Option<usize>,

    #[arg(long, help = "Skip every remaining project after the first failure")]
    pub stop_on_failure: bool,

    #[arg(long, value_name = "SECONDS", help = "Per-step timeout")]
    pub timeout: Option<u64>,

    #[arg(long, value_enum, default_value = "human", help = "Summary format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[arg(value_name = "PATH", help = "Path to repository (defaults to current directory)")]
    pub repository_path: Option<PathBuf>,

    #[arg(long, value_name = "ARCH", help = "Architecture used to evaluate manifest conditions")]
    pub arch: Option<String>,

    #[arg(
        short = 'c',
        long,
        value_name = "CONFIGURATION",
        help = "Configuration used to evaluate manifest conditions"
    )]
    pub configuration: Option<String>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct TransformArgs {
    #[arg(value_name = "PATH", help = "Path to repository (defaults to current directory)")]
    pub repository_path: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
