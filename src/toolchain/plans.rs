//! Per-kind build plans

use super::cmake::{self, CMakeInputs};
use super::{flags, libraries, Step};
use crate::artifacts::is_binary_output;
use crate::config::{BuildConfig, Configuration};
use crate::manifest::{ProjectDescriptor, ProjectKind};
use crate::transform::{generated_iid_tables, EXCLUDED_DIRS};
use crate::util::paths;
use ignore::WalkBuilder;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing::debug;

/// Everything a plan needs besides the descriptor
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    pub config: &'a BuildConfig,
    /// `<output root>/<project>`: where binaries end up
    pub output_dir: PathBuf,
    /// Per-project work directory for generated files and objects
    pub scratch_dir: PathBuf,
    /// MinGW CMake toolchain file for the configured architecture
    pub toolchain_file: PathBuf,
    /// Import libraries of predecessor projects
    pub linked_artifacts: Vec<PathBuf>,
    /// Directories never scanned when collecting outputs
    pub excluded: Vec<PathBuf>,
}

/// How produced binaries are found once the steps succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collect {
    /// The tool wrote straight into the output directory
    OutputDir,
    /// The tool built in place; binaries newer than the build start are copied
    NewerThanStart { dir: PathBuf, excluded: Vec<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub steps: Vec<Step>,
    pub output_dir: PathBuf,
    pub collect: Collect,
}

impl BuildPlan {
    fn into_output_dir(steps: Vec<Step>, ctx: &PlanContext) -> Self {
        Self {
            steps,
            output_dir: ctx.output_dir.clone(),
            collect: Collect::OutputDir,
        }
    }
}

fn tool(ctx: &PlanContext, name: &str) -> String {
    format!("{}-{}", ctx.config.arch.mingw_triple(), name)
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn manifest_path(project: &ProjectDescriptor) -> io::Result<&Path> {
    project.manifest.as_deref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("project {} has no manifest", project.id),
        )
    })
}

/// Builds the step list for one project, writing any generated files
pub fn plan_for(project: &ProjectDescriptor, ctx: &PlanContext) -> io::Result<BuildPlan> {
    fs::create_dir_all(&ctx.output_dir)?;
    fs::create_dir_all(&ctx.scratch_dir)?;

    let plan = match project.kind {
        ProjectKind::CSharpModern => dotnet_plan(project, ctx)?,
        ProjectKind::CSharpFramework => msbuild_plan(project, ctx)?,
        ProjectKind::CppVcxproj => vcxproj_plan(project, ctx)?,
        ProjectKind::CMakeProject => cmake_project_plan(&project.path, ctx),
        ProjectKind::MakefileProject => make_plan(project, ctx),
        ProjectKind::StandaloneSources => standalone_plan(project, ctx)?,
    };

    debug!(project = %project.id, kind = %project.kind, steps = plan.steps.len(), "Planned build");
    Ok(plan)
}

fn dotnet_plan(project: &ProjectDescriptor, ctx: &PlanContext) -> io::Result<BuildPlan> {
    let manifest = display(manifest_path(project)?);
    let rid = ctx.config.arch.dotnet_rid();

    let restore = Step::new("restore", "dotnet").args(["restore", manifest.as_str(), "-r", rid]);
    let build = Step::new("build", "dotnet")
        .args([
            "build".to_string(),
            manifest.clone(),
            "--no-restore".to_string(),
            "-c".to_string(),
            ctx.config.configuration.to_string(),
            "-r".to_string(),
            rid.to_string(),
            "-o".to_string(),
            display(&ctx.output_dir),
        ])
        .args(ctx.config.extra_flags.iter().cloned());

    Ok(BuildPlan::into_output_dir(vec![restore, build], ctx))
}

fn msbuild_plan(project: &ProjectDescriptor, ctx: &PlanContext) -> io::Result<BuildPlan> {
    let manifest = display(manifest_path(project)?);

    let restore = Step::new("restore", "msbuild").args([manifest.as_str(), "-t:Restore"]);
    let build = Step::new("build", "msbuild")
        .args([
            manifest.clone(),
            format!("-p:Configuration={}", ctx.config.configuration),
            format!("-p:Platform={}", ctx.config.arch),
            format!("-p:OutDir={}/", display(&ctx.output_dir)),
        ])
        .args(ctx.config.extra_flags.iter().cloned());

    Ok(BuildPlan::into_output_dir(vec![restore, build], ctx))
}

fn vcxproj_plan(project: &ProjectDescriptor, ctx: &PlanContext) -> io::Result<BuildPlan> {
    let generated = ctx.scratch_dir.join("cmake");
    fs::create_dir_all(&generated)?;
    let tables = generated_iid_tables(&project.path, &ctx.excluded);
    if !tables.is_empty() {
        debug!(project = %project.id, tables = tables.len(), "Adding generated interface ID tables");
    }
    let lists = cmake::generate_cmakelists(
        project,
        &CMakeInputs {
            configuration: ctx.config.configuration,
            output_dir: &ctx.output_dir,
            linked_artifacts: &ctx.linked_artifacts,
            generated_sources: &tables,
        },
    );
    fs::write(generated.join("CMakeLists.txt"), lists)?;
    Ok(cmake_project_plan(&generated, ctx))
}

fn cmake_project_plan(source_dir: &Path, ctx: &PlanContext) -> BuildPlan {
    let build_dir = ctx.scratch_dir.join("build");
    let out = display(&ctx.output_dir);

    let mut configure = Step::new("configure", "cmake").args([
        "-S".to_string(),
        display(source_dir),
        "-B".to_string(),
        display(&build_dir),
        format!("-DCMAKE_TOOLCHAIN_FILE={}", display(&ctx.toolchain_file)),
        format!("-DCMAKE_BUILD_TYPE={}", ctx.config.configuration),
        format!("-DCMAKE_RUNTIME_OUTPUT_DIRECTORY={}", out),
        format!("-DCMAKE_LIBRARY_OUTPUT_DIRECTORY={}", out),
        format!("-DCMAKE_ARCHIVE_OUTPUT_DIRECTORY={}", out),
    ]);
    if !ctx.config.extra_flags.is_empty() {
        let extra = ctx.config.extra_flags.join(" ");
        configure = configure.args([format!("-DCMAKE_C_FLAGS={}", extra), format!("-DCMAKE_CXX_FLAGS={}", extra)]);
    }

    let build = Step::new("build", "cmake").args([
        "--build".to_string(),
        display(&build_dir),
        "--config".to_string(),
        ctx.config.configuration.to_string(),
    ]);

    BuildPlan::into_output_dir(vec![configure, build], ctx)
}

fn make_plan(project: &ProjectDescriptor, ctx: &PlanContext) -> BuildPlan {
    let mut build = Step::new("build", "make").args([
        "-C".to_string(),
        display(&project.path),
        format!("CC={}", tool(ctx, "gcc")),
        format!("CXX={}", tool(ctx, "g++")),
        format!("AR={}", tool(ctx, "ar")),
        format!("WINDRES={}", tool(ctx, "windres")),
    ]);
    if !ctx.config.extra_flags.is_empty() {
        let extra = ctx.config.extra_flags.join(" ");
        build = build.args([format!("CFLAGS={}", extra), format!("CXXFLAGS={}", extra)]);
    }

    BuildPlan {
        steps: vec![build],
        output_dir: ctx.output_dir.clone(),
        collect: Collect::NewerThanStart {
            dir: project.path.clone(),
            excluded: ctx.excluded.clone(),
        },
    }
}

/// Entry point flavour, from a scan of the sources
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct EntryPoint {
    unicode: bool,
    gui: bool,
}

fn detect_entry_point(sources: &[PathBuf]) -> EntryPoint {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    let re = ENTRY.get_or_init(|| {
        Regex::new(r"\b(wmain|wWinMain|WinMain|_tWinMain|_tmain)\s*\(").expect("valid regex")
    });

    let mut entry = EntryPoint::default();
    for source in sources {
        let Ok(bytes) = fs::read(source) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        for caps in re.captures_iter(&text) {
            match &caps[1] {
                "wmain" => entry.unicode = true,
                "wWinMain" => {
                    entry.unicode = true;
                    entry.gui = true;
                }
                "WinMain" | "_tWinMain" => entry.gui = true,
                _ => {}
            }
        }
    }
    entry
}

fn standalone_plan(project: &ProjectDescriptor, ctx: &PlanContext) -> io::Result<BuildPlan> {
    let objects_dir = ctx.scratch_dir.join("obj");
    fs::create_dir_all(&objects_dir)?;

    let sources: Vec<PathBuf> = project
        .settings
        .sources
        .iter()
        .chain(&project.settings.resources)
        .map(|s| cmake::resolve_source(&project.path, s))
        .collect();
    let entry = detect_entry_point(&sources);

    let includes: Vec<String> = std::iter::once(display(&project.path))
        .chain(
            project
                .settings
                .include_dirs
                .iter()
                .map(|d| display(&project.path.join(d))),
        )
        .collect();

    let mut compile_flags: Vec<String> = vec!["-DWIN32".to_string(), "-D_WINDOWS".to_string()];
    if entry.unicode {
        compile_flags.extend(["-DUNICODE".to_string(), "-D_UNICODE".to_string()]);
    }
    match ctx.config.configuration {
        Configuration::Release => compile_flags.extend(["-DNDEBUG".to_string(), "-O2".to_string()]),
        Configuration::Debug => compile_flags.extend(["-D_DEBUG".to_string(), "-O0".to_string(), "-g".to_string()]),
    }
    compile_flags.extend(flags::BASE_COMPILE_OPTIONS.iter().map(|s| s.to_string()));
    compile_flags.extend(includes.iter().map(|i| format!("-I{}", i)));

    let mut steps = Vec::new();
    let mut objects = Vec::new();
    for (i, source) in sources.iter().enumerate() {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "source".to_string());
        let name = source
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if paths::is_resource_script(source) {
            let object = objects_dir.join(format!("{}_{}.res.o", i, stem));
            let mut step = Step::new(format!("windres {}", name), tool(ctx, "windres"))
                .args(["-O".to_string(), "coff".to_string()])
                .args(includes.iter().map(|d| format!("--include-dir={}", d)))
                .args(["-i".to_string(), display(source), "-o".to_string(), display(&object)]);
            if entry.unicode {
                step = step.arg("-DUNICODE");
            }
            steps.push(step);
            objects.push(object);
            continue;
        }

        let compiler = if paths::is_c_source(source) { "gcc" } else { "g++" };
        let object = objects_dir.join(format!("{}_{}.o", i, stem));
        steps.push(
            Step::new(format!("compile {}", name), tool(ctx, compiler))
                .args(compile_flags.iter().cloned())
                .args(ctx.config.extra_flags.iter().cloned())
                .args(["-c".to_string(), display(source), "-o".to_string(), display(&object)]),
        );
        objects.push(object);
    }

    let binary = ctx.output_dir.join(format!("{}.exe", project.name));
    let mut link = Step::new("link", tool(ctx, "g++"))
        .args(objects.iter().map(|o| display(o)))
        .args(["-o".to_string(), display(&binary)])
        .args(ctx.config.extra_flags.iter().cloned());
    if entry.unicode {
        link = link.arg("-municode");
    }
    link = link.arg(if entry.gui { "-mwindows" } else { "-mconsole" });
    link = link.args(libraries::DEFAULT_LIBRARIES.iter().map(|l| format!("-l{}", l)));
    steps.push(link);

    Ok(BuildPlan::into_output_dir(steps, ctx))
}

fn walk_binaries(dir: &Path, excluded: &[PathBuf]) -> Vec<PathBuf> {
    let excluded = excluded.to_vec();
    let mut found: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .ignore(false)
        .filter_entry(move |entry| {
            if !entry.file_type().map_or(false, |t| t.is_dir()) {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            // make builds commonly leave binaries in bin/ or obj/
            let skipped = EXCLUDED_DIRS
                .iter()
                .filter(|d| !matches!(**d, "bin" | "obj"))
                .any(|d| name.eq_ignore_ascii_case(d));
            !skipped && !excluded.iter().any(|e| entry.path() == e.as_path())
        })
        .build()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map_or(false, |t| t.is_file()))
        .map(|e| e.into_path())
        .filter(|p| is_binary_output(p))
        .collect();
    found.sort();
    found
}

/// Finds (and for in-place builds, copies) the binaries a plan produced
pub fn collect_outputs(plan: &BuildPlan, started: SystemTime) -> io::Result<Vec<PathBuf>> {
    match &plan.collect {
        Collect::OutputDir => Ok(walk_binaries(&plan.output_dir, &[])),
        Collect::NewerThanStart { dir, excluded } => {
            fs::create_dir_all(&plan.output_dir)?;
            let mut copied = Vec::new();
            let mut excluded = excluded.clone();
            excluded.push(plan.output_dir.clone());

            for binary in walk_binaries(dir, &excluded) {
                let modified = fs::metadata(&binary)?.modified()?;
                if modified < started {
                    continue;
                }
                let Some(name) = binary.file_name() else {
                    continue;
                };
                let target = plan.output_dir.join(name);
                fs::copy(&binary, &target)?;
                copied.push(target);
            }
            Ok(copied)
        }
    }
}
