//! Shared helpers for integration tests: a fake toolchain and repo builders

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wincross::toolchain::{CommandRunner, LogTail, Step, StepOutput, ToolchainError};

/// Pretends to be MinGW/CMake: writes the files a step would produce
///
/// - any `-o <file>` argument gets a placeholder file
/// - a `configure` step writes the binaries registered for its output directory
/// - steps whose command line contains a configured marker exit with code 2
#[derive(Default)]
pub struct FakeToolchain {
    outputs: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    calls: Mutex<Vec<Step>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binaries written into the output directory named `dir`
    pub fn produces(mut self, dir: &str, files: &[&str]) -> Self {
        self.outputs
            .insert(dir.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing.push(marker.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Step> {
        self.calls.lock().unwrap().clone()
    }

    fn write_outputs(&self, step: &Step) {
        let mut args = step.args.iter();
        while let Some(arg) = args.next() {
            if arg == "-o" {
                if let Some(target) = args.next() {
                    touch(Path::new(target));
                }
            }
        }

        if step.label != "configure" {
            return;
        }
        let out = step
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-DCMAKE_RUNTIME_OUTPUT_DIRECTORY="))
            .map(PathBuf::from);
        let Some(out) = out else {
            return;
        };
        let dir = out.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        for file in self.outputs.get(&dir).into_iter().flatten() {
            touch(&out.join(file));
        }
    }
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, "MZ").unwrap();
}

#[async_trait]
impl CommandRunner for FakeToolchain {
    async fn run(
        &self,
        step: &Step,
        _timeout: Duration,
        tail_lines: usize,
        _cancel: &CancellationToken,
    ) -> Result<StepOutput, ToolchainError> {
        self.calls.lock().unwrap().push(step.clone());
        let mut tail = LogTail::new(tail_lines);
        let command = step.command_line();

        if self.failing.iter().any(|m| command.contains(m.as_str())) {
            tail.push(format!("{}: error: simulated failure", step.program));
            return Ok(StepOutput {
                exit_code: Some(2),
                tail,
                elapsed: Duration::from_millis(1),
            });
        }

        self.write_outputs(step);
        tail.push(format!("{} ok", step.label));
        Ok(StepOutput {
            exit_code: Some(0),
            tail,
            elapsed: Duration::from_millis(1),
        })
    }
}

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub const DLL_VCXPROJ: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project DefaultTargets="Build" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup Label="Globals">
    <ProjectGuid>{11111111-1111-1111-1111-111111111111}</ProjectGuid>
  </PropertyGroup>
  <PropertyGroup>
    <ConfigurationType>DynamicLibrary</ConfigurationType>
  </PropertyGroup>
  <ItemGroup>
    <ClCompile Include="lib.cpp" />
  </ItemGroup>
</Project>
"#;

pub const APP_VCXPROJ: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project DefaultTargets="Build" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup Label="Globals">
    <ProjectGuid>{22222222-2222-2222-2222-222222222222}</ProjectGuid>
  </PropertyGroup>
  <PropertyGroup>
    <ConfigurationType>Application</ConfigurationType>
  </PropertyGroup>
  <ItemGroup>
    <ClCompile Include="main.cpp" />
    <ResourceCompile Include="app.rc" />
  </ItemGroup>
  <ItemGroup>
    <ProjectReference Include="..\LibA\LibA.vcxproj">
      <Project>{11111111-1111-1111-1111-111111111111}</Project>
    </ProjectReference>
  </ItemGroup>
</Project>
"#;

pub const SOLUTION: &str = "Microsoft Visual Studio Solution File, Format Version 12.00\r\n\
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"AppB\", \"AppB\\AppB.vcxproj\", \"{22222222-2222-2222-2222-222222222222}\"\r\n\
\tProjectSection(ProjectDependencies) = postProject\r\n\
\t\t{11111111-1111-1111-1111-111111111111} = {11111111-1111-1111-1111-111111111111}\r\n\
\tEndProjectSection\r\n\
EndProject\r\n\
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"LibA\", \"LibA\\LibA.vcxproj\", \"{11111111-1111-1111-1111-111111111111}\"\r\n\
EndProject\r\n\
Global\r\n\
\tGlobalSection(SolutionConfigurationPlatforms) = preSolution\r\n\
\t\tRelease|x64 = Release|x64\r\n\
\tEndGlobalSection\r\n\
EndGlobal\r\n";

/// Solution with a DLL and an application that embeds the DLL's name in its resources
pub fn solution_repo(root: &Path) {
    write(root, "Demo.sln", SOLUTION);
    write(root, "LibA/LibA.vcxproj", DLL_VCXPROJ);
    write(root, "LibA/lib.cpp", "extern \"C\" __declspec(dllexport) int answer() { return 42; }\n");
    write(root, "AppB/AppB.vcxproj", APP_VCXPROJ);
    write(root, "AppB/main.cpp", "int main() { return 0; }\n");
    write(root, "AppB/app.rc", "1 RCDATA \"..\\\\LibA\\\\LibA.dll\"\n");
}
