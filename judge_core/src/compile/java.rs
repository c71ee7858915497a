use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use regex::Regex;

use super::{
    probe_toolchain, run_toolchain, scratch_dir, CompileResult, CompiledProgram, Compiler,
    CompilerDescriptor, CompilerEnvironmentStatus, MemoryCeiling,
};
use crate::error::{Error, Result};

pub struct CompilerJava {
    work_dir: PathBuf,
    /// `--release` of the runtime image.
    release: u32,
    compiler_path: String,
}

impl CompilerJava {
    pub fn new(work_dir: &Path, release: u32) -> Result<Self> {
        match Self::check_environment() {
            CompilerEnvironmentStatus::OK { version: _, path } => Ok(Self {
                work_dir: work_dir.into(),
                release,
                compiler_path: path,
            }),
            CompilerEnvironmentStatus::Missing => Err(Error::Environment("missing javac".into())),
        }
    }
}

/// Finds the entry class: the first public class, else the first class.
pub fn main_class_name(src: &str) -> Result<Option<String>> {
    let public = Regex::new(r"public\s+(?:final\s+)?class\s+(\w+)")
        .map_err(|e| Error::Data(e.to_string()))?;
    let any = Regex::new(r"\bclass\s+(\w+)").map_err(|e| Error::Data(e.to_string()))?;

    let captures = public.captures(src).or_else(|| any.captures(src));
    Ok(captures.and_then(|f| f.get(1)).map(|f| f.as_str().to_string()))
}

impl CompilerDescriptor for CompilerJava {
    fn check_environment() -> CompilerEnvironmentStatus {
        probe_toolchain("javac", "-version")
    }
}

impl Compiler for CompilerJava {
    fn compile(&self, src: &str) -> Result<CompileResult> {
        let class_name = match main_class_name(src)? {
            Some(name) => name,
            None => {
                return Ok(CompileResult::CompileError(
                    "no class declaration found".into(),
                ))
            }
        };

        let scratch = scratch_dir(&self.work_dir)?;
        let code_path = scratch.path().join(format!("{}.java", class_name));
        fs::write(&code_path, src)?;

        let output = run_toolchain(
            Command::new(&self.compiler_path)
                .arg("--release")
                .arg(self.release.to_string())
                .arg("-d")
                .arg(scratch.path())
                .arg(&code_path),
        )?;
        if !output.success {
            return Ok(CompileResult::CompileError(output.diagnostic));
        }

        let classpath = scratch.path().to_string_lossy().to_string();
        Ok(CompileResult::OK(
            CompiledProgram::new_with_args(
                scratch,
                "java".into(),
                vec!["-classpath".into(), classpath, class_name],
            )
            .with_ceiling(MemoryCeiling::JvmHeap),
        ))
    }
}
