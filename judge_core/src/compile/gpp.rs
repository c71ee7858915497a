use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};

use super::{
    probe_toolchain, run_toolchain, scratch_dir, widen_permissions, CompileResult,
    CompiledProgram, Compiler, CompilerDescriptor, CompilerEnvironmentStatus,
};
use crate::error::{Error, Result};

pub struct CompilerGPP {
    work_dir: PathBuf,
    standard: GPPStandard,
    compiler_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum GPPStandard {
    #[serde(rename = "c++11")]
    CPP11,
    #[serde(rename = "c++17")]
    CPP17,
}

impl From<GPPStandard> for String {
    fn from(v: GPPStandard) -> Self {
        match v {
            GPPStandard::CPP11 => "-std=c++11".into(),
            GPPStandard::CPP17 => "-std=c++17".into(),
        }
    }
}

impl CompilerDescriptor for CompilerGPP {
    fn check_environment() -> CompilerEnvironmentStatus {
        probe_toolchain("g++", "--version")
    }
}

impl Compiler for CompilerGPP {
    fn compile(&self, src: &str) -> Result<CompileResult> {
        let scratch = scratch_dir(&self.work_dir)?;
        let code_path = scratch.path().join("main.cpp");
        let exec_path = scratch.path().join("main");

        fs::write(&code_path, src)?;

        let output = run_toolchain(
            Command::new(&self.compiler_path)
                .arg(&code_path)
                .arg("-o")
                .arg(&exec_path)
                .arg("-O2")
                .arg(String::from(self.standard)),
        )?;

        if !output.success {
            return Ok(CompileResult::CompileError(output.diagnostic));
        }

        widen_permissions(&exec_path)?;
        Ok(CompileResult::OK(CompiledProgram::new(scratch, exec_path)))
    }
}

impl CompilerGPP {
    pub fn new(work_dir: &Path, standard: GPPStandard) -> Result<Self> {
        match Self::check_environment() {
            CompilerEnvironmentStatus::OK { version: _, path } => Ok(Self {
                work_dir: work_dir.into(),
                standard,
                compiler_path: path,
            }),
            CompilerEnvironmentStatus::Missing => Err(Error::Environment("missing g++".into())),
        }
    }
}
