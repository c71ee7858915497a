use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use super::{
    probe_toolchain, run_toolchain, scratch_dir, widen_permissions, CompileResult,
    CompiledProgram, Compiler, CompilerDescriptor, CompilerEnvironmentStatus,
};
use crate::error::Result;

/// Interpreter used inside the sandbox image.
const INTERPRETER: &str = "python3";

pub struct CompilerPython {
    work_dir: PathBuf,
    /// Host interpreter for the syntax check, when one is installed.
    checker_path: Option<String>,
}

impl CompilerPython {
    pub fn new(work_dir: &Path) -> Self {
        let checker_path = match Self::check_environment() {
            CompilerEnvironmentStatus::OK { version: _, path } => Some(path),
            CompilerEnvironmentStatus::Missing => {
                log::warn!("no host python found, skipping syntax check");
                None
            }
        };
        Self {
            work_dir: work_dir.into(),
            checker_path,
        }
    }
}

impl CompilerDescriptor for CompilerPython {
    fn check_environment() -> CompilerEnvironmentStatus {
        probe_toolchain(INTERPRETER, "--version")
    }
}

impl Compiler for CompilerPython {
    fn compile(&self, src: &str) -> Result<CompileResult> {
        let scratch = scratch_dir(&self.work_dir)?;
        let code_path = scratch.path().join("main.py");

        fs::write(&code_path, src)?;
        widen_permissions(&code_path)?;

        if let Some(checker) = &self.checker_path {
            let output = run_toolchain(
                Command::new(checker)
                    .arg("-m")
                    .arg("py_compile")
                    .arg(&code_path),
            )?;
            if !output.success {
                return Ok(CompileResult::CompileError(output.diagnostic));
            }
        }

        Ok(CompileResult::OK(CompiledProgram::new_with_args(
            scratch,
            INTERPRETER.into(),
            vec![code_path.to_string_lossy().to_string()],
        )))
    }
}
