use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tempfile::TempDir;

use crate::{config::ToolchainConfig, error::Result, submission::Language};

pub mod gpp;
pub mod java;
pub mod python;

pub trait Compiler {
    fn compile(&self, src: &str) -> Result<CompileResult>;
}

pub trait CompilerDescriptor {
    fn check_environment() -> CompilerEnvironmentStatus;
}

#[derive(Debug)]
pub enum CompilerEnvironmentStatus {
    OK { version: String, path: String },
    Missing,
}

#[derive(Debug)]
pub enum CompileResult {
    OK(CompiledProgram),
    CompileError(String),
}

/// How the memory limit of a run is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCeiling {
    /// `ulimit -v` on the worker shell.
    AddressSpace,
    /// `-Xmx` on the JVM, which cannot start under an address-space cap.
    JvmHeap,
}

/// A runnable artifact together with the scratch directory holding it.
/// Dropping the program removes the directory.
#[derive(Debug)]
pub struct CompiledProgram {
    scratch: TempDir,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub ceiling: MemoryCeiling,
}

impl CompiledProgram {
    pub fn new(scratch: TempDir, path: PathBuf) -> Self {
        Self::new_with_args(scratch, path, vec![])
    }

    pub fn new_with_args(scratch: TempDir, path: PathBuf, args: Vec<String>) -> Self {
        Self {
            scratch,
            path,
            args,
            ceiling: MemoryCeiling::AddressSpace,
        }
    }

    pub fn with_ceiling(mut self, ceiling: MemoryCeiling) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Command line to run inside the sandbox, quoted for `sh -c`.
    pub fn command_line(&self) -> String {
        self.words(None)
    }

    /// Command line for a run limited to `memory_limit_mb`. Only a JVM
    /// takes the limit as an argument.
    pub fn limited_command_line(&self, memory_limit_mb: u64) -> String {
        match self.ceiling {
            MemoryCeiling::AddressSpace => self.words(None),
            MemoryCeiling::JvmHeap => self.words(Some(format!("-Xmx{}m", memory_limit_mb))),
        }
    }

    fn words(&self, leading: Option<String>) -> String {
        let mut words = vec![shell_quote(&self.path.to_string_lossy())];
        words.extend(leading.iter().map(|f| shell_quote(f)));
        words.extend(self.args.iter().map(|f| shell_quote(f)));
        words.join(" ")
    }
}

pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

impl Language {
    pub fn compiler(
        &self,
        work_dir: &Path,
        toolchain: &ToolchainConfig,
    ) -> Result<Box<dyn Compiler>> {
        Ok(match self {
            Language::Python => Box::new(python::CompilerPython::new(work_dir)),
            Language::Java => Box::new(java::CompilerJava::new(
                work_dir,
                toolchain.java_release,
            )?),
            Language::Cpp => Box::new(gpp::CompilerGPP::new(work_dir, toolchain.cpp_standard)?),
        })
    }

    pub fn check_environment(&self) -> CompilerEnvironmentStatus {
        match self {
            Language::Python => python::CompilerPython::check_environment(),
            Language::Java => java::CompilerJava::check_environment(),
            Language::Cpp => gpp::CompilerGPP::check_environment(),
        }
    }
}

/// Creates a uniquely named directory for one submission under `work_dir`,
/// readable by the sandbox user.
pub(crate) fn scratch_dir(work_dir: &Path) -> Result<TempDir> {
    fs::create_dir_all(work_dir)?;
    let dir = tempfile::Builder::new()
        .prefix("submission-")
        .tempdir_in(work_dir)?;
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))?;
    Ok(dir)
}

pub(crate) fn widen_permissions(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
    Ok(())
}

/// Locates `binary` and asks it for its version.
pub(crate) fn probe_toolchain(binary: &str, version_flag: &str) -> CompilerEnvironmentStatus {
    let path = match which::which(binary) {
        Ok(path) => path,
        Err(_) => return CompilerEnvironmentStatus::Missing,
    };

    let output = match Command::new(&path)
        .arg(version_flag)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
    {
        Ok(output) => output,
        Err(_) => return CompilerEnvironmentStatus::Missing,
    };

    // some toolchains print the version on stderr
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    let version = text
        .lines()
        .next()
        .and_then(|f| f.split(' ').last())
        .unwrap_or("unknown");

    CompilerEnvironmentStatus::OK {
        version: version.into(),
        path: path.to_string_lossy().into(),
    }
}

pub(crate) struct ToolchainOutput {
    pub success: bool,
    pub diagnostic: String,
}

/// Runs a toolchain to completion and collects its diagnostics.
pub(crate) fn run_toolchain(command: &mut Command) -> Result<ToolchainOutput> {
    log::debug!("running toolchain {:?}", command);
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    let mut diagnostic = String::from_utf8_lossy(&output.stderr).to_string();
    if diagnostic.trim().is_empty() {
        diagnostic = String::from_utf8_lossy(&output.stdout).to_string();
    }

    Ok(ToolchainOutput {
        success: output.status.success(),
        diagnostic,
    })
}
