//! Isolated execution environments and the executor that runs one test case
//! inside them.
//!
//! An environment is provisioned by an [`EnvironmentProvider`] once per
//! submission and held through an [`EnvironmentGuard`], which force-destroys
//! it when dropped.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::error::Result;

pub mod docker;
mod executor;

pub use executor::{worker_command, SandboxExecutor, ABORT_EXIT, TIMEOUT_EXIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Normal,
    TimedOut,
    MemoryExceeded,
    /// The sandbox could not run the command at all.
    RuntimeError,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub output: String,
    pub reason: TerminationReason,
    pub elapsed: Duration,
}

/// Raw result of a command executed inside an environment.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentSpec {
    pub image: String,
    pub memory_limit_mb: u64,
    /// Host directory made visible inside the environment at the same path.
    pub shared_dir: PathBuf,
}

pub trait Environment: Send + Sync {
    fn id(&self) -> &str;
    fn start(&self) -> Result<()>;
    fn exec(&self, argv: &[String]) -> Result<ExecOutput>;
    fn destroy(&self) -> Result<()>;
}

pub trait EnvironmentProvider {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Arc<dyn Environment>>;
}

/// Exclusive handle on a started environment.
pub struct EnvironmentGuard {
    env: Arc<dyn Environment>,
}

impl EnvironmentGuard {
    pub fn acquire(provider: &dyn EnvironmentProvider, spec: &EnvironmentSpec) -> Result<Self> {
        let guard = Self {
            env: provider.create(spec)?,
        };
        guard.env.start()?;
        log::info!("environment {} started", guard.env.id());
        Ok(guard)
    }

    pub fn environment(&self) -> Arc<dyn Environment> {
        self.env.clone()
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        match self.env.destroy() {
            Ok(()) => log::info!("environment {} destroyed", self.env.id()),
            Err(e) => log::error!("failed to destroy environment {}: {}", self.env.id(), e),
        }
    }
}
