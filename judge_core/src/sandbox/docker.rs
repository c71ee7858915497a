use std::{
    process::{Command, Output, Stdio},
    sync::Arc,
};

use super::{Environment, EnvironmentProvider, EnvironmentSpec, ExecOutput};
use crate::{
    config::DockerConfig,
    error::{Error, Result},
};

/// Provisions one container per submission through the `docker` CLI.
pub struct DockerProvider {
    config: DockerConfig,
}

impl DockerProvider {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    /// Arguments of the `docker create` call for `spec`.
    pub fn create_args(&self, spec: &EnvironmentSpec) -> Result<Vec<String>> {
        let memory = spec
            .memory_limit_mb
            .checked_add(self.config.memory_headroom_mb)
            .ok_or_else(|| {
                Error::Argument(format!("memory limit {} MB is too large", spec.memory_limit_mb))
            })?;
        let memory = format!("{}m", memory);
        let shared = spec.shared_dir.to_string_lossy();
        Ok(vec![
            "create".into(),
            "--interactive".into(),
            "--tty".into(),
            "--network".into(),
            self.config.network.clone(),
            "--memory".into(),
            memory.clone(),
            "--memory-swap".into(),
            memory,
            "--pids-limit".into(),
            self.config.pids_limit.to_string(),
            "--cap-drop=ALL".into(),
            "--security-opt=no-new-privileges".into(),
            "--user".into(),
            self.config.user.clone(),
            "--volume".into(),
            format!("{}:{}:ro", shared, shared),
            spec.image.clone(),
            "/bin/sh".into(),
        ])
    }
}

impl EnvironmentProvider for DockerProvider {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Arc<dyn Environment>> {
        let output = docker(&self.config.binary, &self.create_args(spec)?)?;
        if !output.status.success() {
            return Err(Error::Sandbox(format!(
                "failed to create container from `{}`: {}",
                spec.image,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)?;
        let id = stdout
            .lines()
            .next()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| Error::Sandbox("docker returned no container id".into()))?;
        log::info!("created container {} from {}", id, spec.image);

        Ok(Arc::new(DockerContainer {
            binary: self.config.binary.clone(),
            id: id.into(),
        }))
    }
}

pub struct DockerContainer {
    binary: String,
    id: String,
}

impl DockerContainer {
    fn checked(&self, args: &[String]) -> Result<()> {
        let output = docker(&self.binary, args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Sandbox(format!(
                "`docker {}` failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl Environment for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<()> {
        self.checked(&["start".into(), self.id.clone()])
    }

    fn exec(&self, argv: &[String]) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string(), self.id.clone()];
        args.extend(argv.iter().cloned());
        let output = docker(&self.binary, &args)?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code(),
        })
    }

    fn destroy(&self) -> Result<()> {
        // kills the container if still running
        self.checked(&["rm".into(), "--force".into(), self.id.clone()])
    }
}

fn docker(binary: &str, args: &[String]) -> Result<Output> {
    log::debug!("{} {:?}", binary, args);
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_args_carry_limits() -> Result<()> {
        let provider = DockerProvider::new(DockerConfig::default());
        let args = provider.create_args(&EnvironmentSpec {
            image: "python:3.8".into(),
            memory_limit_mb: 256,
            shared_dir: "/app/worker".into(),
        })?;

        let pos = |flag: &str| args.iter().position(|f| f == flag).unwrap();
        assert_eq!(args[0], "create");
        assert_eq!(args[pos("--network") + 1], "none");
        assert_eq!(args[pos("--memory") + 1], "512m");
        assert_eq!(args[pos("--volume") + 1], "/app/worker:/app/worker:ro");
        assert_eq!(args[args.len() - 2], "python:3.8");
        Ok(())
    }

    #[test]
    fn oversized_limit_is_rejected() {
        let provider = DockerProvider::new(DockerConfig::default());
        let result = provider.create_args(&EnvironmentSpec {
            image: "python:3.8".into(),
            memory_limit_mb: u64::MAX,
            shared_dir: "/tmp".into(),
        });
        assert!(matches!(result, Err(Error::Argument(_))));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let provider = DockerProvider::new(DockerConfig {
            binary: "/nonexistent/docker".into(),
            ..DockerConfig::default()
        });
        let result = provider.create(&EnvironmentSpec {
            image: "python:3.8".into(),
            memory_limit_mb: 256,
            shared_dir: "/tmp".into(),
        });
        assert!(matches!(result, Err(Error::IO(_))));
    }
}
