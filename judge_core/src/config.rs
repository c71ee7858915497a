use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{compile::gpp::GPPStandard, error::Result, submission::Language};

pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;
/// Largest memory limit a submission may ask for.
pub const MAX_MEMORY_LIMIT_MB: u64 = 64 * 1024;
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 2;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename = "limitConfig", default)]
pub struct LimitConfig {
    /// Wall-clock limit per test case, in seconds.
    #[serde(rename = "timeLimit")]
    pub time_limit: u64,
    /// Memory limit used when a submission does not carry one, in MB.
    #[serde(rename = "memoryLimit")]
    pub memory_limit: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT_SECS,
            memory_limit: DEFAULT_MEMORY_LIMIT_MB,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ImageConfig {
    pub python: String,
    pub java: String,
    pub cpp: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            python: "python:3.8".into(),
            java: "openjdk:11".into(),
            cpp: "gcc:latest".into(),
        }
    }
}

impl ImageConfig {
    pub fn image_for(&self, language: Language) -> &str {
        match language {
            Language::Python => &self.python,
            Language::Java => &self.java,
            Language::Cpp => &self.cpp,
        }
    }
}

/// Host toolchain flags. The Java release must match the runtime image.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    #[serde(rename = "cppStandard")]
    pub cpp_standard: GPPStandard,
    #[serde(rename = "javaRelease")]
    pub java_release: u32,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cpp_standard: GPPStandard::CPP17,
            java_release: 11,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DockerConfig {
    pub binary: String,
    pub network: String,
    /// User the programs run as inside the container.
    pub user: String,
    /// Added on top of the submission limit for the container cgroup, so
    /// that `ulimit -v` or the JVM heap limit inside it trips first.
    #[serde(rename = "memoryHeadroomMb")]
    pub memory_headroom_mb: u64,
    #[serde(rename = "pidsLimit")]
    pub pids_limit: u32,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".into(),
            network: "none".into(),
            user: "65534:65534".into(),
            memory_headroom_mb: 256,
            pids_limit: 128,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct JudgeConfig {
    /// Scratch root shared with the containers at the same path.
    #[serde(rename = "workDir")]
    pub work_dir: PathBuf,
    #[serde(rename = "queueDir")]
    pub queue_dir: PathBuf,
    #[serde(rename = "resultsDir")]
    pub results_dir: PathBuf,
    #[serde(rename = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(rename = "watchdogGraceMs")]
    pub watchdog_grace_ms: u64,
    pub limit: LimitConfig,
    pub images: ImageConfig,
    pub toolchain: ToolchainConfig,
    pub docker: DockerConfig,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("judge-work"),
            queue_dir: "queue".into(),
            results_dir: "results".into(),
            poll_interval_ms: 1000,
            watchdog_grace_ms: 2000,
            limit: LimitConfig::default(),
            images: ImageConfig::default(),
            toolchain: ToolchainConfig::default(),
            docker: DockerConfig::default(),
        }
    }
}

impl JudgeConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_string(&content)
    }

    /// Reads `path` when it exists and falls back to defaults otherwise.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            log::info!("config `{}` not found, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.limit.time_limit)
    }

    pub fn watchdog_grace(&self) -> Duration {
        Duration::from_millis(self.watchdog_grace_ms)
    }
}
