use std::{fs, path::Path};

use anyhow::Result;
use judge_core::config::JudgeConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AmqpConfig {
    pub addr: String,
    #[serde(rename = "taskQueue")]
    pub task_queue: String,
    #[serde(rename = "resultQueue")]
    pub result_queue: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            addr: "amqp://127.0.0.1:5672/%2f".into(),
            task_queue: "judge_tasks".into(),
            result_queue: "judge_results".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub amqp: Option<AmqpConfig>,
}

impl ServerConfig {
    /// Reads `JUDGE_CONFIG` (default `judge.yaml`). `AMQP_ADDR` switches the
    /// broker on and overrides its address.
    pub fn load() -> Result<Self> {
        let path = std::env::var("JUDGE_CONFIG").unwrap_or_else(|_| "judge.yaml".into());
        let mut config = if Path::new(&path).exists() {
            Self::from_string(&fs::read_to_string(&path)?)?
        } else {
            log::info!("config `{}` not found, using defaults", path);
            Self::default()
        };

        if let Ok(addr) = std::env::var("AMQP_ADDR") {
            config.amqp.get_or_insert_with(AmqpConfig::default).addr = addr;
        }
        Ok(config)
    }

    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
