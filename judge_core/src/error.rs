use std::string;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed in IO: {0}")]
    IO(#[from] std::io::Error),
    #[error("argument provided is error: {0}")]
    Argument(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("environment error: {0}")]
    Environment(String),
    #[error("sandbox error: {0}")]
    Sandbox(String),
    #[error("malformed json")]
    Json(#[from] serde_json::Error),
    #[error("malformed yaml")]
    Yaml(#[from] serde_yaml::Error),
    #[error("bytes is not in UTF8")]
    FromUtf8(#[from] string::FromUtf8Error),
}
