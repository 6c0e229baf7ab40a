use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid Tower project: {0}")]
    InvalidProject(String),

    #[error("Malformed ARN: {0}")]
    ArnFormat(String),

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Cloud provider error: {0}")]
    Cloud(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
