use thiserror::Error;

/// Failure reported by a host capability (DOM write, style injection).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("element not found: {0}")]
    MissingElement(String),
    #[error("dom error: {0}")]
    Dom(String),
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error("grid root not visible")]
    GridUnavailable,
    #[error("host error: {0}")]
    Host(#[from] HostError),
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
