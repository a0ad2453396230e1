use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Store error: {0}")]
    Store(#[from] serde_json::Error),

    #[error("git: {0}")]
    Git(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DashError>;
