use thiserror::Error;

pub type Result<T> = std::result::Result<T, DisplayError>;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Display server already running")]
    AlreadyRunning,

    #[error("Display server not started")]
    NotStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
