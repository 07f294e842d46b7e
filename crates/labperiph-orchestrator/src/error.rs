use labperiph_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("command {0} is unsupported by this executor")]
    Unsupported(String),
    #[error("log streaming is already closed")]
    LogsClosed,
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("library service error: {0}")]
    Libs(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl OrchestratorError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, OrchestratorError::Unsupported(_))
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Core(CoreError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
