use labperiph_core::CoreError;
use labperiph_proto::FailureReason;
use thiserror::Error;

/// Library hosting errors
#[derive(Debug, Error)]
pub enum LibsError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unregistered library: {0}")]
    UnregisteredLib(String),
    #[error("Container start error: {0}")]
    ContainerStart(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LibsError {
    /// Structured reason reported to `GetLib` callers, if the error has one.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            LibsError::UnregisteredLib(_) | LibsError::Core(CoreError::UnregisteredLibrary(_)) => {
                Some(FailureReason::UnregisteredLib)
            }
            LibsError::ContainerStart(_) | LibsError::Core(_) => {
                Some(FailureReason::ContainerStartError)
            }
            LibsError::InvalidRequest(_) | LibsError::Registry(_) => None,
        }
    }
}

pub type LibsResult<T> = std::result::Result<T, LibsError>;
