use thiserror::Error;

pub type SolveResult<T> = Result<T, SolveError>;

/// Failures of a single request to the solver service.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("solver service unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("solver service returned status {status}")]
    Service { status: u16, message: Option<String> },
    #[error("unexpected response shape: {0}")]
    Decode(#[source] serde_json::Error),
}

impl SolveError {
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: Some(message.into()),
        }
    }

    /// A service error message suitable to show as-is, if the body carried one.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Self::Service {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message.trim()),
            _ => None,
        }
    }
}
