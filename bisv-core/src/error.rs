use crate::status::StatusCode;
use thiserror::Error;

/// Main error type for BIS V operations
#[derive(Error, Debug)]
pub enum BisvError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("telegram invalid: {0}")]
    Telegram(String),

    #[error("device status: {0}")]
    Status(StatusCode),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("session closed")]
    SessionClosed,

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<BisvError>,
    },
}

impl BisvError {
    /// Wrap an error with a descriptive context, preserving the cause chain.
    pub fn context(context: impl Into<String>, source: BisvError) -> Self {
        BisvError::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Translate a non-OK device status into an error.
    pub fn from_status(status: StatusCode) -> Self {
        BisvError::Status(status)
    }

    /// Transport-class errors are fatal to the whole session.
    pub fn is_transport(&self) -> bool {
        match self {
            BisvError::Connection(_) | BisvError::Timeout => true,
            BisvError::Context { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

/// Result type alias for BIS V operations
pub type BisvResult<T> = Result<T, BisvError>;
