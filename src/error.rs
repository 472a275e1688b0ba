use thiserror::Error;

/// Errors returned by [`HttpRequestClient`](crate::HttpRequestClient).
#[derive(Debug, Error)]
pub enum Error {
    /// A construction option outside the recognized set was supplied.
    #[error("Unknown option: {0}")]
    UnrecognizedOption(String),

    /// A recognized option was supplied with a value of the wrong shape.
    #[error("Invalid value for option {option}: expected {expected}")]
    InvalidOptionValue {
        option: &'static str,
        expected: &'static str,
    },

    /// The transport failed to complete the request.
    #[error("{0}")]
    Request(String),

    /// The transport handle could not be created.
    #[error("Failed to start transport: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to parse options: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to read options file: {0}")]
    ConfigFile(#[source] std::io::Error),
}

impl Error {
    /// Wraps a transport failure, keeping the whole context chain in the message.
    pub(crate) fn request(err: anyhow::Error) -> Self {
        Self::Request(format!("{:#}", err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
