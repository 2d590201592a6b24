use serde::Serialize;
use thiserror::Error;

use crate::signaling::registry::ConnectionId;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Connection {0} is not active")]
    ConnectionNotActive(ConnectionId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl SignalError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            SignalError::ConnectionNotActive(_) => "CONNECTION_NOT_ACTIVE",
            SignalError::InvalidConfig(_) => "INVALID_CONFIG",
            SignalError::ServerError(_) => "SERVER_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

impl From<anyhow::Error> for SignalError {
    fn from(err: anyhow::Error) -> Self {
        SignalError::ServerError(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
