//! Error types for the gateway

use std::io;
use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tunnel id conflict: {0}")]
    Conflict(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid tunnel id: {0}")]
    InvalidId(String),

    #[error("No route: {0}")]
    Route(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No capacity: {0}")]
    Capacity(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Error::Parse(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Error::Auth(msg.into())
    }

    pub fn invalid_id<S: Into<String>>(msg: S) -> Self {
        Error::InvalidId(msg.into())
    }

    pub fn route<S: Into<String>>(msg: S) -> Self {
        Error::Route(msg.into())
    }

    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Error::Upstream(msg.into())
    }

    pub fn capacity<S: Into<String>>(msg: S) -> Self {
        Error::Capacity(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
