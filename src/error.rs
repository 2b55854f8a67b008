use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use serde_json;
use futures::channel::mpsc::SendError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid API base url {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("Auth token contains characters that can not be sent in a header")]
    InvalidAuthToken,

    #[error("{field} must be greater than 0")]
    ZeroDuration { field: &'static str },
}

/// Every way an order submission can fail. The controller turns these into a
/// failure notification, they never travel further up.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Order API rejected the session (HTTP {status}); log in again")]
    Unauthorized { status: u16 },

    #[error("Order API answered with HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Order API did not answer in time")]
    Timeout,

    #[error("Failed to reach the order API: {source}")]
    Transport { #[from] source: reqwest::Error },

    #[error("Can not build order url for key {key:?}")]
    InvalidKey { key: String },
}

impl OrderError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, OrderError::Unauthorized { .. })
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start async runtime: {source}")]
    Runtime { source: io::Error },

    #[error("Failed to start scan station (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to build HTTP client: {source}")]
    HttpClient { source: reqwest::Error },

    #[error("Failed to read scanner input: {source}")]
    ScannerInput { #[from] source: io::Error },

    #[error("Failed to send to the scan controller: {source}")]
    ControllerGone { #[from] source: SendError },

    #[error("Scan controller task failed: {source}")]
    ControllerJoin { #[from] source: tokio::task::JoinError },
}
