//! Error types for the dispatcher and its lifecycle manager.
//!
//! Process-level failures (`PortExhausted`, `Bind`, `ShutdownTimeout`, ...) are
//! returned to the embedding caller. Per-request failures (`RouteNotFound`,
//! `InternalHandler`, `ResponseHeader`) never leave the request boundary: the
//! dispatcher turns them into 400 and 500 responses.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// No free local port was found. Pin an explicit address instead.
    #[error("could not find an open port after {attempts} attempts; configure an explicit address")]
    PortExhausted { attempts: usize },

    #[error("server is already running")]
    AlreadyRunning,

    /// The background server did not exit within the shutdown timeout.
    /// The thread may still be alive; `status()` reports it.
    #[error("server thread still alive {0:?} after shutdown was requested")]
    ShutdownTimeout(Duration),

    #[error("URL not supported: {0}")]
    RouteNotFound(String),

    #[error("session handler failed: {0}")]
    InternalHandler(String),

    /// A session response header cannot be written as given.
    #[error("response header rejected: {0}")]
    ResponseHeader(String),

    #[error("context has not been registered")]
    NotRegistered,

    #[error("session factory failed: {0}")]
    SessionFactory(#[source] anyhow::Error),

    #[error("failed to bind server address: {0}")]
    Bind(#[source] io::Error),

    #[error("server did not report readiness within {0:?}")]
    StartupTimeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl DispatchError {
    /// Whether the error is scoped to a single request rather than the server.
    #[must_use]
    pub fn is_per_request(&self) -> bool {
        matches!(
            self,
            DispatchError::RouteNotFound(_)
                | DispatchError::InternalHandler(_)
                | DispatchError::ResponseHeader(_)
        )
    }
}

impl From<serde_yaml::Error> for DispatchError {
    fn from(e: serde_yaml::Error) -> Self {
        DispatchError::Config(e.to_string())
    }
}
