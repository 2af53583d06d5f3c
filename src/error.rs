//! Error types for configuration, client service and backend probing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the balancer itself.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// A backend argument that is not `host:port`.
    #[error("invalid backend '{0}'")]
    InvalidBackend(String),

    /// Nothing left to balance across at startup.
    #[error("no eligible backends configured, give at least one as host:port")]
    NoBackends,

    /// A static response page could not be opened.
    #[error("cannot open response page {path}: {source}")]
    MissingAsset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Why a backend was left out of the ranked pool.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("not accepting connections: {0}")]
    Connect(io::Error),

    #[error("malformed status line '{0}'")]
    MalformedStatusLine(String),

    #[error("response has no Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length '{0}'")]
    InvalidContentLength(String),

    #[error("backend answered with status {0}")]
    Status(String),

    #[error("body ended after {received} of {expected} bytes")]
    TruncatedBody { expected: u64, received: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BalancerError>;
