//! Error types for the planner.

use thiserror::Error;

use crate::models::TspAlgorithm;

/// Failure to obtain a travel matrix from a provider.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Transport-level failure talking to the routing backend.
    #[error("matrix request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without an OSRM error body.
    #[error("routing backend returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// The backend answered with a non-OK code.
    #[error("routing backend returned code {code}: {message}")]
    Backend { code: String, message: String },

    /// The response body could not be decoded.
    #[error("malformed matrix response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response is missing an annotation we asked for.
    #[error("matrix response is missing {0}")]
    MissingAnnotation(&'static str),

    /// Rows/columns do not match the number of requested locations.
    #[error("matrix shape mismatch: expected {expected}x{expected}, got {rows} rows")]
    Shape { expected: usize, rows: usize },
}

/// Failure to load or validate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors surfaced by batching, sequencing, planning and re-optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The exhaustive solver refuses inputs above its configured bound.
    #[error("{algorithm:?} supports at most {max} stops, got {stops}")]
    TooManyStops {
        algorithm: TspAlgorithm,
        stops: usize,
        max: usize,
    },

    /// No ordering satisfies precedence and capacity.
    #[error("no feasible stop sequence exists")]
    NoFeasibleSequence,

    /// An event referenced an order the session does not know.
    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;
