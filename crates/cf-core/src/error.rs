//! Error types for CueForge

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CfError {
    #[error("Invalid interval: low {0} > high {1}")]
    InvalidInterval(f64, f64),

    #[error("Empty interval: [{0}] with an open endpoint")]
    EmptyInterval(f64),

    #[error("Non-finite {0}: {1}")]
    NonFinite(&'static str, f64),

    #[error("Invalid motion vector: {0}")]
    InvalidVector(String),

    #[error("Timing source is not ready")]
    NotReady,
}

/// Result type alias
pub type CfResult<T> = Result<T, CfError>;
