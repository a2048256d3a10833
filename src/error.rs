//! Error types for target resolution.

use thiserror::Error;

/// Errors raised while resolving or constructing a [`Target`](crate::Target).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("No engine specified; use --engine or set core.engine")]
    MissingEngine,

    #[error("Cannot find target \"{0}\"")]
    UnknownTarget(String),

    #[error("No URI associated with target \"{0}\"")]
    TargetMissingUri(String),

    #[error("Invalid database URI \"{uri}\": {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Unknown engine \"{0}\"")]
    UnknownEngine(String),

    #[error("Invalid port \"{0}\"")]
    InvalidPort(String),
}

pub type Result<T> = std::result::Result<T, TargetError>;
