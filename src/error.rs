use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the allowlist binary. Each variant carries a
/// short greppable prefix (`config:`, `io:`, `decode:`) in its `Display` so
/// operators can `grep` a log for the failure class.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
}

impl AppError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            context: context.into(),
            source,
        }
    }

    /// Config errors exit 2; everything else fatal exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Io { .. } | AppError::Decode(_) => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CIDR prefix {prefix:?}: {source}")]
    Cidr {
        prefix: String,
        #[source]
        source: ipnetwork::IpNetworkError,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid reference time {value:?}: {source}")]
    InvalidNow {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to spawn decoder for {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoder for {path:?} exited with status {status}")]
    ExitStatus { path: PathBuf, status: i32 },

    #[error("error reading decoder output for {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path:?}: {reason}")]
    MalformedRecord { path: PathBuf, reason: String },
}
