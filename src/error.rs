use thiserror::Error;

/// Errors raised while wrapping a delegate CNI invocation
#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("failed to read stdin: {0}")]
    InputRead(#[source] std::io::Error),

    #[error("failed to parse network configuration: {0}")]
    InputParse(#[from] serde_json::Error),

    #[error("malformed CNI_ARGS segment {segment:?}: missing '='")]
    ArgsParse { segment: String },

    #[error("failed to build kubernetes client: {0}")]
    Connection(String),

    #[error("CNI_NETNS not set")]
    NamespaceMissing,

    #[error("failed to get pod {namespace}/{name}: {reason}")]
    Lookup {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("failed to read environment variable {key}: {reason}")]
    EnvironmentRead { key: String, reason: String },

    #[error("failed to set environment variable {key}: {reason}")]
    EnvironmentMutation { key: String, reason: String },

    #[error("failed to launch delegate {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write audit log {path}: {source}")]
    LogWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for wrapper operations
pub type Result<T, E = WrapperError> = std::result::Result<T, E>;
