//! Startup-time failures and their exit codes (§6: 0 orderly, 1 config
//! error, 2 bind failure, 3 fatal bootstrap failure).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

impl NodeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::Config(_) => 1,
            NodeError::Bind { .. } => 2,
            NodeError::Bootstrap(_) => 3,
        }
    }
}
