use thiserror::Error;

/// Error taxonomy shared by the routing, RPC, and cache layers.
#[derive(Debug, Error, Clone)]
pub enum DhtError {
    #[error("transport error contacting {peer}: {reason}")]
    Transport { peer: String, reason: String },

    #[error("no live pointer could make progress toward the target")]
    RouteExhausted,

    #[error("hop limit exceeded while routing")]
    HopLimitExceeded,

    #[error("{peer} is not the owner of the requested key")]
    NotOwner { peer: String },

    #[error("request rejected: too many concurrent outbound forwards")]
    Overloaded,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("deadline exceeded before the operation completed")]
    DeadlineExceeded,
}

impl DhtError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DhtError::Transport { .. } | DhtError::Overloaded | DhtError::NotOwner { .. }
        )
    }
}
