use magnifier_core::{FrameError, RequestId};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    NotOpen,
    #[error("connection closed")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("reply for request {id} dropped: connection closed")]
    ReplyDropped { id: RequestId },
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service url '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid request timeout '{0}': expected milliseconds")]
    InvalidTimeout(String),
}
