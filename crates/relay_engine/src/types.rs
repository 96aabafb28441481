use std::fmt;

use relay_core::{Chunk, DocumentId, DocumentStatus, StreamOutcome};

/// What the view layer is told, in the order the coordinator produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Content(String),
    Sources(Vec<Chunk>),
    Intent(String),
    StreamFinished(StreamOutcome),
    DocumentSettled {
        document_id: DocumentId,
        status: DocumentStatus,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub kind: FailureKind,
    pub message: String,
}

impl QueryError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "undecodable response"),
        }
    }
}

/// Push connection failures. They only ever feed the reconnect timer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("connection dropped: {0}")]
    Transport(String),
}
