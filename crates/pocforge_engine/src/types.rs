use std::fmt;

use pocforge_core::{CollectionProgress, CollectionResult, DiscoveredUrl};

/// Events emitted by one collection run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Progress(CollectionProgress),
    UrlFound(DiscoveredUrl),
    Completed(CollectionResult),
    Error(CollectError),
}

/// Terminal failure of a collection run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("collection cancelled by user")]
    Cancelled { partial: CollectionResult },
    #[error("browser session could not be created: {0}")]
    Session(String),
    #[error("collection failed: {message}")]
    Pipeline {
        message: String,
        partial: CollectionResult,
    },
}

impl CollectError {
    /// Data gathered before the run stopped, when there is any.
    pub fn partial(&self) -> Option<&CollectionResult> {
        match self {
            CollectError::Cancelled { partial } | CollectError::Pipeline { partial, .. } => {
                Some(partial).filter(|p| !p.content.is_empty() || !p.urls.is_empty())
            }
            CollectError::Session(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Cancelled,
    SessionClosed,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::SessionClosed => write!(f, "session closed"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
