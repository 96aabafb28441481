use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;

use crate::DocumentId;

/// Processing lifecycle of an uploaded document.
///
/// Ordered `Pending < Processing < {Completed, Failed}`. The two terminal
/// values are mutually exclusive and compare as unordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    #[serde(alias = "ERROR")]
    Failed,
}

impl DocumentStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

impl PartialOrd for DocumentStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NoticeError {
    #[error("malformed status payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Candidate status for one document, as reported by the push channel or the
/// pull query. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusNotice {
    #[serde(alias = "id", deserialize_with = "crate::ids::required")]
    pub document_id: DocumentId,
    #[serde(deserialize_with = "crate::ids::required")]
    pub workspace_id: String,
    #[serde(default, deserialize_with = "crate::ids::optional")]
    pub conversation_id: Option<String>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusNotice {
    pub fn new(
        document_id: impl Into<DocumentId>,
        workspace_id: impl Into<String>,
        status: DocumentStatus,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            workspace_id: workspace_id.into(),
            conversation_id: None,
            status,
            message: None,
            error: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn decode(frame: &str) -> Result<Self, NoticeError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Which channel last moved a tracked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Optimistic record created when the client started the upload.
    Upload,
    Push,
    Pull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDocument {
    pub id: DocumentId,
    pub workspace_id: String,
    pub conversation_id: Option<String>,
    pub status: DocumentStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    pub last_source: UpdateSource,
}
