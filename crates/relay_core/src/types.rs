use serde::Deserialize;

use crate::StatusNotice;

pub type DocumentId = String;

/// Retrieved passage backing a chat answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chunk {
    #[serde(deserialize_with = "crate::ids::required")]
    pub document_id: DocumentId,
    pub chunk_text: String,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub score: f64,
}

/// One decoded event of a streamed chat response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "content")]
    ContentDelta { text: String },
    #[serde(rename = "sources")]
    SourceSet { relevant_chunks: Vec<Chunk> },
    #[serde(rename = "intent")]
    IntentSignal { intent: String },
    #[serde(rename = "conversation_id")]
    ConversationId {
        #[serde(deserialize_with = "crate::ids::required")]
        id: String,
    },
    /// Any event type this client does not know about.
    #[serde(other)]
    Unrecognized,
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::ContentDelta { text: text.into() }
    }

    pub fn sources(relevant_chunks: Vec<Chunk>) -> Self {
        Self::SourceSet { relevant_chunks }
    }

    pub fn intent(label: impl Into<String>) -> Self {
        Self::IntentSignal {
            intent: label.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentDelta { .. } => "content",
            Self::SourceSet { .. } => "sources",
            Self::IntentSignal { .. } => "intent",
            Self::ConversationId { .. } => "conversation_id",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// How a chat request ended. Exactly one of these reaches `finish()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { conversation_id: Option<String> },
    Failed { message: String },
    Aborted,
}

/// Workspace, optionally narrowed to one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub workspace_id: String,
    pub conversation_id: Option<String>,
}

impl Scope {
    pub fn workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Whether a status notice belongs to this scope.
    ///
    /// A notice without a conversation id is not excluded by a conversation
    /// filter; only a conflicting id is.
    pub fn admits(&self, notice: &StatusNotice) -> bool {
        self.contains(&notice.workspace_id, notice.conversation_id.as_deref())
    }

    /// Same rule as [`Scope::admits`], for a bare workspace/conversation pair.
    pub fn contains(&self, workspace_id: &str, conversation_id: Option<&str>) -> bool {
        if workspace_id != self.workspace_id {
            return false;
        }
        match (self.conversation_id.as_deref(), conversation_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}
