use crate::{
    ChannelEpoch, DocumentId, FlushToken, PollToken, Scope, StatusNotice, StreamEvent,
    StreamOutcome,
};

/// Outcome of one pull query. Errors are carried as text; the core only needs
/// to know that the request did not produce an answer.
pub type PollResult = Result<Vec<StatusNotice>, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A new chat request is about to deliver events.
    StreamStarted,
    StreamEvent(StreamEvent),
    /// Coalescing window elapsed.
    ContentFlushDue(FlushToken),
    /// The chat request completed, failed, or was aborted.
    StreamEnded(StreamOutcome),
    /// Switch to a new workspace/conversation, tearing down the previous one.
    ScopeActivated(Scope),
    /// The view owning the active scope closed.
    ScopeClosed,
    /// The client began uploading a document.
    UploadStarted {
        document_id: DocumentId,
        conversation_id: Option<String>,
    },
    /// The upload never reached the backend; stop waiting for its status.
    UploadFailed { document_id: DocumentId },
    ChannelOpened { epoch: ChannelEpoch },
    ChannelLost { epoch: ChannelEpoch, reason: String },
    ReconnectDue { epoch: ChannelEpoch },
    /// Raw text frame from the push channel.
    PushFrame { epoch: ChannelEpoch, frame: String },
    PollDue { token: PollToken },
    PollCompleted { token: PollToken, result: PollResult },
    /// Answer to a single-document lookup issued for `scope`.
    DocumentStatusFetched {
        scope: Scope,
        document_id: DocumentId,
        result: Result<StatusNotice, String>,
    },
}
