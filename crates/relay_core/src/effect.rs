use std::time::Duration;

use crate::{
    ChannelEpoch, Chunk, DocumentId, DocumentStatus, FlushToken, PollToken, Scope, StreamOutcome,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver `Msg::ContentFlushDue(token)` after `delay`.
    ScheduleContentFlush { token: FlushToken, delay: Duration },
    /// Full accumulated answer text so far.
    EmitContent(String),
    EmitSources(Vec<Chunk>),
    EmitIntent(String),
    StreamFinished(StreamOutcome),
    OpenChannel { scope: Scope, epoch: ChannelEpoch },
    CloseChannel,
    /// Deliver `Msg::ReconnectDue { epoch }` after `delay`.
    ScheduleReconnect { epoch: ChannelEpoch, delay: Duration },
    IssuePoll { scope: Scope, token: PollToken },
    /// Deliver `Msg::PollDue { token }` after `delay`.
    SchedulePoll { token: PollToken, delay: Duration },
    /// Drop every scheduled or in-flight poll request.
    CancelPoll,
    /// Look up one document; answer with `Msg::DocumentStatusFetched`
    /// carrying the same scope.
    FetchDocumentStatus { scope: Scope, document_id: DocumentId },
    /// First terminal status of a document in the active scope.
    DocumentSettled {
        document_id: DocumentId,
        status: DocumentStatus,
        error: Option<String>,
    },
}
