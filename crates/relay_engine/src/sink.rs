use relay_core::{Chunk, DocumentStatus, StreamOutcome};
use tokio::sync::mpsc;

use crate::ViewEvent;

/// Receives everything the view layer needs to render. Called from the
/// coordinator task, so implementations must return quickly.
pub trait ViewSink: Send + Sync {
    fn content(&self, text: &str);
    fn sources(&self, chunks: &[Chunk]);
    fn intent(&self, intent: &str);
    fn stream_finished(&self, outcome: &StreamOutcome);
    fn document_settled(&self, document_id: &str, status: DocumentStatus, error: Option<&str>);
}

pub struct ChannelViewSink {
    tx: mpsc::UnboundedSender<ViewEvent>,
}

impl ChannelViewSink {
    pub fn new(tx: mpsc::UnboundedSender<ViewEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ViewEvent) {
        let _ = self.tx.send(event);
    }
}

impl ViewSink for ChannelViewSink {
    fn content(&self, text: &str) {
        self.send(ViewEvent::Content(text.to_string()));
    }

    fn sources(&self, chunks: &[Chunk]) {
        self.send(ViewEvent::Sources(chunks.to_vec()));
    }

    fn intent(&self, intent: &str) {
        self.send(ViewEvent::Intent(intent.to_string()));
    }

    fn stream_finished(&self, outcome: &StreamOutcome) {
        self.send(ViewEvent::StreamFinished(outcome.clone()));
    }

    fn document_settled(&self, document_id: &str, status: DocumentStatus, error: Option<&str>) {
        self.send(ViewEvent::DocumentSettled {
            document_id: document_id.to_string(),
            status,
            error: error.map(str::to_string),
        });
    }
}
