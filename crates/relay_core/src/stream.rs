use std::time::Duration;

use relay_logging::{relay_debug, relay_trace, relay_warn};

use crate::{Chunk, Effect, StreamEvent, StreamOutcome};

/// Identifies one scheduled content flush. Only the most recently scheduled
/// token is honoured; anything else is a cancelled timer firing late.
pub type FlushToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Finished,
}

/// Batches the events of one chat request into three rate-limited outputs:
/// content snapshots, source lists and intent labels.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProcessor {
    phase: StreamPhase,
    content: String,
    /// Content appended since the last delivered snapshot.
    content_dirty: bool,
    sources: Vec<Chunk>,
    conversation_id: Option<String>,
    pending_flush: Option<FlushToken>,
    next_token: FlushToken,
    coalesce_window: Duration,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl StreamProcessor {
    pub fn new(coalesce_window: Duration) -> Self {
        Self {
            phase: StreamPhase::Idle,
            content: String::new(),
            content_dirty: false,
            sources: Vec::new(),
            conversation_id: None,
            pending_flush: None,
            next_token: 0,
            coalesce_window,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sources(&self) -> &[Chunk] {
        &self.sources
    }

    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush.is_some()
    }

    /// Resets all buffers for a new request.
    ///
    /// Starting while a request is still streaming discards its buffers.
    pub fn start(&mut self) {
        if self.phase == StreamPhase::Streaming {
            relay_warn!(
                "stream restarted before finish; discarding {} buffered chars and {} sources",
                self.content.len(),
                self.sources.len()
            );
        }
        self.clear();
        self.phase = StreamPhase::Streaming;
    }

    pub fn handle_event(&mut self, event: StreamEvent) -> Vec<Effect> {
        if self.phase != StreamPhase::Streaming {
            relay_debug!(
                "dropping {} event outside an active stream ({:?})",
                event.kind(),
                self.phase
            );
            return Vec::new();
        }

        match event {
            StreamEvent::ContentDelta { text } => {
                if text.is_empty() {
                    return Vec::new();
                }
                self.content.push_str(&text);
                self.content_dirty = true;
                self.schedule_flush()
            }
            StreamEvent::SourceSet { relevant_chunks } => {
                // Sources are rare; they skip the coalescing window.
                self.sources = relevant_chunks;
                vec![Effect::EmitSources(self.sources.clone())]
            }
            StreamEvent::IntentSignal { intent } => vec![Effect::EmitIntent(intent)],
            StreamEvent::ConversationId { id } => {
                self.conversation_id = Some(id);
                Vec::new()
            }
            StreamEvent::Unrecognized => Vec::new(),
        }
    }

    /// Called when the coalescing window of `token` elapses.
    pub fn flush_due(&mut self, token: FlushToken) -> Vec<Effect> {
        if self.pending_flush != Some(token) {
            relay_trace!("ignoring stale content flush {}", token);
            return Vec::new();
        }
        self.pending_flush = None;
        self.flush_content()
    }

    /// Ends the request: cancels the pending flush, delivers any content not
    /// yet seen downstream, and signals the outcome. Only the first call per
    /// request has any effect.
    pub fn finish(&mut self, outcome: StreamOutcome) -> Vec<Effect> {
        if self.phase != StreamPhase::Streaming {
            relay_debug!("ignoring stream end {:?} in phase {:?}", outcome, self.phase);
            return Vec::new();
        }

        self.pending_flush = None;
        let mut effects = self.flush_content();

        let outcome = match outcome {
            StreamOutcome::Completed {
                conversation_id: None,
            } => StreamOutcome::Completed {
                conversation_id: self.conversation_id.take(),
            },
            other => other,
        };

        self.clear();
        self.phase = StreamPhase::Finished;
        effects.push(Effect::StreamFinished(outcome));
        effects
    }

    fn schedule_flush(&mut self) -> Vec<Effect> {
        if self.pending_flush.is_some() {
            return Vec::new();
        }
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.pending_flush = Some(token);
        vec![Effect::ScheduleContentFlush {
            token,
            delay: self.coalesce_window,
        }]
    }

    fn flush_content(&mut self) -> Vec<Effect> {
        if !self.content_dirty {
            return Vec::new();
        }
        self.content_dirty = false;
        vec![Effect::EmitContent(self.content.clone())]
    }

    fn clear(&mut self) {
        self.content.clear();
        self.content_dirty = false;
        self.sources.clear();
        self.conversation_id = None;
        self.pending_flush = None;
    }
}
