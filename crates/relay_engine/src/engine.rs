use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use relay_core::{
    update, ChannelEpoch, DocumentId, Effect, Msg, Scope, SessionState, StreamEvent,
    StreamOutcome, Timings,
};
use relay_logging::{relay_debug, relay_info, relay_trace, relay_warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatFrame, ChatLineDecoder};
use crate::{PushConnector, StatusSource, ViewSink};

/// Collaborators the coordinator talks to.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn StatusSource>,
    pub connector: Arc<dyn PushConnector>,
    pub sink: Arc<dyn ViewSink>,
}

enum EngineCommand {
    Dispatch(Msg),
    Shutdown,
}

type CommandSender = mpsc::UnboundedSender<EngineCommand>;

/// Front door to the coordinator task. Every call enqueues one message; the
/// task applies them strictly in order.
#[derive(Clone)]
pub struct CoordinatorHandle {
    cmd_tx: CommandSender,
}

impl CoordinatorHandle {
    /// Starts the coordinator on the current Tokio runtime.
    pub fn spawn(timings: Timings, services: Services) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let driver = Driver {
            state: SessionState::new(timings),
            services,
            cmd_tx: cmd_tx.clone(),
            poll_cancel: shutdown.child_token(),
            channel_cancel: shutdown.child_token(),
            shutdown,
        };
        tokio::spawn(driver.run(cmd_rx));
        Self { cmd_tx }
    }

    pub fn activate_scope(&self, scope: Scope) {
        self.dispatch(Msg::ScopeActivated(scope));
    }

    pub fn close_scope(&self) {
        self.dispatch(Msg::ScopeClosed);
    }

    pub fn upload_started(
        &self,
        document_id: impl Into<DocumentId>,
        conversation_id: Option<String>,
    ) {
        self.dispatch(Msg::UploadStarted {
            document_id: document_id.into(),
            conversation_id,
        });
    }

    /// The upload request for `document_id` failed; its status will never
    /// arrive.
    pub fn upload_failed(&self, document_id: impl Into<DocumentId>) {
        self.dispatch(Msg::UploadFailed {
            document_id: document_id.into(),
        });
    }

    pub fn start_stream(&self) {
        self.dispatch(Msg::StreamStarted);
    }

    pub fn stream_event(&self, event: StreamEvent) {
        self.dispatch(Msg::StreamEvent(event));
    }

    pub fn complete_stream(&self, conversation_id: Option<String>) {
        self.dispatch(Msg::StreamEnded(StreamOutcome::Completed { conversation_id }));
    }

    pub fn fail_stream(&self, message: impl Into<String>) {
        self.dispatch(Msg::StreamEnded(StreamOutcome::Failed {
            message: message.into(),
        }));
    }

    /// Ends the current stream on the user's request. Anything the transport
    /// still delivers afterwards is dropped.
    pub fn abort_stream(&self) {
        self.dispatch(Msg::StreamEnded(StreamOutcome::Aborted));
    }

    /// Drives one chat response body through the coordinator: starts a
    /// stream, forwards every decoded event and ends it exactly once.
    pub async fn pump_chat<S, B, E>(&self, body: S)
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        let mut decoder = ChatLineDecoder::new();
        self.start_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(bytes.as_ref()) {
                        self.forward(frame);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Err(err) => {
                    relay_warn!("chat stream failed: {}", err);
                    self.fail_stream(err.to_string());
                    return;
                }
            }
        }

        for frame in decoder.finish() {
            self.forward(frame);
        }
        self.complete_stream(decoder.conversation_id().map(str::to_string));
    }

    /// Stops the coordinator and everything it spawned.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }

    fn forward(&self, frame: ChatFrame) {
        if let ChatFrame::Event(event) = frame {
            self.stream_event(event);
        }
    }

    fn dispatch(&self, msg: Msg) {
        let _ = self.cmd_tx.send(EngineCommand::Dispatch(msg));
    }
}

struct Driver {
    state: SessionState,
    services: Services,
    cmd_tx: CommandSender,
    shutdown: CancellationToken,
    /// Parent of poll requests, poll timers and document lookups.
    poll_cancel: CancellationToken,
    /// Parent of the push connection and its reconnect timer.
    channel_cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>) {
        while let Some(command) = cmd_rx.recv().await {
            match command {
                EngineCommand::Dispatch(msg) => self.apply(msg),
                EngineCommand::Shutdown => break,
            }
        }
        relay_info!("coordinator shutting down");
        self.shutdown.cancel();
    }

    fn apply(&mut self, msg: Msg) {
        relay_trace!("applying {:?}", msg);
        let state = std::mem::take(&mut self.state);
        let (next, effects) = update(state, msg);
        self.state = next;
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        let sink = self.services.sink.clone();
        match effect {
            Effect::ScheduleContentFlush { token, delay } => {
                self.after(delay, Msg::ContentFlushDue(token), self.shutdown.clone());
            }
            Effect::EmitContent(text) => sink.content(&text),
            Effect::EmitSources(chunks) => sink.sources(&chunks),
            Effect::EmitIntent(intent) => sink.intent(&intent),
            Effect::StreamFinished(outcome) => sink.stream_finished(&outcome),
            Effect::OpenChannel { scope, epoch } => self.open_channel(scope, epoch),
            Effect::CloseChannel => {
                relay_debug!("closing push channel");
                self.channel_cancel = renew(&self.shutdown, &self.channel_cancel);
            }
            Effect::ScheduleReconnect { epoch, delay } => {
                relay_info!("reconnecting push channel in {:?}", delay);
                self.after(delay, Msg::ReconnectDue { epoch }, self.channel_cancel.clone());
            }
            Effect::IssuePoll { scope, token } => {
                let source = self.services.source.clone();
                self.spawn_under(self.poll_cancel.clone(), async move {
                    let result = source
                        .pending(&scope)
                        .await
                        .map_err(|err| err.to_string());
                    Msg::PollCompleted { token, result }
                });
            }
            Effect::SchedulePoll { token, delay } => {
                relay_debug!("next status poll in {:?}", delay);
                self.after(delay, Msg::PollDue { token }, self.poll_cancel.clone());
            }
            Effect::CancelPoll => {
                self.poll_cancel = renew(&self.shutdown, &self.poll_cancel);
            }
            Effect::FetchDocumentStatus { scope, document_id } => {
                let source = self.services.source.clone();
                self.spawn_under(self.poll_cancel.clone(), async move {
                    let result = source
                        .document_status(&document_id)
                        .await
                        .map_err(|err| err.to_string());
                    Msg::DocumentStatusFetched {
                        scope,
                        document_id,
                        result,
                    }
                });
            }
            Effect::DocumentSettled {
                document_id,
                status,
                error,
            } => sink.document_settled(&document_id, status, error.as_deref()),
        }
    }

    fn open_channel(&mut self, scope: Scope, epoch: ChannelEpoch) {
        relay_info!(
            "opening push channel for workspace {} (epoch {})",
            scope.workspace_id,
            epoch
        );
        self.channel_cancel = renew(&self.shutdown, &self.channel_cancel);
        let connector = self.services.connector.clone();
        let cmd_tx = self.cmd_tx.clone();
        let cancel = self.channel_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = run_channel(connector, scope, epoch, cmd_tx) => {}
            }
        });
    }

    /// Posts `msg` back onto the queue after `delay` unless `cancel` fires first.
    fn after(&self, delay: Duration, msg: Msg, cancel: CancellationToken) {
        self.spawn_under(cancel, async move {
            tokio::time::sleep(delay).await;
            msg
        });
    }

    fn spawn_under<F>(&self, cancel: CancellationToken, work: F)
    where
        F: std::future::Future<Output = Msg> + Send + 'static,
    {
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                msg = work => post(&cmd_tx, msg),
            }
        });
    }
}

async fn run_channel(
    connector: Arc<dyn PushConnector>,
    scope: Scope,
    epoch: ChannelEpoch,
    cmd_tx: CommandSender,
) {
    let mut frames = match connector.connect(&scope).await {
        Ok(frames) => frames,
        Err(err) => {
            relay_warn!("push channel connect failed: {}", err);
            post(&cmd_tx, Msg::ChannelLost {
                epoch,
                reason: err.to_string(),
            });
            return;
        }
    };
    post(&cmd_tx, Msg::ChannelOpened { epoch });

    let reason = loop {
        match frames.next().await {
            Some(Ok(frame)) => post(&cmd_tx, Msg::PushFrame { epoch, frame }),
            Some(Err(err)) => break err.to_string(),
            None => break "closed by server".to_string(),
        }
    };
    relay_warn!("push channel lost: {}", reason);
    post(&cmd_tx, Msg::ChannelLost { epoch, reason });
}

/// Cancels everything under `current` and hands back a fresh child of `root`.
fn renew(root: &CancellationToken, current: &CancellationToken) -> CancellationToken {
    current.cancel();
    root.child_token()
}

fn post(cmd_tx: &CommandSender, msg: Msg) {
    let _ = cmd_tx.send(EngineCommand::Dispatch(msg));
}
