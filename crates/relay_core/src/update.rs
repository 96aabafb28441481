use relay_logging::{relay_debug, relay_info, relay_warn};

use crate::{Effect, Msg, SessionState, StatusNotice, StatusUpdate, UpdateSource};

/// Pure update function: applies a message to state and returns any effects.
///
/// The caller must feed every message through one serialized queue; no two
/// calls may interleave.
pub fn update(mut state: SessionState, msg: Msg) -> (SessionState, Vec<Effect>) {
    let effects = match msg {
        Msg::StreamStarted => {
            state.stream.start();
            Vec::new()
        }
        Msg::StreamEvent(event) => state.stream.handle_event(event),
        Msg::ContentFlushDue(token) => state.stream.flush_due(token),
        Msg::StreamEnded(outcome) => state.stream.finish(outcome),
        Msg::ScopeActivated(scope) => {
            let mut effects = teardown_scope(&mut state);
            relay_info!(
                "activating workspace {} (conversation {:?})",
                scope.workspace_id,
                scope.conversation_id
            );
            state.scope = Some(scope.clone());
            state.reconciler.activate(scope.clone());
            effects.extend(state.listener.subscribe(scope.clone()));
            effects.extend(state.poller.poll(scope));
            effects
        }
        Msg::ScopeClosed => teardown_scope(&mut state),
        Msg::UploadStarted {
            document_id,
            conversation_id,
        } => {
            state.reconciler.track_upload(document_id, conversation_id);
            state.poller.kick()
        }
        Msg::UploadFailed { document_id } => {
            state.reconciler.untrack(&document_id);
            Vec::new()
        }
        Msg::ChannelOpened { epoch } => {
            state.listener.channel_opened(epoch);
            Vec::new()
        }
        Msg::ChannelLost { epoch, reason } => {
            let mut effects = state.listener.channel_lost(epoch, &reason);
            if !effects.is_empty() {
                // Pull covers the gap until the push channel is back.
                effects.extend(state.poller.kick());
            }
            effects
        }
        Msg::ReconnectDue { epoch } => state.listener.reconnect_due(epoch),
        Msg::PushFrame { epoch, frame } => match state.listener.accept_frame(epoch, &frame) {
            Some(notice) => state
                .reconciler
                .apply_update(StatusUpdate::from_notice(notice, UpdateSource::Push)),
            None => Vec::new(),
        },
        Msg::PollDue { token } => state.poller.poll_due(token),
        Msg::PollCompleted { token, result } => {
            if !state.poller.is_current(token) {
                return (state, Vec::new());
            }
            let mut effects = Vec::new();
            if let (Ok(pending), Some(scope)) = (&result, &state.scope) {
                for document_id in state.reconciler.unsettled_missing_from(pending) {
                    effects.push(Effect::FetchDocumentStatus {
                        scope: scope.clone(),
                        document_id,
                    });
                }
                for notice in pending.iter().filter(|notice| !notice.status.is_terminal()) {
                    effects.extend(state.reconciler.apply_update(StatusUpdate::from_notice(
                        notice.clone(),
                        UpdateSource::Pull,
                    )));
                }
            }
            effects.extend(state.poller.poll_completed(token, &result));
            effects
        }
        Msg::DocumentStatusFetched {
            scope,
            document_id,
            result,
        } => {
            if state.scope.as_ref() != Some(&scope) {
                relay_debug!("dropping lookup of {} made for an earlier scope", document_id);
                return (state, Vec::new());
            }
            document_status_fetched(&mut state, &document_id, result)
        }
    };

    (state, effects)
}

/// Settles a looked-up document, or keeps polling with growing delays while
/// it is still unsettled.
fn document_status_fetched(
    state: &mut SessionState,
    document_id: &str,
    result: Result<StatusNotice, String>,
) -> Vec<Effect> {
    match result {
        Ok(notice) => {
            let mut effects = state
                .reconciler
                .apply_update(StatusUpdate::from_notice(notice, UpdateSource::Pull));
            match state.reconciler.status_of(document_id) {
                Some(status) if !status.is_terminal() => {
                    // Registered but unfinished; the pull list will show it soon.
                    effects.extend(state.poller.retry_later());
                }
                _ => state.poller.settle_retries(),
            }
            effects
        }
        Err(message) => {
            relay_warn!("status lookup for {} failed: {}", document_id, message);
            if state.reconciler.record_lookup_failure(document_id) {
                state.poller.retry_later()
            } else {
                Vec::new()
            }
        }
    }
}

/// Stops polling, drops the push subscription and forgets tracked documents
/// of the active scope, so nothing from it can reach the next one.
fn teardown_scope(state: &mut SessionState) -> Vec<Effect> {
    let mut effects = state.poller.stop();
    effects.extend(state.listener.unsubscribe());
    if let Some(previous) = state.scope.take() {
        relay_info!("tearing down workspace {}", previous.workspace_id);
        state.reconciler.reset(&previous);
    }
    effects
}
