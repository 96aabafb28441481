use pretty_assertions::assert_eq;
use relay_core::{
    update, DocumentStatus, Effect, Msg, Scope, SessionState, StatusNotice, StreamEvent,
    StreamOutcome, Timings, MAX_LOOKUP_FAILURES,
};

fn init_logging() {
    relay_logging::initialize_for_tests();
}

fn apply(state: SessionState, msgs: Vec<Msg>) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();
    let mut state = state;
    for msg in msgs {
        let (next, produced) = update(state, msg);
        state = next;
        effects.extend(produced);
    }
    (state, effects)
}

fn frame(id: &str, workspace: &str, status: &str) -> String {
    format!(r#"{{"document_id":"{id}","workspace_id":"{workspace}","status":"{status}"}}"#)
}

/// Activates `workspace` and reports the epoch and poll token it produced.
fn activated(workspace: &str) -> (SessionState, u64, u64) {
    let (state, effects) = update(
        SessionState::new(Timings::default()),
        Msg::ScopeActivated(Scope::workspace(workspace)),
    );
    let epoch = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::OpenChannel { epoch, .. } => Some(*epoch),
            _ => None,
        })
        .expect("channel opened");
    let token = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::IssuePoll { token, .. } => Some(*token),
            _ => None,
        })
        .expect("poll issued");
    let (state, _) = update(state, Msg::ChannelOpened { epoch });
    (state, epoch, token)
}

fn uploaded(state: SessionState, document_id: &str) -> SessionState {
    let (state, _) = update(
        state,
        Msg::UploadStarted {
            document_id: document_id.into(),
            conversation_id: None,
        },
    );
    state
}

fn scheduled_poll(effects: &[Effect]) -> Option<(u64, u128)> {
    effects.iter().find_map(|effect| match effect {
        Effect::SchedulePoll { token, delay } => Some((*token, delay.as_millis())),
        _ => None,
    })
}

fn issued_poll(effects: &[Effect]) -> Option<u64> {
    effects.iter().find_map(|effect| match effect {
        Effect::IssuePoll { token, .. } => Some(*token),
        _ => None,
    })
}

fn lookup_failed(scope: &Scope, document_id: &str) -> Msg {
    Msg::DocumentStatusFetched {
        scope: scope.clone(),
        document_id: document_id.into(),
        result: Err("http status 404".into()),
    }
}

fn settlements(effects: &[Effect]) -> Vec<(String, DocumentStatus)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::DocumentSettled {
                document_id,
                status,
                ..
            } => Some((document_id.clone(), *status)),
            _ => None,
        })
        .collect()
}

#[test]
fn activation_subscribes_and_polls() {
    init_logging();
    let (_state, effects) = update(
        SessionState::new(Timings::default()),
        Msg::ScopeActivated(Scope::workspace("ws-a")),
    );
    assert_eq!(
        effects,
        vec![
            Effect::OpenChannel {
                scope: Scope::workspace("ws-a"),
                epoch: 1
            },
            Effect::IssuePoll {
                scope: Scope::workspace("ws-a"),
                token: 1
            },
        ]
    );
}

#[test]
fn push_completion_beats_late_poll_answer() {
    init_logging();
    let (state, epoch, token) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::UploadStarted {
            document_id: "doc-1".into(),
            conversation_id: None,
        },
    );

    let (state, effects) = apply(
        state,
        vec![
            Msg::PushFrame {
                epoch,
                frame: frame("doc-1", "ws-a", "COMPLETED"),
            },
            Msg::PollCompleted {
                token,
                result: Ok(vec![StatusNotice::new(
                    "doc-1",
                    "ws-a",
                    DocumentStatus::Processing,
                )]),
            },
        ],
    );

    assert_eq!(
        settlements(&effects),
        vec![("doc-1".to_string(), DocumentStatus::Completed)]
    );
    assert_eq!(
        state.reconciler().status_of("doc-1"),
        Some(DocumentStatus::Completed)
    );
}

#[test]
fn frames_from_another_workspace_change_nothing() {
    init_logging();
    let (state, epoch, _) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::UploadStarted {
            document_id: "doc-1".into(),
            conversation_id: None,
        },
    );
    let before = state.clone();

    let (state, effects) = update(
        state,
        Msg::PushFrame {
            epoch,
            frame: frame("doc-1", "ws-b", "COMPLETED"),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn scope_change_tears_down_before_activating() {
    init_logging();
    let (state, old_epoch, old_token) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::UploadStarted {
            document_id: "doc-1".into(),
            conversation_id: None,
        },
    );

    let (state, effects) = update(state, Msg::ScopeActivated(Scope::workspace("ws-b")));
    assert_eq!(effects[0], Effect::CancelPoll);
    assert_eq!(effects[1], Effect::CloseChannel);
    assert!(matches!(
        &effects[2],
        Effect::OpenChannel { scope, .. } if scope.workspace_id == "ws-b"
    ));
    assert!(matches!(
        &effects[3],
        Effect::IssuePoll { scope, .. } if scope.workspace_id == "ws-b"
    ));
    assert!(state.reconciler().document("doc-1").is_none());

    // Late traffic from the old scope is ignored.
    let (state, effects) = apply(
        state,
        vec![
            Msg::PushFrame {
                epoch: old_epoch,
                frame: frame("doc-1", "ws-a", "COMPLETED"),
            },
            Msg::PollCompleted {
                token: old_token,
                result: Ok(vec![StatusNotice::new(
                    "doc-9",
                    "ws-a",
                    DocumentStatus::Processing,
                )]),
            },
        ],
    );
    assert!(effects.is_empty());
    assert!(state.reconciler().document("doc-9").is_none());
}

#[test]
fn closing_scope_stops_everything() {
    init_logging();
    let (state, _, _) = activated("ws-a");
    let (state, effects) = update(state, Msg::ScopeClosed);

    assert_eq!(effects, vec![Effect::CancelPoll, Effect::CloseChannel]);
    assert!(state.scope().is_none());
    assert!(!state.poller().is_active());
    assert!(!state.listener().is_subscribed());

    let (_, effects) = update(state, Msg::ScopeClosed);
    assert!(effects.is_empty());
}

#[test]
fn document_missing_from_poll_is_looked_up() {
    init_logging();
    let (state, _, token) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::UploadStarted {
            document_id: "doc-1".into(),
            conversation_id: None,
        },
    );

    let (state, effects) = update(
        state,
        Msg::PollCompleted {
            token,
            result: Ok(Vec::new()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::FetchDocumentStatus {
            scope: Scope::workspace("ws-a"),
            document_id: "doc-1".into()
        }]
    );

    let (state, effects) = update(
        state,
        Msg::DocumentStatusFetched {
            scope: Scope::workspace("ws-a"),
            document_id: "doc-1".into(),
            result: Ok(StatusNotice::new("doc-1", "ws-a", DocumentStatus::Failed)
                .with_error("corrupt file")),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::DocumentSettled {
            document_id: "doc-1".into(),
            status: DocumentStatus::Failed,
            error: Some("corrupt file".into()),
        }]
    );
    assert_eq!(
        state.reconciler().status_of("doc-1"),
        Some(DocumentStatus::Failed)
    );
}

#[test]
fn failing_lookups_back_off_then_give_up() {
    init_logging();
    let scope = Scope::workspace("ws-a");
    let (state, _, first_token) = activated("ws-a");
    let mut state = uploaded(state, "doc-1");
    let mut token = first_token;
    let mut delays = Vec::new();

    for _ in 1..MAX_LOOKUP_FAILURES {
        let (next, effects) = apply(
            state,
            vec![
                Msg::PollCompleted {
                    token,
                    result: Ok(Vec::new()),
                },
                lookup_failed(&scope, "doc-1"),
            ],
        );
        let (due, delay) = scheduled_poll(&effects).expect("retry scheduled");
        delays.push(delay);
        let (next, effects) = update(next, Msg::PollDue { token: due });
        token = issued_poll(&effects).expect("poll issued");
        state = next;
    }
    assert_eq!(delays, vec![3000, 4500, 6750, 10125]);

    let (state, effects) = apply(
        state,
        vec![
            Msg::PollCompleted {
                token,
                result: Ok(Vec::new()),
            },
            lookup_failed(&scope, "doc-1"),
        ],
    );
    assert_eq!(
        effects,
        vec![Effect::FetchDocumentStatus {
            scope,
            document_id: "doc-1".into()
        }]
    );
    assert!(state.reconciler().document("doc-1").is_none());
    assert!(!state.poller().is_active());
}

#[test]
fn lookup_of_unfinished_document_keeps_polling() {
    init_logging();
    let scope = Scope::workspace("ws-a");
    let (state, _, token) = activated("ws-a");
    let state = uploaded(state, "doc-1");

    let (state, effects) = apply(
        state,
        vec![
            Msg::PollCompleted {
                token,
                result: Ok(Vec::new()),
            },
            Msg::DocumentStatusFetched {
                scope: scope.clone(),
                document_id: "doc-1".into(),
                result: Ok(StatusNotice::new("doc-1", "ws-a", DocumentStatus::Pending)),
            },
        ],
    );

    let (due, delay) = scheduled_poll(&effects).expect("poll scheduled");
    assert_eq!(delay, 3000);
    assert!(state.poller().is_active());

    let (state, effects) = update(state, Msg::PollDue { token: due });
    let token = issued_poll(&effects).expect("poll issued");
    let (state, effects) = update(
        state,
        Msg::PollCompleted {
            token,
            result: Ok(vec![StatusNotice::new(
                "doc-1",
                "ws-a",
                DocumentStatus::Processing,
            )]),
        },
    );
    assert!(scheduled_poll(&effects).is_some());
    assert_eq!(
        state.reconciler().status_of("doc-1"),
        Some(DocumentStatus::Processing)
    );
}

#[test]
fn pull_answers_respect_the_conversation_filter() {
    init_logging();
    let scope = Scope::workspace("ws-a").with_conversation("c1");
    let (state, effects) = update(
        SessionState::new(Timings::default()),
        Msg::ScopeActivated(scope.clone()),
    );
    let token = issued_poll(&effects).expect("poll issued");

    let (state, effects) = apply(
        state,
        vec![
            Msg::PollCompleted {
                token,
                result: Ok(vec![StatusNotice::new(
                    "doc-x",
                    "ws-a",
                    DocumentStatus::Processing,
                )
                .in_conversation("c2")]),
            },
            Msg::DocumentStatusFetched {
                scope,
                document_id: "doc-x".into(),
                result: Ok(
                    StatusNotice::new("doc-x", "ws-a", DocumentStatus::Completed)
                        .in_conversation("c2"),
                ),
            },
        ],
    );

    assert!(settlements(&effects).is_empty());
    assert!(state.reconciler().document("doc-x").is_none());
}

#[test]
fn lookup_answered_after_scope_change_is_dropped() {
    init_logging();
    let first = Scope::workspace("ws-a");
    let (state, _, token) = activated("ws-a");
    let state = uploaded(state, "doc-1");
    let (state, effects) = update(
        state,
        Msg::PollCompleted {
            token,
            result: Ok(Vec::new()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::FetchDocumentStatus {
            scope: first.clone(),
            document_id: "doc-1".into()
        }]
    );

    let (state, _) = update(
        state,
        Msg::ScopeActivated(Scope::workspace("ws-a").with_conversation("c2")),
    );
    let state = uploaded(state, "doc-1");
    let (state, effects) = update(
        state,
        Msg::DocumentStatusFetched {
            scope: first,
            document_id: "doc-1".into(),
            result: Ok(StatusNotice::new("doc-1", "ws-a", DocumentStatus::Completed)),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(
        state.reconciler().status_of("doc-1"),
        Some(DocumentStatus::Pending)
    );
}

#[test]
fn failed_upload_is_not_looked_up() {
    init_logging();
    let (state, _, token) = activated("ws-a");
    let state = uploaded(state, "doc-1");

    let (state, effects) = apply(
        state,
        vec![
            Msg::UploadFailed {
                document_id: "doc-1".into(),
            },
            Msg::PollCompleted {
                token,
                result: Ok(Vec::new()),
            },
        ],
    );

    assert!(effects.is_empty());
    assert!(state.reconciler().document("doc-1").is_none());
    assert!(!state.poller().is_active());
}

#[test]
fn lost_channel_resumes_idle_polling() {
    init_logging();
    let (state, epoch, token) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::PollCompleted {
            token,
            result: Ok(Vec::new()),
        },
    );
    assert!(!state.poller().is_active());

    let (state, effects) = update(
        state,
        Msg::ChannelLost {
            epoch,
            reason: "socket reset".into(),
        },
    );
    assert!(matches!(effects[0], Effect::ScheduleReconnect { .. }));
    assert!(matches!(effects[1], Effect::IssuePoll { .. }));
    assert!(state.poller().is_active());
}

#[test]
fn upload_restarts_an_idle_poller() {
    init_logging();
    let (state, _, token) = activated("ws-a");
    let (state, _) = update(
        state,
        Msg::PollCompleted {
            token,
            result: Ok(Vec::new()),
        },
    );

    let (state, effects) = update(
        state,
        Msg::UploadStarted {
            document_id: "doc-2".into(),
            conversation_id: Some("c-1".into()),
        },
    );
    assert!(matches!(effects.as_slice(), [Effect::IssuePoll { .. }]));
    assert_eq!(
        state.reconciler().status_of("doc-2"),
        Some(DocumentStatus::Pending)
    );
}

#[test]
fn chat_stream_flows_through_the_reducer() {
    init_logging();
    let state = SessionState::new(Timings::default());
    let (state, effects) = apply(
        state,
        vec![
            Msg::StreamStarted,
            Msg::StreamEvent(StreamEvent::content("Hello ")),
            Msg::StreamEvent(StreamEvent::content("world")),
            Msg::StreamEnded(StreamOutcome::Completed {
                conversation_id: Some("c-1".into()),
            }),
            Msg::StreamEvent(StreamEvent::content("late")),
        ],
    );

    let contents: Vec<_> = effects
        .iter()
        .filter(|effect| matches!(effect, Effect::EmitContent(_)))
        .collect();
    assert_eq!(contents, vec![&Effect::EmitContent("Hello world".into())]);
    let finished = effects
        .iter()
        .filter(|effect| matches!(effect, Effect::StreamFinished(_)))
        .count();
    assert_eq!(finished, 1);
    assert_eq!(state.stream().content(), "");
}
