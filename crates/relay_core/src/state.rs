use std::time::Duration;

use crate::{BackoffPolicy, NotificationListener, Reconciler, Scope, StatusPoller, StreamProcessor};

/// Timing knobs for the state machines.
#[derive(Debug, Clone, PartialEq)]
pub struct Timings {
    /// Window over which content deltas are merged into one notification.
    pub coalesce_window: Duration,
    /// Fixed delay before reopening a lost push connection.
    pub reconnect_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(16),
            reconnect_delay: Duration::from_millis(3000),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Everything the coordinator knows, owned by one logical queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub(crate) scope: Option<Scope>,
    pub(crate) stream: StreamProcessor,
    pub(crate) listener: NotificationListener,
    pub(crate) poller: StatusPoller,
    pub(crate) reconciler: Reconciler,
}

impl SessionState {
    pub fn new(timings: Timings) -> Self {
        Self {
            scope: None,
            stream: StreamProcessor::new(timings.coalesce_window),
            listener: NotificationListener::new(timings.reconnect_delay),
            poller: StatusPoller::new(timings.backoff),
            reconciler: Reconciler::new(),
        }
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn stream(&self) -> &StreamProcessor {
        &self.stream
    }

    pub fn listener(&self) -> &NotificationListener {
        &self.listener
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}
