use std::time::Duration;

use relay_logging::{relay_info, relay_trace, relay_warn};

use crate::{Effect, Scope, StatusNotice};

/// Generation of the push connection. Bumped on every open and close so that
/// frames and timers belonging to an earlier connection can be recognised.
pub type ChannelEpoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ChannelState {
    #[default]
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

/// Push subscription for document status notices.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationListener {
    scope: Option<Scope>,
    state: ChannelState,
    epoch: ChannelEpoch,
    reconnect_delay: Duration,
}

impl Default for NotificationListener {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl NotificationListener {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            scope: None,
            state: ChannelState::Closed,
            epoch: 0,
            reconnect_delay,
        }
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Open
    }

    pub fn is_subscribed(&self) -> bool {
        self.scope.is_some()
    }

    pub fn epoch(&self) -> ChannelEpoch {
        self.epoch
    }

    /// Sets the filter and opens the connection unless one is already open or
    /// on its way.
    pub fn subscribe(&mut self, scope: Scope) -> Vec<Effect> {
        self.scope = Some(scope.clone());
        if self.state != ChannelState::Closed {
            return Vec::new();
        }
        self.epoch += 1;
        self.state = ChannelState::Connecting;
        vec![Effect::OpenChannel {
            scope,
            epoch: self.epoch,
        }]
    }

    pub fn unsubscribe(&mut self) -> Vec<Effect> {
        self.scope = None;
        if self.state == ChannelState::Closed {
            return Vec::new();
        }
        self.state = ChannelState::Closed;
        self.epoch += 1;
        vec![Effect::CloseChannel]
    }

    pub fn channel_opened(&mut self, epoch: ChannelEpoch) {
        if epoch != self.epoch || self.state != ChannelState::Connecting {
            relay_trace!("ignoring open of superseded channel {}", epoch);
            return;
        }
        relay_info!("notification channel connected (epoch {})", epoch);
        self.state = ChannelState::Open;
    }

    /// Connection dropped or failed to open. Reconnects after a fixed delay
    /// while a subscription is active.
    pub fn channel_lost(&mut self, epoch: ChannelEpoch, reason: &str) -> Vec<Effect> {
        if epoch != self.epoch || self.state == ChannelState::Closed {
            relay_trace!("ignoring loss of superseded channel {}", epoch);
            return Vec::new();
        }
        relay_warn!(
            "notification channel lost ({}); reconnecting in {:?}",
            reason,
            self.reconnect_delay
        );
        self.state = ChannelState::Reconnecting;
        vec![Effect::ScheduleReconnect {
            epoch,
            delay: self.reconnect_delay,
        }]
    }

    pub fn reconnect_due(&mut self, epoch: ChannelEpoch) -> Vec<Effect> {
        if epoch != self.epoch || self.state != ChannelState::Reconnecting {
            return Vec::new();
        }
        let Some(scope) = self.scope.clone() else {
            return Vec::new();
        };
        relay_info!("reconnecting notification channel");
        self.epoch += 1;
        self.state = ChannelState::Connecting;
        vec![Effect::OpenChannel {
            scope,
            epoch: self.epoch,
        }]
    }

    /// Decodes and filters one inbound frame. Malformed or out-of-scope
    /// frames yield `None`.
    pub fn accept_frame(&self, epoch: ChannelEpoch, frame: &str) -> Option<StatusNotice> {
        if epoch != self.epoch {
            relay_trace!("dropping frame from superseded channel {}", epoch);
            return None;
        }
        let scope = self.scope.as_ref()?;

        let notice = match StatusNotice::decode(frame) {
            Ok(notice) => notice,
            Err(err) => {
                relay_warn!("dropping notification frame: {}", err);
                return None;
            }
        };

        if !scope.admits(&notice) {
            relay_trace!(
                "dropping notice for document {} outside workspace {}",
                notice.document_id,
                scope.workspace_id
            );
            return None;
        }
        Some(notice)
    }
}
