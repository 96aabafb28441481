use std::time::Duration;

use relay_logging::{relay_debug, relay_trace, relay_warn};

use crate::{Effect, PollResult, Scope};

/// Identifies one polling cycle. Results and timers carrying an older token
/// belong to a stopped cycle and are discarded.
pub type PollToken = u64;

/// Exponential backoff for the pull fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(3000),
            max: Duration::from_millis(30_000),
            multiplier: 1.5,
        }
    }
}

impl BackoffPolicy {
    /// `min(max, initial * multiplier^attempt)`, rounded to whole milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PollBackoffState {
    pub attempt: u32,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PollPhase {
    #[default]
    Idle,
    InFlight,
    Waiting,
}

/// Pull-based fallback that keeps asking for non-terminal documents until
/// none remain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusPoller {
    policy: BackoffPolicy,
    backoff: PollBackoffState,
    phase: PollPhase,
    token: PollToken,
    /// Backoff step for polls rescheduled after a document lookup. Survives
    /// the empty answers that end each cycle.
    retry_attempt: u32,
}

impl StatusPoller {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> &PollBackoffState {
        &self.backoff
    }

    pub fn is_active(&self) -> bool {
        self.phase != PollPhase::Idle
    }

    pub fn is_current(&self, token: PollToken) -> bool {
        token == self.token && self.phase != PollPhase::Idle
    }

    /// Polls `scope` now. A request already in flight for the same scope is
    /// left to finish; its result drives the schedule.
    pub fn poll(&mut self, scope: Scope) -> Vec<Effect> {
        if self.backoff.scope.as_ref() != Some(&scope) {
            self.retry_attempt = 0;
            self.backoff = PollBackoffState {
                attempt: 0,
                scope: Some(scope.clone()),
            };
            if self.phase != PollPhase::Idle {
                self.token += 1;
                self.phase = PollPhase::Idle;
            }
        }
        if self.phase == PollPhase::InFlight {
            return Vec::new();
        }
        self.token += 1;
        self.issue(scope)
    }

    /// Restarts an idle cycle for the current scope.
    pub fn kick(&mut self) -> Vec<Effect> {
        if self.phase != PollPhase::Idle {
            return Vec::new();
        }
        let Some(scope) = self.backoff.scope.clone() else {
            return Vec::new();
        };
        relay_debug!("resuming status polling for workspace {}", scope.workspace_id);
        self.poll(scope)
    }

    /// Schedules a backoff-spaced poll when no cycle is running. Each retry
    /// waits longer than the previous one until [`StatusPoller::settle_retries`].
    pub fn retry_later(&mut self) -> Vec<Effect> {
        if self.phase != PollPhase::Idle || self.backoff.scope.is_none() {
            return Vec::new();
        }
        self.token += 1;
        self.backoff.attempt = self.retry_attempt;
        self.retry_attempt = self.retry_attempt.saturating_add(1);
        self.schedule_next()
    }

    /// The lookup that drove retries has been answered for good.
    pub fn settle_retries(&mut self) {
        self.retry_attempt = 0;
    }

    pub fn poll_due(&mut self, token: PollToken) -> Vec<Effect> {
        if token != self.token || self.phase != PollPhase::Waiting {
            relay_trace!("ignoring stale poll timer {}", token);
            return Vec::new();
        }
        match self.backoff.scope.clone() {
            Some(scope) => self.issue(scope),
            None => Vec::new(),
        }
    }

    /// Applies the outcome of a pull query. A non-empty answer or a failure
    /// schedules the next poll with backoff; an empty answer ends the cycle.
    pub fn poll_completed(&mut self, token: PollToken, result: &PollResult) -> Vec<Effect> {
        if token != self.token || self.phase != PollPhase::InFlight {
            relay_trace!("ignoring stale poll result {}", token);
            return Vec::new();
        }
        match result {
            Ok(pending) if pending.is_empty() => {
                relay_debug!("no pending documents; polling stopped");
                self.backoff.attempt = 0;
                self.phase = PollPhase::Idle;
                Vec::new()
            }
            Ok(_) => self.schedule_next(),
            Err(message) => {
                relay_warn!("status poll failed: {}", message);
                self.schedule_next()
            }
        }
    }

    /// Cancels any scheduled or in-flight poll and forgets the scope.
    pub fn stop(&mut self) -> Vec<Effect> {
        let was_active = self.phase != PollPhase::Idle;
        self.token += 1;
        self.phase = PollPhase::Idle;
        self.backoff = PollBackoffState::default();
        self.retry_attempt = 0;
        if was_active {
            vec![Effect::CancelPoll]
        } else {
            Vec::new()
        }
    }

    fn issue(&mut self, scope: Scope) -> Vec<Effect> {
        self.phase = PollPhase::InFlight;
        vec![Effect::IssuePoll {
            scope,
            token: self.token,
        }]
    }

    fn schedule_next(&mut self) -> Vec<Effect> {
        let delay = self.policy.delay_for(self.backoff.attempt);
        self.backoff.attempt = self.backoff.attempt.saturating_add(1);
        self.phase = PollPhase::Waiting;
        vec![Effect::SchedulePoll {
            token: self.token,
            delay,
        }]
    }
}
