//! Relay core: pure state machines for chat streaming and document status.
//!
//! Nothing in this crate performs IO or owns a clock. Every input arrives as a
//! [`Msg`], every request for the outside world leaves as an [`Effect`], and
//! [`update`] is the only place the two meet.
mod effect;
mod ids;
mod listener;
mod msg;
mod poller;
mod reconciler;
mod state;
mod status;
mod stream;
mod types;
mod update;

pub use effect::Effect;
pub use listener::{ChannelEpoch, NotificationListener};
pub use msg::{Msg, PollResult};
pub use poller::{BackoffPolicy, PollBackoffState, PollToken, StatusPoller};
pub use reconciler::{Reconciler, StatusUpdate, FAILURE_FALLBACK, MAX_LOOKUP_FAILURES};
pub use state::{SessionState, Timings};
pub use status::{DocumentStatus, NoticeError, StatusNotice, TrackedDocument, UpdateSource};
pub use stream::{FlushToken, StreamPhase, StreamProcessor};
pub use types::{Chunk, DocumentId, Scope, StreamEvent, StreamOutcome};
pub use update::update;
