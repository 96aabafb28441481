//! Relay engine: runs the relay core against real timers, HTTP and push
//! connections, and reports results to the view layer.
mod channel;
mod chat;
mod engine;
mod settings;
mod sink;
mod source;
mod types;

pub use channel::{FrameStream, PushConnector};
pub use chat::{ChatFrame, ChatLineDecoder};
pub use engine::{CoordinatorHandle, Services};
pub use settings::{RelaySettings, SettingsError};
pub use sink::{ChannelViewSink, ViewSink};
pub use source::{ReqwestStatusSource, StatusSource};
pub use types::{ChannelError, FailureKind, QueryError, ViewEvent};
