use futures_util::stream::BoxStream;
use relay_core::Scope;

use crate::ChannelError;

/// Text frames of one push connection. The stream ending, or yielding an
/// error, means the connection is gone.
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens push connections for document status notifications.
#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, scope: &Scope) -> Result<FrameStream, ChannelError>;
}
