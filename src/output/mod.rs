use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Where received video goes. The native stand-in for the player element.
#[async_trait]
pub trait VideoSink: Send + Sync + 'static {
    /// write the payload of one RTP packet of the video track
    async fn write(&mut self, payload: Bytes) -> Result<()>;
}

mod file_output;
mod noop_output;

pub use file_output::FileSink;
pub use noop_output::NoOpSink;
