use async_trait::async_trait;
use bytes::Bytes;

use crate::output::VideoSink;
use crate::Result;

/// Voids video, for headless viewing.
pub struct NoOpSink;

#[async_trait]
impl VideoSink for NoOpSink {
    async fn write(&mut self, _payload: Bytes) -> Result<()> {
        Ok(())
    }
}
