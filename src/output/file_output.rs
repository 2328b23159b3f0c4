use std::fs::File;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::output::VideoSink;
use crate::Result;

/// Appends every video payload to a file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }
}

#[async_trait]
impl VideoSink for FileSink {
    async fn write(&mut self, payload: Bytes) -> Result<()> {
        self.file.write_all(&payload)?;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = self.file.flush() {
            warn!("Failed to flush video output: {}", e);
        }
    }
}
