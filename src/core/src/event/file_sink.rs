use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::sink::EventSink;
use crate::error_handling::types::SinkError;

/// Appends one JSON object per line to a file.
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                error!("Failed to open event file {}: {}", path.display(), e);
                SinkError::Io(e)
            })?;
        info!("File sink writing to {}", path.display());
        Ok(Self { path, file })
    }
}

#[async_trait]
impl EventSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&mut self, line: &str) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.file.write_all(&buf).await?;
        self.file.flush().await?;
        debug!("Appended {} byte(s) to {}", buf.len(), self.path.display());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.file.sync_all().await?;
        info!("File sink {} closed", self.path.display());
        Ok(())
    }
}
