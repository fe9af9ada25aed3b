use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::sources::traits::ByteSource;

/// A feed stored on local disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    async fn open(&self, cancel: &CancellationToken) -> AppResult<Box<dyn Read + Send>> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::source_unavailable(self.label(), e.to_string()))?;
        debug!("Opened feed file {}", self.path.display());
        Ok(Box::new(file.into_std().await))
    }
}

/// A feed already held in memory
pub struct MemorySource {
    label: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new<L: Into<String>, D: Into<Bytes>>(label: L, data: D) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn open(&self, cancel: &CancellationToken) -> AppResult<Box<dyn Read + Send>> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }
}
