use std::io::Read;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::AppResult;

/// Supplies the raw, usually gzip-compressed, bytes of one EPG feed
///
/// Retrieval happens in [`ByteSource::open`]; the returned reader is consumed
/// later on a blocking thread, so it must not borrow from the async context.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Human-readable name used in logs and the run summary
    fn label(&self) -> String;

    /// Retrieve the feed, honouring cancellation while doing so
    async fn open(&self, cancel: &CancellationToken) -> AppResult<Box<dyn Read + Send>>;
}
