//! Channel catalog collection used to build playlist mappings

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::runner::Engine;
use crate::engine::RunState;
use crate::errors::{AppError, AppResult};
use crate::sources::ByteSource;
use crate::utils::DecompressionService;
use crate::xmltv::{RecordReader, XmltvRecord, normalize_id};

/// Identity fields of one EPG channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogChannel {
    pub id: String,
    pub display_names: Vec<String>,
    pub logo_url: Option<String>,
}

impl Engine {
    /// Collect the channels of every feed, first definition of an id wins.
    ///
    /// Feeds that fail are skipped; the call fails only when none could be
    /// read.
    pub async fn collect_channel_catalog(
        &self,
        sources: Vec<Box<dyn ByteSource>>,
    ) -> AppResult<Vec<CatalogChannel>> {
        let result = self.collect_catalog(sources).await;
        self.set_state(if result.is_ok() {
            RunState::Done
        } else {
            RunState::Failed
        });
        result
    }

    async fn collect_catalog(
        &self,
        sources: Vec<Box<dyn ByteSource>>,
    ) -> AppResult<Vec<CatalogChannel>> {
        if sources.is_empty() {
            return Err(AppError::configuration("No EPG sources given"));
        }

        self.set_state(RunState::FetchingSources);
        let fetched = self.fetch_all(&sources).await;
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        self.set_state(RunState::Streaming);
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || -> AppResult<Vec<CatalogChannel>> {
            let mut seen = HashSet::new();
            let mut channels = Vec::new();
            let mut last_error = None;
            let mut feeds_read = 0usize;

            for (label, opened) in fetched {
                let result = opened.and_then(|raw| {
                    let (_, input) = DecompressionService::decompressing_reader(raw)?;
                    for record in RecordReader::new(input) {
                        if cancel.is_cancelled() {
                            return Err(AppError::Cancelled);
                        }
                        if let XmltvRecord::Channel(channel) = record? {
                            if seen.insert(normalize_id(&channel.id)) {
                                channels.push(CatalogChannel {
                                    id: channel.id,
                                    display_names: channel.display_names,
                                    logo_url: channel.logo_url,
                                });
                            }
                        }
                    }
                    Ok(())
                });

                match result {
                    Ok(()) => feeds_read += 1,
                    Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                    Err(e) => {
                        warn!("Skipping feed {} while collecting channels: {}", label, e);
                        last_error = Some(e);
                    }
                }
            }

            match last_error {
                Some(e) if feeds_read == 0 => Err(e),
                _ => {
                    info!(
                        "Collected {} EPG channels from {} feed(s)",
                        channels.len(),
                        feeds_read
                    );
                    Ok(channels)
                }
            }
        })
        .await
        .map_err(|e| AppError::internal(format!("Catalog task failed: {e}")))?
    }
}
