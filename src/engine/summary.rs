//! End-of-run statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::matching::MatchResult;
use crate::utils::{format_bytes, format_duration};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCount {
    /// Channel id in its original casing
    pub channel_id: String,
    pub programmes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFailure {
    pub feed: String,
    pub error: String,
}

/// A channel admitted by fuzzy matching one of its display names against an
/// unresolved wanted id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyResolution {
    pub channel_id: String,
    #[serde(flatten)]
    pub result: MatchResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub feeds_processed: usize,
    pub feed_failures: Vec<FeedFailure>,
    pub elements_parsed: u64,
    pub channels_seen: u64,
    pub channels_accepted: u64,
    pub duplicate_channels: u64,
    pub programmes_seen: u64,
    pub programmes_accepted: u64,
    pub programmes_dropped: u64,
    pub other_elements: u64,
    /// Accepted channels in acceptance order
    pub channel_programme_counts: Vec<ChannelCount>,
    pub wanted_ids: usize,
    /// Wanted ids no channel resolved, in list order
    pub unmatched_wanted: Vec<String>,
    pub fuzzy_resolutions: Vec<FuzzyResolution>,
    pub output_path: Option<String>,
    pub output_bytes: u64,
}

impl RunSummary {
    pub fn new<M: Into<String>>(mode: M) -> Self {
        Self {
            mode: mode.into(),
            started_at: Utc::now(),
            duration_ms: 0,
            feeds_processed: 0,
            feed_failures: Vec::new(),
            elements_parsed: 0,
            channels_seen: 0,
            channels_accepted: 0,
            duplicate_channels: 0,
            programmes_seen: 0,
            programmes_accepted: 0,
            programmes_dropped: 0,
            other_elements: 0,
            channel_programme_counts: Vec::new(),
            wanted_ids: 0,
            unmatched_wanted: Vec::new(),
            fuzzy_resolutions: Vec::new(),
            output_path: None,
            output_bytes: 0,
        }
    }

    pub fn programme_count(&self, channel_id: &str) -> Option<u64> {
        self.channel_programme_counts
            .iter()
            .find(|count| count.channel_id == channel_id)
            .map(|count| count.programmes)
    }

    /// Channels with at least one programme, by descending programme count.
    /// Equal counts keep acceptance order.
    pub fn top_channels(&self, limit: usize) -> Vec<&ChannelCount> {
        let mut counts: Vec<&ChannelCount> = self
            .channel_programme_counts
            .iter()
            .filter(|count| count.programmes > 0)
            .collect();
        counts.sort_by(|a, b| b.programmes.cmp(&a.programmes));
        counts.truncate(limit);
        counts
    }

    pub fn log(&self, top_channels: usize) {
        info!(
            "Run summary: mode={} feeds={} failed_feeds={} elements_parsed={} channels_accepted={} duplicate_channels={} programmes_accepted={} programmes_dropped={} duration={}",
            self.mode,
            self.feeds_processed,
            self.feed_failures.len(),
            self.elements_parsed,
            self.channels_accepted,
            self.duplicate_channels,
            self.programmes_accepted,
            self.programmes_dropped,
            format_duration(self.duration_ms)
        );

        if let Some(path) = &self.output_path {
            info!("Saved EPG to {} ({})", path, format_bytes(self.output_bytes));
        }

        if self.wanted_ids > 0 {
            info!(
                "Wanted ids: requested={} found={} unmatched={} fuzzy_resolved={}",
                self.wanted_ids,
                self.wanted_ids - self.unmatched_wanted.len(),
                self.unmatched_wanted.len(),
                self.fuzzy_resolutions.len()
            );
        }

        for failure in &self.feed_failures {
            info!("Feed skipped: {} - {}", failure.feed, failure.error);
        }

        let top = self.top_channels(top_channels);
        if top.is_empty() {
            info!("No programme counts available");
        } else {
            info!("Top channels by programme count (up to {}):", top_channels);
            for count in top {
                info!("  {}: {}", count.channel_id, count.programmes);
            }
        }
    }
}
