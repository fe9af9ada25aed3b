//! Filter/merge/dedup orchestration
//!
//! An [`Engine`] run moves through [`RunState`]s published on a watch
//! channel:
//!
//! ```text
//! Idle -> FetchingSources -> Streaming -> Finalizing -> Done
//!                 \               \            \
//!                  +---------------+------------+--> Failed
//! ```
//!
//! Feeds are retrieved concurrently, then streamed one at a time through a
//! single [`pipeline`] that owns the identity index and the output writer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_GENERATOR_NAME, DEFAULT_MAX_CONCURRENT_FETCHES,
    DEFAULT_PROGRESS_LOG_EVERY,
};
use crate::matching::{MatcherConfig, WantedSet};
use crate::xmltv::OptimizerConfig;

pub mod catalog;
pub(crate) mod pipeline;
pub mod runner;
pub mod summary;

pub use catalog::CatalogChannel;
pub use runner::Engine;
pub use summary::{ChannelCount, FeedFailure, FuzzyResolution, RunSummary};

/// Explicit configuration for one engine; no process-wide state is consulted
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrent_fetches: usize,
    /// gzip level, 0-9
    pub compression_level: u32,
    pub generator_name: Option<String>,
    /// Admit unwanted channels whose display name fuzzily matches a wanted id
    pub fuzzy_filter: bool,
    pub case_insensitive_channel_refs: bool,
    pub matcher: MatcherConfig,
    /// Content optimization, disabled when `None`
    pub optimizer: Option<OptimizerConfig>,
    /// Log progress every N parsed elements; 0 disables
    pub progress_log_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            generator_name: Some(DEFAULT_GENERATOR_NAME.to_string()),
            fuzzy_filter: false,
            case_insensitive_channel_refs: false,
            matcher: MatcherConfig::default(),
            optimizer: None,
            progress_log_every: DEFAULT_PROGRESS_LOG_EVERY,
        }
    }
}

/// What a run does with the records it streams
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Keep only wanted channels and their programmes
    Filter(WantedSet),
    /// Union of all feeds, first-seen channel definition wins
    Merge,
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            RunMode::Filter(_) => "filter",
            RunMode::Merge => "merge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    FetchingSources,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::FetchingSources => write!(f, "fetching_sources"),
            RunState::Streaming => write!(f, "streaming"),
            RunState::Finalizing => write!(f, "finalizing"),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}
