//! Error type definitions for the EPG filter
//!
//! Per-feed failures (`SourceUnavailable`, `MalformedInput`) are recoverable
//! in merge mode and fatal in filter mode; the engine decides which. Dropped
//! duplicates, unmatched programme refs and sub-threshold fuzzy matches are
//! not errors at all and only show up in the run summary.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Retrieval of a feed or wanted list failed
    #[error("Source unavailable: {feed} - {message}")]
    SourceUnavailable { feed: String, message: String },

    /// XML syntax violation in a feed
    #[error("Malformed input{}: {message}", format_offset(.offset))]
    MalformedInput { offset: Option<u64>, message: String },

    /// Filter mode was requested with an empty wanted set
    #[error("No wanted channel ids supplied; filtering would produce an empty guide")]
    NoWantedIds,

    /// The output sink could not be written
    #[error("Output write failed: {path} - {source}")]
    OutputWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration or command line input
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Malformed playlist content
    #[error("Playlist error at line {line}: {message}")]
    Playlist { line: usize, message: String },

    /// The run was cancelled through its cancellation token
    #[error("Run cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn format_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(offset) => format!(" at byte {offset}"),
        None => String::new(),
    }
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a source unavailable error
    pub fn source_unavailable<F: Into<String>, M: Into<String>>(feed: F, message: M) -> Self {
        Self::SourceUnavailable {
            feed: feed.into(),
            message: message.into(),
        }
    }

    /// Create a malformed input error with an optional byte offset
    pub fn malformed<S: Into<String>>(offset: Option<u64>, message: S) -> Self {
        Self::MalformedInput {
            offset,
            message: message.into(),
        }
    }

    /// Create an output write error for the given sink
    pub fn output_write<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a playlist error
    pub fn playlist<S: Into<String>>(line: usize, message: S) -> Self {
        Self::Playlist {
            line,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure only concerns the feed being processed
    pub fn is_feed_scoped(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::MalformedInput { .. }
        )
    }
}
