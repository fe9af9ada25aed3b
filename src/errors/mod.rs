//! Centralized error handling for the EPG filter
//!
//! # Error Categories
//!
//! - **Source Errors**: feed or wanted-list retrieval failures
//! - **Input Errors**: malformed XMLTV or playlist content
//! - **Output Errors**: the destination could not be written
//! - **Run Errors**: empty wanted set, cancellation, bad configuration
//!
//! # Usage
//!
//! ```rust
//! use epg_filter::errors::{AppError, AppResult};
//!
//! fn example_function(ids: &[&str]) -> AppResult<usize> {
//!     if ids.is_empty() {
//!         return Err(AppError::NoWantedIds);
//!     }
//!     Ok(ids.len())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
