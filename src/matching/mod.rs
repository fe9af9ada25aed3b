//! Channel identity resolution: exact index lookups and fuzzy name matching

pub mod fuzzy;
pub mod index;

pub use fuzzy::{FuzzyMatcher, MatchResult, MatcherConfig};
pub use index::{IdentityIndex, IndexEntry, WantedSet};
