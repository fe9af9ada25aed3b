//! Playlist title -> EPG channel mapping
//!
//! A mapping is generated by fuzzy matching playlist entries against the
//! display names of EPG channels, stored as JSON, and later applied to a
//! playlist to fill in `tvg-id` and `tvg-logo`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::CatalogChannel;
use crate::errors::{AppError, AppResult};
use crate::matching::FuzzyMatcher;
use crate::playlist::m3u::Playlist;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "tvg-id")]
    pub tvg_id: String,
    /// Empty when the EPG channel has no icon
    #[serde(default)]
    pub logo: String,
}

/// Playlist display title -> EPG identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl ChannelMapping {
    /// Match every `#EXTINF` entry by `tvg-name`, then by title, against all
    /// catalog display names. Only a strictly better score replaces an
    /// earlier best, so `tvg-name` wins ties.
    pub fn generate(playlist: &Playlist, catalog: &[CatalogChannel], matcher: &FuzzyMatcher) -> Self {
        let mut names: Vec<&str> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        for (index, channel) in catalog.iter().enumerate() {
            for name in &channel.display_names {
                names.push(name);
                owners.push(index);
            }
        }

        let mut mapping = Self::default();
        for entry in playlist.entries() {
            if entry.title.is_empty() {
                continue;
            }

            let queries = [entry.attribute("tvg-name").unwrap_or_default(), entry.title.as_str()];
            let mut best: Option<(f64, usize)> = None;
            for query in queries.iter().filter(|q| !q.trim().is_empty()) {
                let Some(result) = matcher.find_match(query, &names) else {
                    continue;
                };
                match best {
                    Some((best_score, _)) if result.score <= best_score => {}
                    _ => best = Some((result.score, owners[result.candidate_index])),
                }
            }

            if let Some((score, owner)) = best {
                let channel = &catalog[owner];
                debug!(
                    "Mapped '{}' to {} (score {:.1})",
                    entry.title, channel.id, score
                );
                mapping.entries.insert(
                    entry.title.clone(),
                    MappingEntry {
                        tvg_id: channel.id.clone(),
                        logo: channel.logo_url.clone().unwrap_or_default(),
                    },
                );
            }
        }

        info!(
            "Generated mapping for {} of {} playlist channels",
            mapping.len(),
            playlist.entries().count()
        );
        mapping
    }

    /// Fill `tvg-id` (first attribute when missing) and add `tvg-logo` right
    /// after it when the entry has none. Returns the number of entries
    /// updated.
    pub fn apply(&self, playlist: &mut Playlist) -> usize {
        let mut updated = 0;
        for entry in playlist.entries_mut() {
            let Some(mapped) = self.entries.get(&entry.title) else {
                continue;
            };

            entry.set_attribute("tvg-id", &mapped.tvg_id, 0);
            if !mapped.logo.is_empty() && entry.attribute("tvg-logo").is_none() {
                let after_id = entry.attribute_position("tvg-id").map_or(0, |pos| pos + 1);
                entry.set_attribute("tvg-logo", &mapped.logo, after_id);
            }
            updated += 1;
        }
        info!("Updated {} playlist entries from mapping", updated);
        updated
    }

    pub fn get(&self, title: &str) -> Option<&MappingEntry> {
        self.entries.get(title)
    }

    pub fn insert<S: Into<String>>(&mut self, title: S, entry: MappingEntry) {
        self.entries.insert(title.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("Failed to read mapping {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::configuration(format!("Invalid mapping {}: {e}", path.display()))
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::internal(format!("Failed to serialize mapping: {e}")))?;
        std::fs::write(path, json).map_err(|e| AppError::output_write(path.display().to_string(), e))
    }
}
