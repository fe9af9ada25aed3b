//! Channel identity index and the wanted-id set gating filter mode

use std::collections::{HashMap, HashSet};

use crate::xmltv::records::{ChannelRecord, normalize_id};

/// Canonical channel with the number of programmes routed to it
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub channel: ChannelRecord,
    pub programme_count: u64,
}

/// Mapping from normalized channel identity to its canonical record.
///
/// First-seen-wins: a normalized id is indexed at most once. Programme
/// references are resolved against the original id of accepted channels,
/// case-sensitively unless configured otherwise.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    entries: HashMap<String, IndexEntry>,
    /// Programme reference key -> normalized id
    refs: HashMap<String, String>,
    /// Normalized ids in acceptance order
    order: Vec<String>,
    case_insensitive_refs: bool,
}

impl IdentityIndex {
    pub fn new(case_insensitive_refs: bool) -> Self {
        Self {
            case_insensitive_refs,
            ..Default::default()
        }
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.entries.contains_key(&normalize_id(channel_id))
    }

    /// Index a channel. Returns `false`, leaving the index untouched, when
    /// its normalized id is already present.
    pub fn insert(&mut self, channel: ChannelRecord) -> bool {
        let normalized = channel.normalized_id();
        if self.entries.contains_key(&normalized) {
            return false;
        }

        self.refs.insert(self.ref_key(&channel.id), normalized.clone());
        self.order.push(normalized.clone());
        self.entries.insert(
            normalized,
            IndexEntry {
                channel,
                programme_count: 0,
            },
        );
        true
    }

    /// Route a programme to its channel, counting it. Returns whether the
    /// reference names an accepted channel.
    pub fn route_programme(&mut self, channel_ref: &str) -> bool {
        let key = self.ref_key(channel_ref);
        let Some(normalized) = self.refs.get(&key) else {
            return false;
        };
        match self.entries.get_mut(normalized) {
            Some(entry) => {
                entry.programme_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, channel_id: &str) -> Option<&IndexEntry> {
        self.entries.get(&normalize_id(channel_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in acceptance order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// `(original id, programme count)` in acceptance order
    pub fn channel_counts(&self) -> Vec<(String, u64)> {
        self.entries()
            .map(|entry| (entry.channel.id.clone(), entry.programme_count))
            .collect()
    }

    fn ref_key(&self, id: &str) -> String {
        if self.case_insensitive_refs {
            normalize_id(id)
        } else {
            id.to_string()
        }
    }
}

/// Case-insensitive set of wanted channel ids, insertion order preserved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantedSet {
    tokens: Vec<String>,
    lookup: HashSet<String>,
}

impl WantedSet {
    /// Build from line-oriented text: one id per line, surrounding
    /// whitespace trimmed, blank lines ignored
    pub fn from_lines(text: &str) -> Self {
        text.lines().collect()
    }

    pub fn insert(&mut self, id: &str) -> bool {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return false;
        }
        let normalized = normalize_id(trimmed);
        if !self.lookup.insert(normalized.clone()) {
            return false;
        }
        self.tokens.push(normalized);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains(&normalize_id(id))
    }

    /// Normalized tokens in insertion order
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for WantedSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = WantedSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
