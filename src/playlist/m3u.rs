//! Minimal M3U line-format parser and writer
//!
//! Only `#EXTINF` lines are interpreted; every other line is carried through
//! untouched. Entries that are not modified are written back byte-for-byte.

use std::fmt;

use crate::errors::{AppError, AppResult};

/// One `#EXTINF:<duration> key="value" ...,<title>` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtinfEntry {
    /// 1-based line number in the source playlist
    pub line_number: usize,
    pub duration: String,
    /// Attributes in line order
    pub attributes: Vec<(String, String)>,
    pub title: String,
    raw: String,
    modified: bool,
}

impl ExtinfEntry {
    pub fn parse(line: &str, line_number: usize) -> AppResult<Self> {
        let content = line
            .strip_prefix("#EXTINF:")
            .ok_or_else(|| AppError::playlist(line_number, "not an #EXTINF line"))?;

        let comma_pos = title_separator(content)
            .ok_or_else(|| AppError::playlist(line_number, "Invalid EXTINF format: missing comma"))?;
        let (head, title) = content.split_at(comma_pos);
        let title = title[1..].trim().to_string();

        let head = head.trim_start();
        let (duration, attrs_part) = match head.find(char::is_whitespace) {
            Some(pos) => head.split_at(pos),
            None => (head, ""),
        };

        Ok(Self {
            line_number,
            duration: duration.to_string(),
            attributes: parse_attributes(attrs_part),
            title,
            raw: line.to_string(),
            modified: false,
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an attribute's value in place, or insert it at `position`
    /// when absent
    pub fn set_attribute(&mut self, key: &str, value: &str, position: usize) {
        self.modified = true;
        if let Some(existing) = self.attributes.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
            return;
        }
        let position = position.min(self.attributes.len());
        self.attributes
            .insert(position, (key.to_string(), value.to_string()));
    }

    pub fn attribute_position(&self, key: &str) -> Option<usize> {
        self.attributes.iter().position(|(k, _)| k == key)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn to_line(&self) -> String {
        if !self.modified {
            return self.raw.clone();
        }
        let mut line = format!("#EXTINF:{}", self.duration);
        for (key, value) in &self.attributes {
            line.push_str(&format!(" {key}=\"{value}\""));
        }
        line.push(',');
        line.push_str(&self.title);
        line
    }
}

/// Position of the comma separating attributes from the title; commas inside
/// quoted attribute values do not count
fn title_separator(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (pos, ch) in content.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(pos),
            _ => {}
        }
    }
    None
}

fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;

    for ch in attributes.chars() {
        match ch {
            '"' if in_value => {
                in_quotes = !in_quotes;
                if !in_quotes {
                    attrs.push((current_key.trim().to_string(), std::mem::take(&mut current_value)));
                    current_key.clear();
                    in_value = false;
                }
            }
            '=' if !in_quotes && !in_value => in_value = true,
            ' ' | '\t' if !in_quotes => {
                if in_value && !current_value.is_empty() {
                    attrs.push((current_key.trim().to_string(), std::mem::take(&mut current_value)));
                    current_key.clear();
                    in_value = false;
                } else if !in_value {
                    current_key.clear();
                }
            }
            _ => {
                if in_value {
                    current_value.push(ch);
                } else {
                    current_key.push(ch);
                }
            }
        }
    }

    if in_value && !current_value.is_empty() {
        attrs.push((current_key.trim().to_string(), current_value));
    }

    attrs
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistLine {
    Extinf(ExtinfEntry),
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    lines: Vec<PlaylistLine>,
}

impl Playlist {
    pub fn parse(content: &str) -> AppResult<Self> {
        let lines = content
            .lines()
            .enumerate()
            .map(|(index, line)| {
                if line.starts_with("#EXTINF") {
                    ExtinfEntry::parse(line, index + 1).map(PlaylistLine::Extinf)
                } else {
                    Ok(PlaylistLine::Other(line.to_string()))
                }
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { lines })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ExtinfEntry> {
        self.lines.iter().filter_map(|line| match line {
            PlaylistLine::Extinf(entry) => Some(entry),
            PlaylistLine::Other(_) => None,
        })
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ExtinfEntry> {
        self.lines.iter_mut().filter_map(|line| match line {
            PlaylistLine::Extinf(entry) => Some(entry),
            PlaylistLine::Other(_) => None,
        })
    }
}

impl fmt::Display for Playlist {
    /// Lines joined with `\n`, without a trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            match line {
                PlaylistLine::Extinf(entry) => write!(f, "{}", entry.to_line())?,
                PlaylistLine::Other(text) => write!(f, "{text}")?,
            }
        }
        Ok(())
    }
}
