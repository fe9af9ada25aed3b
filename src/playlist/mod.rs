//! M3U playlist handling for the channel-mapping feature

pub mod m3u;
pub mod mapping;

pub use m3u::{ExtinfEntry, Playlist, PlaylistLine};
pub use mapping::{ChannelMapping, MappingEntry};
