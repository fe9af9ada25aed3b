//! Byte sources for EPG feeds plus text resources (wanted ids, playlists)

pub mod file;
pub mod http;
pub mod text;
pub mod traits;

pub use file::{FileSource, MemorySource};
pub use http::{HttpFetcher, HttpSource};
pub use text::{load_text, load_wanted_set};
pub use traits::ByteSource;

use crate::utils::url::UrlUtils;

/// Pick the source implementation for a feed location
pub fn source_for_location(location: &str, fetcher: &HttpFetcher) -> Box<dyn ByteSource> {
    if UrlUtils::is_remote(location) {
        Box::new(HttpSource::new(location, fetcher.clone()))
    } else {
        Box::new(FileSource::new(location))
    }
}
