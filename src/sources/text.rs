//! Line-oriented text resources (wanted-id lists, playlists) from disk or
//! over http(s)

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::matching::WantedSet;
use crate::sources::http::HttpFetcher;
use crate::utils::url::UrlUtils;

/// Read a text resource from a local path or a URL
pub async fn load_text(
    location: &str,
    fetcher: &HttpFetcher,
    cancel: &CancellationToken,
) -> AppResult<String> {
    if UrlUtils::is_remote(location) {
        info!("Downloading {}", UrlUtils::obfuscate_credentials(location));
        fetcher.fetch_text(location, cancel).await
    } else {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| AppError::source_unavailable(location, e.to_string()))
    }
}

/// Read a line-oriented wanted-id list from a local path or a URL
pub async fn load_wanted_set(
    location: &str,
    fetcher: &HttpFetcher,
    cancel: &CancellationToken,
) -> AppResult<WantedSet> {
    let text = load_text(location, fetcher, cancel).await?;
    let wanted = WantedSet::from_lines(&text);
    info!("Loaded {} wanted channel ids", wanted.len());
    Ok(wanted)
}
