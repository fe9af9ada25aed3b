/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Retrieval defaults
pub const DEFAULT_FETCH_TIMEOUT: &str = "10m";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "30s";
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;
pub const DEFAULT_USER_AGENT: &str = concat!("epg-filter/", env!("CARGO_PKG_VERSION"));

// Output defaults
pub const DEFAULT_OUTPUT_PATH: &str = "filtered_epg.xml.gz";
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_GENERATOR_NAME: &str = "epg-filter";

// Matching defaults
pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 85;
pub const DEFAULT_QUALITY_TAGS: &[&str] = &["hd", "fhd", "sd", "uhd", "4k", "1080p"];

// Optimization defaults
pub const DEFAULT_LOW_VALUE_ELEMENTS: &[&str] = &[
    "sub-title",
    "credits",
    "star-rating",
    "review",
    "icon",
    "language",
];

// Progress and summary defaults
pub const DEFAULT_PROGRESS_LOG_EVERY: u64 = 10_000;
pub const DEFAULT_SUMMARY_TOP_CHANNELS: usize = 20;

// Mapping defaults
pub const DEFAULT_MAPPING_PATH: &str = "channel_mapping.json";
