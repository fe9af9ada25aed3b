use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::engine::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::matching::MatcherConfig;
use crate::xmltv::OptimizerConfig;

/// Environment variable prefix for configuration overrides
/// (`EPG_FILTER_FETCH__TIMEOUT=2m` sets `fetch.timeout`)
pub const ENV_PREFIX: &str = "EPG_FILTER_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Retrieval settings for remote feeds and wanted lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total request timeout, including body transfer
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Number of feeds downloaded in parallel
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// gzip level, 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Written as `generator-info-name` on the `<tv>` root when set
    #[serde(default = "default_generator_name")]
    pub generator_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Feed location (path or http(s) URL)
    pub source: Option<String>,
    /// Wanted id list location (path or http(s) URL), one id per line
    pub wanted_ids: Option<String>,
    /// Resolve unmatched channels against wanted ids by display name
    #[serde(default)]
    pub fuzzy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum similarity score (0-100) for a fuzzy match
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Whole-word tokens ignored when comparing display names
    #[serde(default = "default_quality_tags")]
    pub quality_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Compare programme `channel` attributes to channel ids ignoring case
    #[serde(default)]
    pub case_insensitive_channel_refs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Strip low-value programme children even when they carry content
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default = "default_strip_elements")]
    pub strip_elements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Log progress every N parsed elements (0 disables)
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    /// Number of channels listed in the end-of-run summary
    #[serde(default = "default_top_channels")]
    pub top_channels: usize,
}

fn default_fetch_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_FETCH_TIMEOUT).unwrap_or(Duration::from_secs(600))
}

fn default_connect_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_CONNECT_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_generator_name() -> Option<String> {
    Some(DEFAULT_GENERATOR_NAME.to_string())
}

fn default_threshold() -> u8 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_quality_tags() -> Vec<String> {
    DEFAULT_QUALITY_TAGS.iter().map(|s| s.to_string()).collect()
}

fn default_strip_elements() -> Vec<String> {
    DEFAULT_LOW_VALUE_ELEMENTS.iter().map(|s| s.to_string()).collect()
}

fn default_log_every() -> u64 {
    DEFAULT_PROGRESS_LOG_EVERY
}

fn default_top_channels() -> usize {
    DEFAULT_SUMMARY_TOP_CHANNELS
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            connect_timeout: default_connect_timeout(),
            max_concurrent: default_max_concurrent(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            compression_level: default_compression_level(),
            generator_name: default_generator_name(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            quality_tags: default_quality_tags(),
        }
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            aggressive: false,
            strip_elements: default_strip_elements(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            log_every: default_log_every(),
            top_channels: default_top_channels(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file merged with `EPG_FILTER_*`
    /// environment overrides. A missing file yields the defaults.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let path = config_file.as_ref();
        if !path.exists() {
            info!(
                "Config file {} not found, using defaults",
                path.display()
            );
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::configuration(e.to_string()))
    }

    /// Write the default configuration to `config_file`, refusing to overwrite
    pub fn write_default<P: AsRef<Path>>(config_file: P) -> AppResult<()> {
        let path = config_file.as_ref();
        if path.exists() {
            return Err(AppError::configuration(format!(
                "{} already exists",
                path.display()
            )));
        }
        let contents = Self::default().to_toml_string()?;
        std::fs::write(path, contents)
            .map_err(|e| AppError::output_write(path.display().to_string(), e))?;
        info!("Created default config file: {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.matching.threshold > 100 {
            return Err(AppError::configuration(format!(
                "matching.threshold must be between 0 and 100, got {}",
                self.matching.threshold
            )));
        }
        if self.output.compression_level > 9 {
            return Err(AppError::configuration(format!(
                "output.compression_level must be between 0 and 9, got {}",
                self.output.compression_level
            )));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::configuration(
                "fetch.max_concurrent must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build the explicit engine configuration for a run
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent_fetches: self.fetch.max_concurrent,
            compression_level: self.output.compression_level,
            generator_name: self.output.generator_name.clone(),
            fuzzy_filter: self.filter.fuzzy,
            case_insensitive_channel_refs: self.identity.case_insensitive_channel_refs,
            matcher: self.matcher_config(),
            optimizer: self.optimization.enabled.then(|| OptimizerConfig {
                aggressive: self.optimization.aggressive,
                strip_elements: self.optimization.strip_elements.clone(),
            }),
            progress_log_every: self.progress.log_every,
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            threshold: self.matching.threshold,
            quality_tags: self.matching.quality_tags.clone(),
        }
    }
}
