use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_filter::{
    config::{Config, defaults::DEFAULT_MAPPING_PATH},
    engine::{Engine, RunMode, RunSummary},
    errors::AppError,
    matching::FuzzyMatcher,
    playlist::{ChannelMapping, Playlist},
    sources::{ByteSource, HttpFetcher, load_text, load_wanted_set, source_for_location},
};

#[derive(Parser)]
#[command(name = "epg-filter")]
#[command(version)]
#[command(about = "Filter, merge and deduplicate XMLTV EPG feeds")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep only the wanted channels of one or more feeds
    Filter(FilterArgs),
    /// Merge feeds, keeping the first definition of each channel
    Merge(MergeArgs),
    /// Generate a playlist -> EPG channel mapping by fuzzy matching
    Map(MapArgs),
    /// Apply a channel mapping to a playlist
    ApplyMapping(ApplyMappingArgs),
    /// Write a configuration file with default values
    InitConfig,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file (gzip XMLTV)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Enable content optimization
    #[arg(long)]
    optimize: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    summary_json: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Feed path or URL (repeatable; overrides `filter.source`)
    #[arg(short, long = "source", value_name = "LOCATION")]
    sources: Vec<String>,

    /// Wanted-id list path or URL (overrides `filter.wanted_ids`)
    #[arg(short, long, value_name = "LOCATION")]
    wanted: Option<String>,

    /// Admit channels whose display name fuzzily matches a wanted id
    #[arg(long)]
    fuzzy: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct MergeArgs {
    /// Feed paths or URLs, in priority order (overrides `merge.sources`)
    #[arg(short, long = "source", value_name = "LOCATION")]
    sources: Vec<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct MapArgs {
    /// Playlist path or URL
    #[arg(short, long, value_name = "LOCATION")]
    playlist: String,

    /// EPG feed paths or URLs (overrides `merge.sources`)
    #[arg(short, long = "source", value_name = "LOCATION")]
    sources: Vec<String>,

    /// Mapping JSON to write
    #[arg(short, long, default_value = DEFAULT_MAPPING_PATH)]
    output: PathBuf,
}

#[derive(Args)]
struct ApplyMappingArgs {
    /// Playlist path or URL
    #[arg(short, long, value_name = "LOCATION")]
    playlist: String,

    /// Mapping JSON produced by `map`
    #[arg(short, long, default_value = DEFAULT_MAPPING_PATH)]
    mapping: PathBuf,

    /// Playlist to write
    #[arg(short, long, default_value = "modified_playlist.m3u")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_filter={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::InitConfig = cli.command {
        Config::write_default(&cli.config)?;
        info!("Wrote default configuration to {}", cli.config.display());
        return Ok(());
    }

    info!("Starting epg-filter v{}", env!("CARGO_PKG_VERSION"));
    let config = Config::load_from_file(&cli.config)?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());
    let fetcher = HttpFetcher::new(&config.fetch)?;

    match cli.command {
        Command::Filter(args) => run_filter(config, args, fetcher, cancel).await,
        Command::Merge(args) => run_merge(config, args, fetcher, cancel).await,
        Command::Map(args) => run_map(config, args, fetcher, cancel).await,
        Command::ApplyMapping(args) => run_apply_mapping(args, fetcher, cancel).await,
        Command::InitConfig => Ok(()),
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

fn apply_output_args(config: &mut Config, output: &OutputArgs) {
    if let Some(path) = &output.output {
        config.output.path = path.clone();
    }
    if output.optimize {
        config.optimization.enabled = true;
    }
}

fn build_sources(locations: &[String], fetcher: &HttpFetcher) -> Vec<Box<dyn ByteSource>> {
    locations
        .iter()
        .map(|location| source_for_location(location, fetcher))
        .collect()
}

async fn run_filter(
    mut config: Config,
    args: FilterArgs,
    fetcher: HttpFetcher,
    cancel: CancellationToken,
) -> Result<()> {
    apply_output_args(&mut config, &args.output);
    if args.fuzzy {
        config.filter.fuzzy = true;
    }

    let sources = if args.sources.is_empty() {
        config.filter.source.clone().into_iter().collect::<Vec<_>>()
    } else {
        args.sources
    };
    let wanted_location = args
        .wanted
        .or_else(|| config.filter.wanted_ids.clone())
        .ok_or_else(|| {
            AppError::configuration("No wanted-id list given (--wanted or filter.wanted_ids)")
        })?;

    let wanted = load_wanted_set(&wanted_location, &fetcher, &cancel).await?;
    let engine = Engine::with_cancellation(config.engine_config(), cancel);
    let summary = engine
        .run(
            RunMode::Filter(wanted),
            build_sources(&sources, &fetcher),
            &config.output.path,
        )
        .await?;

    report(&config, &summary, args.output.summary_json)
}

async fn run_merge(
    mut config: Config,
    args: MergeArgs,
    fetcher: HttpFetcher,
    cancel: CancellationToken,
) -> Result<()> {
    apply_output_args(&mut config, &args.output);
    let sources = if args.sources.is_empty() {
        config.merge.sources.clone()
    } else {
        args.sources
    };

    let engine = Engine::with_cancellation(config.engine_config(), cancel);
    let summary = engine
        .run(RunMode::Merge, build_sources(&sources, &fetcher), &config.output.path)
        .await?;

    report(&config, &summary, args.output.summary_json)
}

async fn run_map(
    config: Config,
    args: MapArgs,
    fetcher: HttpFetcher,
    cancel: CancellationToken,
) -> Result<()> {
    let sources = if args.sources.is_empty() {
        config.merge.sources.clone()
    } else {
        args.sources
    };

    let playlist = Playlist::parse(&load_text(&args.playlist, &fetcher, &cancel).await?)?;
    let engine = Engine::with_cancellation(config.engine_config(), cancel);
    let catalog = engine
        .collect_channel_catalog(build_sources(&sources, &fetcher))
        .await?;

    let matcher = FuzzyMatcher::new(&config.matcher_config());
    let mapping = ChannelMapping::generate(&playlist, &catalog, &matcher);
    mapping.save(&args.output)?;
    info!(
        "Generated mapping for {} channels into {}",
        mapping.len(),
        args.output.display()
    );
    Ok(())
}

async fn run_apply_mapping(
    args: ApplyMappingArgs,
    fetcher: HttpFetcher,
    cancel: CancellationToken,
) -> Result<()> {
    let mapping = ChannelMapping::load(&args.mapping)?;
    let mut playlist = Playlist::parse(&load_text(&args.playlist, &fetcher, &cancel).await?)?;
    let updated = mapping.apply(&mut playlist);

    tokio::fs::write(&args.output, playlist.to_string())
        .await
        .with_context(|| format!("Failed to write playlist to {}", args.output.display()))?;
    info!(
        "Wrote playlist with {} mapped entries to {}",
        updated,
        args.output.display()
    );
    Ok(())
}

fn report(config: &Config, summary: &RunSummary, as_json: bool) -> Result<()> {
    summary.log(config.progress.top_channels);
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}
