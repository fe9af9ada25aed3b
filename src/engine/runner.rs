use std::io::{BufWriter, Read};
use std::path::Path;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::pipeline::Pipeline;
use crate::engine::summary::RunSummary;
use crate::engine::{EngineConfig, RunMode, RunState};
use crate::errors::{AppError, AppResult};
use crate::sources::ByteSource;

pub(crate) type FetchedFeed = (String, AppResult<Box<dyn Read + Send>>);

/// Runs filter and merge jobs over a set of byte sources
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) cancel: CancellationToken,
    state_tx: watch::Sender<RunState>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    pub fn with_cancellation(config: EngineConfig, cancel: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            config,
            cancel,
            state_tx,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Observe state transitions of the current and future runs
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        debug!("Engine state -> {}", state);
        self.state_tx.send_replace(state);
    }

    /// Stream every source through the identity index into a gzip XMLTV
    /// document at `output_path`.
    ///
    /// The document is written to a temporary file next to `output_path` and
    /// only moved into place once the run succeeds, so a failed or cancelled
    /// run never leaves an output file behind.
    pub async fn run(
        &self,
        mode: RunMode,
        sources: Vec<Box<dyn ByteSource>>,
        output_path: &Path,
    ) -> AppResult<RunSummary> {
        self.set_state(RunState::Idle);
        let result = self.execute(mode, sources, output_path).await;
        match &result {
            Ok(_) => self.set_state(RunState::Done),
            Err(e) => {
                error!("EPG run failed: {}", e);
                self.set_state(RunState::Failed);
            }
        }
        result
    }

    async fn execute(
        &self,
        mode: RunMode,
        sources: Vec<Box<dyn ByteSource>>,
        output_path: &Path,
    ) -> AppResult<RunSummary> {
        let started = Instant::now();

        if let RunMode::Filter(wanted) = &mode {
            if wanted.is_empty() {
                return Err(AppError::NoWantedIds);
            }
        }
        if sources.is_empty() {
            return Err(AppError::configuration("No EPG sources given"));
        }
        let fail_fast = matches!(mode, RunMode::Filter(_));
        info!(
            "Starting {} run over {} feed(s) into {}",
            mode.name(),
            sources.len(),
            output_path.display()
        );

        self.set_state(RunState::FetchingSources);
        let mut opened = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();
        for (label, result) in self.fetch_all(&sources).await {
            match result {
                Ok(reader) => opened.push((label, reader)),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) if fail_fast => return Err(e),
                Err(e) => {
                    warn!("Skipping feed {}: {}", label, e);
                    failures.push((label, e));
                }
            }
        }
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if opened.is_empty() {
            if let Some((label, e)) = failures.pop() {
                warn!(
                    "None of the {} feed(s) could be retrieved, last failure was {}",
                    failures.len() + 1,
                    label
                );
                return Err(e);
            }
        }

        self.set_state(RunState::Streaming);
        let output_label = output_path.display().to_string();
        let temp = create_temp_output(output_path)?;
        let sink = temp
            .reopen()
            .map_err(|e| AppError::output_write(&output_label, e))?;

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let task_label = output_label.clone();
        let summary = tokio::task::spawn_blocking(move || -> AppResult<RunSummary> {
            let mut pipeline =
                Pipeline::new(&config, mode, BufWriter::new(sink), task_label.clone(), cancel)?;
            for (label, error) in &failures {
                pipeline.record_failure(label, error);
            }
            let mut last_error = failures.into_iter().last().map(|(_, e)| e);

            let mut feeds_ok = 0usize;
            for (label, reader) in opened {
                info!("Processing feed {}", label);
                match pipeline.process_feed(&label, reader) {
                    Ok(()) => feeds_ok += 1,
                    Err(e) if fail_fast || !e.is_feed_scoped() => return Err(e),
                    Err(e) => {
                        warn!("Feed {} failed and was skipped: {}", label, e);
                        pipeline.record_failure(&label, &e);
                        last_error = Some(e);
                    }
                }
            }
            // a merge with no usable feed is a failed run, not an empty document
            if feeds_ok == 0 {
                if let Some(e) = last_error {
                    return Err(e);
                }
            }

            let (writer, summary) = pipeline.finish()?;
            let file = writer
                .into_inner()
                .map_err(|e| AppError::output_write(&task_label, e.into_error()))?;
            file.sync_all()
                .map_err(|e| AppError::output_write(&task_label, e))?;
            Ok(summary)
        })
        .await
        .map_err(|e| AppError::internal(format!("Streaming task failed: {e}")))??;

        self.set_state(RunState::Finalizing);
        temp.persist(output_path)
            .map_err(|e| AppError::output_write(&output_label, e.error))?;

        let mut summary = summary;
        summary.output_bytes = tokio::fs::metadata(output_path)
            .await
            .map(|metadata| metadata.len())
            .map_err(|e| AppError::output_write(&output_label, e))?;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Retrieve all sources with bounded concurrency, preserving input order
    pub(crate) async fn fetch_all(&self, sources: &[Box<dyn ByteSource>]) -> Vec<FetchedFeed> {
        let cancel = &self.cancel;
        stream::iter(sources)
            .map(|source| async move {
                let label = source.label();
                let result = source.open(cancel).await;
                (label, result)
            })
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await
    }
}

fn create_temp_output(output_path: &Path) -> AppResult<NamedTempFile> {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".epg-filter-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| AppError::output_write(output_path.display().to_string(), e))
}
