//! Synchronous record routing shared by all feeds of a run
//!
//! The pipeline exclusively owns the identity index and the output writer.
//! It runs on a single blocking thread, one feed at a time.

use std::collections::HashSet;
use std::io::{Read, Write};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::engine::summary::{ChannelCount, FeedFailure, FuzzyResolution, RunSummary};
use crate::engine::{EngineConfig, RunMode};
use crate::errors::{AppError, AppResult};
use crate::matching::{FuzzyMatcher, IdentityIndex, WantedSet};
use crate::utils::DecompressionService;
use crate::xmltv::{
    ChannelRecord, ContentOptimizer, ProgrammeRecord, RecordReader, XmltvRecord, XmltvWriter,
    normalize_id,
};

/// Filter-mode state: the wanted set and which of its tokens are resolved
struct FilterState {
    wanted: WantedSet,
    resolved: HashSet<String>,
    matcher: Option<FuzzyMatcher>,
}

pub(crate) struct Pipeline<W: Write> {
    filter: Option<FilterState>,
    index: IdentityIndex,
    writer: XmltvWriter<W>,
    optimizer: Option<ContentOptimizer>,
    summary: RunSummary,
    output_label: String,
    cancel: CancellationToken,
    progress_log_every: u64,
    next_progress_at: u64,
}

impl<W: Write> Pipeline<W> {
    pub(crate) fn new(
        config: &EngineConfig,
        mode: RunMode,
        sink: W,
        output_label: String,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        let writer = XmltvWriter::new(
            sink,
            config.compression_level,
            config.generator_name.as_deref(),
        )
        .map_err(|e| AppError::output_write(&output_label, e))?;

        let (filter, mut summary) = match mode {
            RunMode::Filter(wanted) => {
                let mut summary = RunSummary::new("filter");
                summary.wanted_ids = wanted.len();
                let matcher = config
                    .fuzzy_filter
                    .then(|| FuzzyMatcher::new(&config.matcher));
                (
                    Some(FilterState {
                        wanted,
                        resolved: HashSet::new(),
                        matcher,
                    }),
                    summary,
                )
            }
            RunMode::Merge => (None, RunSummary::new("merge")),
        };
        summary.output_path = Some(output_label.clone());

        let progress_log_every = config.progress_log_every;
        Ok(Self {
            filter,
            index: IdentityIndex::new(config.case_insensitive_channel_refs),
            writer,
            optimizer: config.optimizer.as_ref().map(ContentOptimizer::new),
            summary,
            output_label,
            cancel,
            progress_log_every,
            next_progress_at: progress_log_every,
        })
    }

    /// Stream one feed through the index into the writer.
    ///
    /// On error the records already written from this feed stay in the
    /// output; the caller decides whether the run continues.
    pub(crate) fn process_feed(&mut self, label: &str, raw: Box<dyn Read + Send>) -> AppResult<()> {
        let (format, input) = DecompressionService::decompressing_reader(raw)?;
        debug!("Streaming feed {} ({:?})", label, format);

        let mut reader = RecordReader::new(input);
        let elements_before = self.summary.elements_parsed;
        let result = self.drain(&mut reader, elements_before);
        self.summary.elements_parsed = elements_before + reader.elements_parsed();
        self.summary.feeds_processed += 1;

        result.map_err(|e| match e {
            AppError::MalformedInput { offset, message } => {
                AppError::MalformedInput {
                    offset,
                    message: format!("{label}: {message}"),
                }
            }
            other => other,
        })
    }

    fn drain<R: std::io::BufRead>(
        &mut self,
        reader: &mut RecordReader<R>,
        elements_before: u64,
    ) -> AppResult<()> {
        while let Some(record) = reader.next() {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            match record? {
                XmltvRecord::Channel(channel) => self.handle_channel(channel)?,
                XmltvRecord::Programme(programme) => self.handle_programme(programme)?,
                XmltvRecord::Other(name) => {
                    trace!("Skipping <{}> element", name);
                    self.summary.other_elements += 1;
                }
            }

            self.log_progress(elements_before + reader.elements_parsed());
        }
        Ok(())
    }

    fn handle_channel(&mut self, mut channel: ChannelRecord) -> AppResult<()> {
        self.summary.channels_seen += 1;

        if self.index.contains(&channel.id) {
            trace!("Dropping duplicate channel {}", channel.id);
            self.summary.duplicate_channels += 1;
            return Ok(());
        }

        if let Some(filter) = self.filter.as_mut() {
            if filter.wanted.contains(&channel.id) {
                filter.resolved.insert(channel.normalized_id());
            } else {
                match resolve_fuzzy(filter, &channel) {
                    Some(resolution) => {
                        debug!(
                            "Fuzzy matched channel {} ('{}') to wanted id {} (score {:.1})",
                            channel.id,
                            resolution.result.query,
                            resolution.result.candidate,
                            resolution.result.score
                        );
                        self.summary.fuzzy_resolutions.push(resolution);
                    }
                    None => return Ok(()),
                }
            }
        }

        if let Some(optimizer) = &self.optimizer {
            optimizer.optimize_channel(&mut channel.element);
        }
        self.writer
            .write_channel(&channel)
            .map_err(|e| AppError::output_write(&self.output_label, e))?;
        self.index.insert(channel);
        self.summary.channels_accepted += 1;
        Ok(())
    }

    fn handle_programme(&mut self, mut programme: ProgrammeRecord) -> AppResult<()> {
        self.summary.programmes_seen += 1;

        if !self.index.route_programme(&programme.channel_ref) {
            self.summary.programmes_dropped += 1;
            return Ok(());
        }

        if let Some(optimizer) = &self.optimizer {
            optimizer.optimize_programme(&mut programme.element);
        }
        self.writer
            .write_programme(&programme)
            .map_err(|e| AppError::output_write(&self.output_label, e))?;
        self.summary.programmes_accepted += 1;
        Ok(())
    }

    fn log_progress(&mut self, elements_parsed: u64) {
        if self.progress_log_every == 0 || elements_parsed < self.next_progress_at {
            return;
        }
        info!(
            "Parsed {} elements - channels kept {} - programmes written {}",
            elements_parsed, self.summary.channels_accepted, self.summary.programmes_accepted
        );
        self.next_progress_at =
            (elements_parsed / self.progress_log_every + 1) * self.progress_log_every;
    }

    pub(crate) fn record_failure(&mut self, feed: &str, error: &AppError) {
        self.summary.feed_failures.push(FeedFailure {
            feed: feed.to_string(),
            error: error.to_string(),
        });
    }

    /// Close the document and hand back the sink with the final counters
    pub(crate) fn finish(mut self) -> AppResult<(W, RunSummary)> {
        let sink = self
            .writer
            .finish()
            .map_err(|e| AppError::output_write(&self.output_label, e))?;

        self.summary.channel_programme_counts = self
            .index
            .channel_counts()
            .into_iter()
            .map(|(channel_id, programmes)| ChannelCount {
                channel_id,
                programmes,
            })
            .collect();

        if let Some(filter) = &self.filter {
            self.summary.unmatched_wanted = filter
                .wanted
                .tokens()
                .iter()
                .filter(|token| !filter.resolved.contains(*token))
                .cloned()
                .collect();
        }

        Ok((sink, self.summary))
    }
}

/// Match each display name against the wanted ids nothing has claimed yet.
/// The first display name with an accepted match wins.
fn resolve_fuzzy(filter: &mut FilterState, channel: &ChannelRecord) -> Option<FuzzyResolution> {
    let matcher = filter.matcher.as_ref()?;
    let unresolved: Vec<&str> = filter
        .wanted
        .tokens()
        .iter()
        .filter(|token| !filter.resolved.contains(*token))
        .map(String::as_str)
        .collect();
    if unresolved.is_empty() {
        return None;
    }

    let result = channel
        .display_names
        .iter()
        .find_map(|name| matcher.find_match(name, &unresolved))?;

    filter.resolved.insert(normalize_id(&result.candidate));
    Some(FuzzyResolution {
        channel_id: channel.id.clone(),
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use flate2::read::GzDecoder;
    use std::io::Cursor;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="BBC1.uk"><display-name>BBC One</display-name></channel>
  <channel id="ITV1.uk"><display-name>ITV 1</display-name></channel>
  <programme channel="BBC1.uk" start="1"><title>News</title></programme>
  <programme channel="bbc1.uk" start="2"><title>Wrong case</title></programme>
  <programme channel="ITV1.uk" start="3"><title>Quiz</title></programme>
  <programme channel="CNN.us" start="4"><title>Unknown</title></programme>
</tv>
"#;

    fn run(config: &EngineConfig, mode: RunMode, feeds: &[&str]) -> (String, RunSummary) {
        let mut pipeline = Pipeline::new(
            config,
            mode,
            Vec::new(),
            "memory".to_string(),
            CancellationToken::new(),
        )
        .unwrap();
        for feed in feeds {
            pipeline
                .process_feed("feed", Box::new(Cursor::new(feed.as_bytes().to_vec())))
                .unwrap();
        }
        let (sink, summary) = pipeline.finish().unwrap();
        let mut output = String::new();
        GzDecoder::new(sink.as_slice()).read_to_string(&mut output).unwrap();
        (output, summary)
    }

    #[test]
    fn test_filter_keeps_wanted_channel_and_exact_refs() {
        let wanted = WantedSet::from_lines("bbc1.uk");
        let (output, summary) = run(&EngineConfig::default(), RunMode::Filter(wanted), &[FEED]);

        assert!(output.contains("<channel id=\"BBC1.uk\">"));
        assert!(!output.contains("ITV1.uk"));
        assert!(output.contains("<title>News</title>"));
        assert!(!output.contains("Wrong case"));

        assert_eq!(summary.channels_seen, 2);
        assert_eq!(summary.channels_accepted, 1);
        assert_eq!(summary.programmes_seen, 4);
        assert_eq!(summary.programmes_accepted, 1);
        assert_eq!(summary.programmes_dropped, 3);
        assert_eq!(summary.programme_count("BBC1.uk"), Some(1));
        assert!(summary.unmatched_wanted.is_empty());
    }

    #[test]
    fn test_case_insensitive_refs_route_mixed_case_programmes() {
        let config = EngineConfig {
            case_insensitive_channel_refs: true,
            ..Default::default()
        };
        let wanted = WantedSet::from_lines("BBC1.UK");
        let (output, summary) = run(&config, RunMode::Filter(wanted), &[FEED]);

        assert!(output.contains("Wrong case"));
        assert_eq!(summary.programme_count("BBC1.uk"), Some(2));
    }

    #[test]
    fn test_merge_counts_elements_across_feeds() {
        let (_, summary) = run(&EngineConfig::default(), RunMode::Merge, &[FEED, FEED]);

        assert_eq!(summary.feeds_processed, 2);
        assert_eq!(summary.channels_accepted, 2);
        assert_eq!(summary.duplicate_channels, 2);
        assert_eq!(summary.programme_count("BBC1.uk"), Some(2));
        assert_eq!(summary.programme_count("ITV1.uk"), Some(2));
        // per feed: 2 channels and 4 programmes with one child each, plus the root
        assert_eq!(summary.elements_parsed, 2 * 13);
    }

    #[test]
    fn test_unmatched_wanted_ids_are_reported() {
        let wanted = WantedSet::from_lines("itv1.uk\nsky1.uk\nbbc1.uk");
        let (_, summary) = run(&EngineConfig::default(), RunMode::Filter(wanted), &[FEED]);
        assert_eq!(summary.unmatched_wanted, vec!["sky1.uk".to_string()]);
    }

    #[test]
    fn test_fuzzy_filter_resolves_display_names() {
        let feed = r#"<tv>
  <channel id="espn.hd.us"><display-name>ESPN HD</display-name></channel>
  <channel id="espn2.us"><display-name>ESPN 2</display-name></channel>
  <programme channel="espn.hd.us"><title>Live</title></programme>
</tv>"#;
        let config = EngineConfig {
            fuzzy_filter: true,
            ..Default::default()
        };
        let wanted = WantedSet::from_lines("ESPN");
        let (output, summary) = run(&config, RunMode::Filter(wanted), &[feed]);

        assert!(output.contains("espn.hd.us"));
        assert!(!output.contains("espn2.us"));
        assert_eq!(summary.fuzzy_resolutions.len(), 1);
        assert_eq!(summary.fuzzy_resolutions[0].channel_id, "espn.hd.us");
        assert_eq!(summary.fuzzy_resolutions[0].result.candidate, "espn");
        assert!(summary.unmatched_wanted.is_empty());
        assert_eq!(summary.programmes_accepted, 1);
    }

    #[test]
    fn test_cancellation_stops_at_record_boundary() {
        let cancel = CancellationToken::new();
        let mut pipeline = Pipeline::new(
            &EngineConfig::default(),
            RunMode::Merge,
            Vec::new(),
            "memory".to_string(),
            cancel.clone(),
        )
        .unwrap();
        cancel.cancel();

        let result = pipeline.process_feed("feed", Box::new(Cursor::new(FEED.as_bytes().to_vec())));
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[test]
    fn test_malformed_error_names_the_feed() {
        let mut pipeline = Pipeline::new(
            &EngineConfig::default(),
            RunMode::Merge,
            Vec::new(),
            "memory".to_string(),
            CancellationToken::new(),
        )
        .unwrap();

        let result = pipeline.process_feed(
            "broken.xml",
            Box::new(Cursor::new(b"<tv><channel id=\"a\">".to_vec())),
        );
        match result {
            Err(AppError::MalformedInput { message, .. }) => assert!(message.starts_with("broken.xml")),
            other => panic!("expected malformed input, got {other:?}"),
        }
    }

    /// Accepts `budget` bytes, then fails every write
    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let written = buf.len().min(self.budget);
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_during_merge_is_fatal_output_error() {
        let mut xml =
            String::from("<tv>\n  <channel id=\"a\"><display-name>A</display-name></channel>\n");
        for i in 0..5000 {
            xml.push_str(&format!(
                "  <programme channel=\"a\" start=\"{i}\"><title>Show {i}</title></programme>\n"
            ));
        }
        xml.push_str("</tv>\n");
        // stored blocks, so the sink sees roughly as many bytes as are serialized
        let config = EngineConfig {
            compression_level: 0,
            ..Default::default()
        };

        let result = Pipeline::new(
            &config,
            RunMode::Merge,
            FailingSink { budget: 4096 },
            "full.xml.gz".to_string(),
            CancellationToken::new(),
        )
        .and_then(|mut pipeline| {
            pipeline.process_feed("big", Box::new(Cursor::new(xml.into_bytes())))?;
            pipeline.finish().map(|_| ())
        });

        match result {
            Err(e @ AppError::OutputWrite { .. }) => {
                assert!(!e.is_feed_scoped());
                assert!(e.to_string().contains("full.xml.gz"));
                assert!(e.to_string().contains("disk full"));
            }
            other => panic!("expected output write failure, got {other:?}"),
        }
    }
}
