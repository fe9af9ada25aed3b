//! Multi-feed merge runs with first-seen channel deduplication

use std::io::BufReader;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use rstest::rstest;

use epg_filter::engine::{Engine, EngineConfig, RunMode};
use epg_filter::errors::AppResult;
use epg_filter::sources::{ByteSource, FileSource, MemorySource};
use epg_filter::xmltv::{OptimizerConfig, RecordReader, XmltvRecord};

fn read_output(path: &Path) -> Vec<XmltvRecord> {
    let file = std::fs::File::open(path).unwrap();
    RecordReader::new(BufReader::new(MultiGzDecoder::new(file)))
        .collect::<AppResult<Vec<_>>>()
        .unwrap()
}

fn channels(records: &[XmltvRecord]) -> Vec<(String, Vec<String>)> {
    records
        .iter()
        .filter_map(|record| match record {
            XmltvRecord::Channel(channel) => {
                Some((channel.id.clone(), channel.display_names.clone()))
            }
            _ => None,
        })
        .collect()
}

fn programme_count(records: &[XmltvRecord]) -> usize {
    records
        .iter()
        .filter(|record| matches!(record, XmltvRecord::Programme(_)))
        .count()
}

fn feed(label: &str, display_name: &str, programmes: usize) -> Box<dyn ByteSource> {
    let mut xml = format!(
        "<tv>\n  <channel id=\"CNN.us\"><display-name>{display_name}</display-name></channel>\n"
    );
    for hour in 0..programmes {
        xml.push_str(&format!(
            "  <programme start=\"202401010{hour}0000 +0000\" channel=\"CNN.us\"><title>Hour {hour}</title></programme>\n"
        ));
    }
    xml.push_str("</tv>\n");
    Box::new(MemorySource::new(label, xml))
}

#[tokio::test]
async fn test_shared_channel_is_written_once_with_all_programmes() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.xml.gz");
    let engine = Engine::new(EngineConfig::default());

    let summary = engine
        .run(
            RunMode::Merge,
            vec![feed("us-1", "CNN", 3), feed("us-2", "CNN International", 2)],
            &output,
        )
        .await
        .unwrap();

    let records = read_output(&output);
    assert_eq!(
        channels(&records),
        vec![("CNN.us".to_string(), vec!["CNN".to_string()])]
    );
    assert_eq!(programme_count(&records), 5);

    assert_eq!(summary.feeds_processed, 2);
    assert_eq!(summary.duplicate_channels, 1);
    assert_eq!(summary.programme_count("CNN.us"), Some(5));
    assert!(summary.wanted_ids == 0 && summary.unmatched_wanted.is_empty());
}

#[rstest]
#[case::first_feed_wins(vec!["a", "b"], "From A")]
#[case::order_decides(vec!["b", "a"], "From B")]
#[tokio::test]
async fn test_first_definition_in_processing_order_wins(
    #[case] order: Vec<&str>,
    #[case] expected_name: &str,
) {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.xml.gz");
    let sources: Vec<Box<dyn ByteSource>> = order
        .into_iter()
        .map(|label| {
            let name = if label == "a" { "From A" } else { "From B" };
            // ids differ only in case; they share one identity
            let id = if label == "a" { "tf1.fr" } else { "TF1.FR" };
            Box::new(MemorySource::new(
                label,
                format!("<tv><channel id=\"{id}\"><display-name>{name}</display-name></channel></tv>"),
            )) as Box<dyn ByteSource>
        })
        .collect();

    Engine::new(EngineConfig::default())
        .run(RunMode::Merge, sources, &output)
        .await
        .unwrap();

    let merged = channels(&read_output(&output));
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].1, vec![expected_name.to_string()]);
}

#[tokio::test]
async fn test_failed_feed_is_recorded_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.xml.gz");
    let engine = Engine::new(EngineConfig::default());

    let summary = engine
        .run(
            RunMode::Merge,
            vec![
                feed("us", "CNN", 1),
                Box::new(FileSource::new(dir.path().join("missing.xml.gz"))),
                Box::new(MemorySource::new(
                    "truncated",
                    "<tv><channel id=\"BBC1.uk\"><display-name>BBC One</display-name></channel><programme",
                )),
            ],
            &output,
        )
        .await
        .unwrap();

    assert_eq!(summary.feed_failures.len(), 2);
    assert!(summary.feed_failures.iter().any(|f| f.feed.ends_with("missing.xml.gz")));
    assert!(summary.feed_failures.iter().any(|f| f.feed == "truncated"));

    let records = read_output(&output);
    let ids: Vec<String> = channels(&records).into_iter().map(|(id, _)| id).collect();
    // records streamed before the truncation point are kept
    assert_eq!(ids, vec!["CNN.us", "BBC1.uk"]);
}

#[tokio::test]
async fn test_optimized_merge_strips_low_value_elements() {
    let xml = r#"<tv>
  <channel id="RAI1.it"><display-name>  Rai   1 </display-name></channel>
  <programme channel="RAI1.it">
    <title>Telegiornale</title>
    <sub-title></sub-title>
    <credits><director>Someone</director></credits>
    <desc>Notizie   del
      giorno</desc>
  </programme>
</tv>"#;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.xml.gz");
    let config = EngineConfig {
        optimizer: Some(OptimizerConfig {
            aggressive: true,
            ..OptimizerConfig::default()
        }),
        ..EngineConfig::default()
    };

    Engine::new(config)
        .run(
            RunMode::Merge,
            vec![Box::new(MemorySource::new("it", xml))],
            &output,
        )
        .await
        .unwrap();

    let records = read_output(&output);
    let XmltvRecord::Programme(programme) = &records[1] else {
        panic!("expected a programme, got {:?}", records[1]);
    };
    let names: Vec<&str> = programme
        .element
        .child_elements()
        .map(|child| child.name.as_str())
        .collect();
    assert_eq!(names, vec!["title", "desc"]);
    let desc = programme.element.child_elements().nth(1).unwrap();
    assert_eq!(desc.text(), "Notizie del giorno");
}

#[tokio::test]
async fn test_merge_with_no_usable_feed_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("merged.xml.gz");
    let engine = Engine::new(EngineConfig::default());

    let result = engine
        .run(
            RunMode::Merge,
            vec![
                Box::new(FileSource::new(dir.path().join("missing.xml.gz"))) as Box<dyn ByteSource>,
                Box::new(MemorySource::new("truncated", "<tv><channel id=\"a\">")),
            ],
            &output,
        )
        .await;

    let error = result.unwrap_err();
    assert!(error.is_feed_scoped());
    assert!(error.to_string().contains("truncated"));
    assert!(!output.exists());
}
