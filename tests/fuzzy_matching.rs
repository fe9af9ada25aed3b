//! Fuzzy matcher behaviour and fuzzy resolution of wanted ids during filtering

use std::io::BufReader;

use flate2::read::MultiGzDecoder;
use proptest::prelude::*;
use rstest::rstest;

use epg_filter::engine::{Engine, EngineConfig, RunMode};
use epg_filter::errors::AppResult;
use epg_filter::matching::{FuzzyMatcher, MatcherConfig, WantedSet};
use epg_filter::sources::MemorySource;
use epg_filter::xmltv::{RecordReader, XmltvRecord};

fn matcher(threshold: u8) -> FuzzyMatcher {
    FuzzyMatcher::new(&MatcherConfig {
        threshold,
        ..MatcherConfig::default()
    })
}

#[test]
fn test_quality_tag_is_ignored_when_matching() {
    let result = matcher(85)
        .find_match("ESPN HD", &["ESPN", "ESPN2", "Fox Sports"])
        .unwrap();

    assert_eq!(result.candidate, "ESPN");
    assert_eq!(result.candidate_index, 0);
    assert_eq!(result.score, 100.0);
    assert!(result.accepted);
}

#[rstest]
#[case("Sky Sports News", &["News Sky Sports", "Sky News"], Some("News Sky Sports"))]
#[case("BBC One", &["ITV", "Channel 4"], None)]
#[case("  HD  ", &["HD"], None)]
#[case("Nickelodeon", &[], None)]
fn test_find_match_cases(
    #[case] query: &str,
    #[case] candidates: &[&str],
    #[case] expected: Option<&str>,
) {
    let found = matcher(85).find_match(query, candidates);
    assert_eq!(found.map(|r| r.candidate), expected.map(str::to_string));
}

#[test]
fn test_best_candidate_reports_rejected_score() {
    let result = matcher(85)
        .best_candidate("Discovery", &["Disney", "Discovery Science"])
        .unwrap();
    assert!(!result.accepted);
    assert_eq!(result.candidate, "Discovery Science");
    assert!(result.score < 85.0);
}

#[tokio::test]
async fn test_fuzzy_filter_admits_channel_by_display_name() {
    let xml = r#"<tv>
  <channel id="espn-hd.us"><display-name>ESPN HD</display-name></channel>
  <channel id="espn-alt.us"><display-name>ESPN</display-name></channel>
  <channel id="fox.us"><display-name>Fox Sports</display-name></channel>
  <programme channel="espn-hd.us"><title>SportsCenter</title></programme>
  <programme channel="fox.us"><title>NFL</title></programme>
</tv>"#;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("filtered.xml.gz");
    let engine = Engine::new(EngineConfig {
        fuzzy_filter: true,
        ..EngineConfig::default()
    });

    let summary = engine
        .run(
            RunMode::Filter(WantedSet::from_lines("ESPN\nnhk.jp\n")),
            vec![Box::new(MemorySource::new("us", xml))],
            &output,
        )
        .await
        .unwrap();

    let file = std::fs::File::open(&output).unwrap();
    let records = RecordReader::new(BufReader::new(MultiGzDecoder::new(file)))
        .collect::<AppResult<Vec<_>>>()
        .unwrap();
    let ids: Vec<&str> = records
        .iter()
        .filter_map(|record| match record {
            XmltvRecord::Channel(channel) => Some(channel.id.as_str()),
            _ => None,
        })
        .collect();

    // the token resolves once, so the second ESPN channel stays out
    assert_eq!(ids, vec!["espn-hd.us"]);
    assert_eq!(summary.programmes_accepted, 1);
    assert_eq!(summary.fuzzy_resolutions.len(), 1);
    assert_eq!(summary.fuzzy_resolutions[0].channel_id, "espn-hd.us");
    assert_eq!(summary.unmatched_wanted, vec!["nhk.jp".to_string()]);
}

proptest! {
    #[test]
    fn prop_matching_is_deterministic(
        query in "[A-Za-z0-9 ]{0,16}",
        candidates in prop::collection::vec("[A-Za-z0-9 ]{0,16}", 0..8),
        threshold in 0u8..=100,
    ) {
        let first = matcher(threshold).best_candidate(&query, &candidates);
        let second = matcher(threshold).best_candidate(&query, &candidates);
        prop_assert_eq!(&first, &second);

        if let Some(result) = first {
            // no earlier candidate scores as high as the winner
            let m = matcher(threshold);
            for earlier in &candidates[..result.candidate_index] {
                prop_assert!(m.score(&query, earlier) < result.score);
            }
            prop_assert_eq!(result.accepted, result.score >= f64::from(threshold));
        }
    }

    #[test]
    fn prop_duplicate_candidates_resolve_to_first(
        name in "[a-z]{1,10}",
        padding in prop::collection::vec("[0-9]{3}", 0..4),
    ) {
        prop_assume!(!MatcherConfig::default().quality_tags.contains(&name));
        let mut candidates = padding.clone();
        candidates.push(name.clone());
        candidates.push(name.clone());

        let result = matcher(85).find_match(&name, &candidates).unwrap();
        prop_assert_eq!(result.candidate_index, padding.len());
    }
}
