//! Content optimization applied to records before they are written
//!
//! Collapses whitespace, strips low-value programme children and drops text
//! elements that end up with nothing in them. Sibling order and attribute
//! values are never touched, and the pass is idempotent.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::defaults::DEFAULT_LOW_VALUE_ELEMENTS;
use crate::xmltv::records::{XmlElement, XmlNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Strip the listed programme children even when they have content
    pub aggressive: bool,
    pub strip_elements: Vec<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            aggressive: false,
            strip_elements: DEFAULT_LOW_VALUE_ELEMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Runs of two or more whitespace characters; a lone newline or tab is content
fn whitespace_run() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s{2,}").expect("whitespace pattern compiles"))
}

pub struct ContentOptimizer {
    aggressive: bool,
    strip_elements: HashSet<String>,
}

impl ContentOptimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            aggressive: config.aggressive,
            strip_elements: config.strip_elements.iter().cloned().collect(),
        }
    }

    pub fn optimize_programme(&self, programme: &mut XmlElement) {
        self.optimize_children(programme, true);
    }

    pub fn optimize_channel(&self, channel: &mut XmlElement) {
        self.optimize_children(channel, false);
    }

    fn optimize_children(&self, element: &mut XmlElement, strip_low_value: bool) {
        let children = std::mem::take(&mut element.children);
        let mut kept: Vec<XmlNode> = Vec::with_capacity(children.len());

        for child in children {
            match child {
                XmlNode::Element(mut child) => {
                    let was_text_bearing = child.is_text_bearing();
                    self.optimize_children(&mut child, false);

                    if strip_low_value
                        && self.strip_elements.contains(&child.name)
                        && (self.aggressive || child.is_empty())
                    {
                        continue;
                    }
                    if was_text_bearing && child.children.is_empty() {
                        continue;
                    }
                    kept.push(XmlNode::Element(child));
                }
                XmlNode::Text(text) => match kept.last_mut() {
                    Some(XmlNode::Text(previous)) => previous.push_str(&text),
                    _ => kept.push(XmlNode::Text(text)),
                },
            }
        }

        let has_element_children = kept.iter().any(|node| matches!(node, XmlNode::Element(_)));
        element.children = kept
            .into_iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => {
                    if text.trim().is_empty() {
                        return None;
                    }
                    let collapsed = whitespace_run().replace_all(&text, " ");
                    let normalized = if has_element_children {
                        collapsed.into_owned()
                    } else {
                        collapsed.trim().to_string()
                    };
                    Some(XmlNode::Text(normalized))
                }
                element => Some(element),
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn optimizer(aggressive: bool) -> ContentOptimizer {
        ContentOptimizer::new(&OptimizerConfig {
            aggressive,
            ..Default::default()
        })
    }

    #[test]
    fn test_collapses_and_trims_text() {
        let mut programme = XmlElement::new("programme")
            .with_attribute("channel", "a  b")
            .with_text("\n    ")
            .with_child(XmlElement::new("title").with_text("  The   Big\n\tShow  "))
            .with_text("\n  ");

        optimizer(false).optimize_programme(&mut programme);

        assert_eq!(programme.attribute("channel"), Some("a  b"));
        assert_eq!(programme.children.len(), 1);
        let title = programme.child_elements().next().unwrap();
        assert_eq!(title.text(), "The Big Show");
    }

    #[rstest]
    #[case("Line one\nLine\ttwo", "Line one\nLine\ttwo")]
    #[case("a   b", "a b")]
    #[case("Act 1.\n\nAct 2.", "Act 1. Act 2.")]
    #[case(" \tPadded\n", "Padded")]
    fn test_single_whitespace_characters_are_kept(#[case] input: &str, #[case] expected: &str) {
        let mut programme =
            XmlElement::new("programme").with_child(XmlElement::new("desc").with_text(input));

        optimizer(false).optimize_programme(&mut programme);

        let desc = programme.child_elements().next().unwrap();
        assert_eq!(desc.text(), expected);
    }

    #[test]
    fn test_drops_text_element_emptied_by_collapse() {
        let mut programme = XmlElement::new("programme")
            .with_child(XmlElement::new("title").with_text("Film"))
            .with_child(XmlElement::new("desc").with_text("   \n "));

        optimizer(false).optimize_programme(&mut programme);

        let names: Vec<&str> = programme.child_elements().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["title"]);
    }

    #[test]
    fn test_drops_emptied_text_element_with_attributes() {
        let mut programme = XmlElement::new("programme")
            .with_child(XmlElement::new("desc").with_attribute("lang", "en").with_text("  "));

        optimizer(false).optimize_programme(&mut programme);

        assert!(programme.children.is_empty());
    }

    #[rstest]
    #[case(false, vec!["title", "sub-title", "icon"])]
    #[case(true, vec!["title"])]
    fn test_strips_low_value_elements(#[case] aggressive: bool, #[case] expected: Vec<&str>) {
        let mut programme = XmlElement::new("programme")
            .with_child(XmlElement::new("title").with_text("Film"))
            .with_child(XmlElement::new("sub-title").with_text("Part 1"))
            .with_child(XmlElement::new("credits"))
            .with_child(XmlElement::new("star-rating"))
            .with_child(XmlElement::new("icon").with_attribute("src", "http://x/y.png"))
            .with_child(XmlElement::new("review").with_text("  "));

        optimizer(aggressive).optimize_programme(&mut programme);

        let names: Vec<&str> = programme.child_elements().map(|c| c.name.as_str()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_strip_list_applies_only_to_programmes() {
        let mut channel = XmlElement::new("channel")
            .with_attribute("id", "a")
            .with_child(XmlElement::new("icon").with_attribute("src", "http://x/y.png"));

        optimizer(true).optimize_channel(&mut channel);

        assert_eq!(channel.child_elements().count(), 1);
    }

    #[test]
    fn test_credits_emptied_by_nested_removal_is_stripped() {
        let mut programme = XmlElement::new("programme").with_child(
            XmlElement::new("credits")
                .with_text("\n  ")
                .with_child(XmlElement::new("actor").with_text("   "))
                .with_text("\n"),
        );

        optimizer(false).optimize_programme(&mut programme);

        assert!(programme.children.is_empty());
    }

    #[test]
    fn test_mixed_content_keeps_separating_spaces() {
        let mut programme = XmlElement::new("programme").with_child(
            XmlElement::new("desc")
                .with_text("Starring  ")
                .with_child(XmlElement::new("b").with_text("Someone"))
                .with_text("   and friends"),
        );

        optimizer(false).optimize_programme(&mut programme);

        let desc = programme.child_elements().next().unwrap();
        assert_eq!(
            desc.children,
            vec![
                XmlNode::Text("Starring ".to_string()),
                XmlNode::Element(XmlElement::new("b").with_text("Someone")),
                XmlNode::Text(" and friends".to_string()),
            ]
        );
    }

    #[test]
    fn test_adjacent_text_is_merged_after_removal() {
        let mut programme = XmlElement::new("programme").with_child(
            XmlElement::new("title")
                .with_text("News ")
                .with_child(XmlElement::new("span").with_text(" "))
                .with_text(" Tonight"),
        );

        optimizer(false).optimize_programme(&mut programme);

        let title = programme.child_elements().next().unwrap();
        assert_eq!(title.children, vec![XmlNode::Text("News Tonight".to_string())]);
    }

    fn arb_element(depth: u32) -> BoxedStrategy<XmlElement> {
        let name = prop::sample::select(vec![
            "title", "desc", "sub-title", "credits", "icon", "actor", "category",
        ]);
        let attrs = prop::collection::vec(("[a-z]{1,4}", "[ a-z]{0,5}"), 0..2);
        let text = "[ \t\na-z]{0,8}";

        if depth == 0 {
            return (name, attrs, prop::option::of(text))
                .prop_map(|(name, attrs, text)| {
                    let mut element = XmlElement::new(name);
                    element.attributes = attrs;
                    if let Some(text) = text {
                        element.push_text(&text);
                    }
                    element
                })
                .boxed();
        }

        (
            name,
            attrs,
            prop::collection::vec(
                prop_oneof![
                    "[ \t\na-z]{0,8}".prop_map(XmlNode::Text),
                    arb_element(depth - 1).prop_map(XmlNode::Element),
                ],
                0..4,
            ),
        )
            .prop_map(|(name, attrs, children)| {
                let mut element = XmlElement::new(name);
                element.attributes = attrs;
                element.children = children;
                element
            })
            .boxed()
    }

    proptest! {
        #[test]
        fn prop_optimization_is_idempotent(
            children in prop::collection::vec(arb_element(2), 0..5),
            aggressive in any::<bool>(),
        ) {
            let optimizer = optimizer(aggressive);
            let mut once = XmlElement::new("programme").with_attribute("channel", "x");
            once.children = children.into_iter().map(XmlNode::Element).collect();
            optimizer.optimize_programme(&mut once);

            let mut twice = once.clone();
            optimizer.optimize_programme(&mut twice);

            prop_assert_eq!(once, twice);
        }
    }
}
