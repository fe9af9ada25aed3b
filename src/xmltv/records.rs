//! Typed XMLTV records and the owned element tree they carry
//!
//! Records keep their full element so accepted channels and programmes can be
//! written back verbatim; only the fields needed for routing are extracted.

use std::fmt;

/// An owned XML element fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.push_text(text.as_ref());
        self
    }

    /// Value of the first attribute named `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Append text, merging with a trailing text node
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(XmlNode::Text(existing)) => existing.push_str(text),
            _ => self.children.push(XmlNode::Text(text.to_string())),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// No attributes and no children
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }

    /// Has content, and all of it is text
    pub fn is_text_bearing(&self) -> bool {
        !self.children.is_empty()
            && self
                .children
                .iter()
                .all(|node| matches!(node, XmlNode::Text(_)))
    }
}

/// Normalized identity used for channel comparisons. Never applied to
/// stored or written values.
pub fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

/// A `<channel>` element with its identity fields extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    /// Identity token in its original casing
    pub id: String,
    pub display_names: Vec<String>,
    pub logo_url: Option<String>,
    pub element: XmlElement,
}

impl ChannelRecord {
    pub fn from_element(element: XmlElement) -> Self {
        let id = element.attribute("id").unwrap_or_default().to_string();

        let display_names = element
            .child_elements()
            .filter(|child| child.name == "display-name")
            .map(|child| child.text().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        let logo_url = element
            .child_elements()
            .find(|child| child.name == "icon")
            .and_then(|icon| icon.attribute("src"))
            .map(str::to_string);

        Self {
            id,
            display_names,
            logo_url,
            element,
        }
    }

    pub fn normalized_id(&self) -> String {
        normalize_id(&self.id)
    }
}

/// A `<programme>` element, meaningful only through its channel reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammeRecord {
    /// The `channel` attribute, as written in the feed
    pub channel_ref: String,
    pub element: XmlElement,
}

impl ProgrammeRecord {
    pub fn from_element(element: XmlElement) -> Self {
        let channel_ref = element.attribute("channel").unwrap_or_default().to_string();
        Self {
            channel_ref,
            element,
        }
    }
}

/// Kind of a top-level element under the document root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Channel,
    Programme,
    Other,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Channel => write!(f, "channel"),
            RecordKind::Programme => write!(f, "programme"),
            RecordKind::Other => write!(f, "other"),
        }
    }
}

/// One item of the parser's output sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmltvRecord {
    Channel(ChannelRecord),
    Programme(ProgrammeRecord),
    /// A skipped sibling; only its tag name is kept
    Other(String),
}

impl XmltvRecord {
    pub(crate) fn from_element(element: XmlElement) -> Self {
        match element.name.as_str() {
            "channel" => Self::Channel(ChannelRecord::from_element(element)),
            "programme" => Self::Programme(ProgrammeRecord::from_element(element)),
            _ => Self::Other(element.name),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Channel(_) => RecordKind::Channel,
            Self::Programme(_) => RecordKind::Programme,
            Self::Other(_) => RecordKind::Other,
        }
    }
}
