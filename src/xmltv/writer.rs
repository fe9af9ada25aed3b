//! Incremental gzip XMLTV writer
//!
//! Serializes records as they arrive into a single `<tv>` document. Each
//! record is rendered into a reused scratch buffer and handed to the gzip
//! encoder, so nothing beyond the current record is retained.

use std::fmt::Write as _;
use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use quick_xml::escape::{escape, partial_escape};

use crate::xmltv::records::{ChannelRecord, ProgrammeRecord, XmlElement, XmlNode};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

pub struct XmltvWriter<W: Write> {
    encoder: GzEncoder<W>,
    scratch: String,
    records_written: u64,
    bytes_written: u64,
}

impl<W: Write> XmltvWriter<W> {
    /// Start a document: writes the declaration and the opening root tag
    pub fn new(sink: W, compression_level: u32, generator_name: Option<&str>) -> io::Result<Self> {
        let mut writer = Self {
            encoder: GzEncoder::new(sink, Compression::new(compression_level.min(9))),
            scratch: String::with_capacity(4 * 1024),
            records_written: 0,
            bytes_written: 0,
        };

        let mut header = String::from(XML_DECLARATION);
        match generator_name {
            Some(name) => {
                let _ = writeln!(header, "<tv generator-info-name=\"{}\">", escape(name));
            }
            None => header.push_str("<tv>\n"),
        }
        writer.write_raw(header.as_bytes())?;

        Ok(writer)
    }

    pub fn write_channel(&mut self, channel: &ChannelRecord) -> io::Result<()> {
        self.write_element(&channel.element)
    }

    pub fn write_programme(&mut self, programme: &ProgrammeRecord) -> io::Result<()> {
        self.write_element(&programme.element)
    }

    /// Serialize one top-level element under the root
    pub fn write_element(&mut self, element: &XmlElement) -> io::Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.push_str("  ");
        render_element(element, &mut scratch);
        scratch.push('\n');

        let result = self.write_raw(scratch.as_bytes());
        self.scratch = scratch;
        result?;

        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Uncompressed bytes handed to the encoder so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Close the root element, flush the gzip trailer and return the sink
    pub fn finish(mut self) -> io::Result<W> {
        self.write_raw(b"</tv>\n")?;
        self.encoder.finish()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.encoder.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

fn render_element(element: &XmlElement, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &element.children {
        match child {
            XmlNode::Element(child) => render_element(child, out),
            XmlNode::Text(text) => out.push_str(&partial_escape(text.as_str())),
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltv::parser::RecordReader;
    use crate::xmltv::records::XmltvRecord;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_empty_document() {
        let writer = XmltvWriter::new(Vec::new(), 6, None).unwrap();
        let output = gunzip(&writer.finish().unwrap());
        assert_eq!(output, "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<tv>\n</tv>\n");
    }

    #[test]
    fn test_generator_name_is_escaped() {
        let writer = XmltvWriter::new(Vec::new(), 1, Some("a \"quoted\" & tool")).unwrap();
        let output = gunzip(&writer.finish().unwrap());
        assert!(output.contains("<tv generator-info-name=\"a &quot;quoted&quot; &amp; tool\">"));
    }

    #[test]
    fn test_escapes_text_and_attributes() {
        let element = XmlElement::new("programme")
            .with_attribute("channel", "A&B")
            .with_child(XmlElement::new("title").with_text("Tom & Jerry <Live>"))
            .with_child(XmlElement::new("icon").with_attribute("src", "http://x/?a=1&b=2"));

        let mut writer = XmltvWriter::new(Vec::new(), 6, None).unwrap();
        writer.write_element(&element).unwrap();
        assert_eq!(writer.records_written(), 1);
        let output = gunzip(&writer.finish().unwrap());

        assert!(output.contains(
            "<programme channel=\"A&amp;B\"><title>Tom &amp; Jerry &lt;Live&gt;</title><icon src=\"http://x/?a=1&amp;b=2\"/></programme>"
        ));
    }

    #[test]
    fn test_output_parses_back_to_same_records() {
        let input = r#"<tv>
  <channel id="BBC1.uk"><display-name>BBC One</display-name></channel>
  <programme channel="BBC1.uk" start="20240101060000 +0000"><title>News &amp; Weather</title></programme>
</tv>"#;
        let records: Vec<XmltvRecord> = RecordReader::new(input.as_bytes())
            .map(Result::unwrap)
            .collect();

        let mut writer = XmltvWriter::new(Vec::new(), 6, Some("epg-filter")).unwrap();
        for record in &records {
            match record {
                XmltvRecord::Channel(c) => writer.write_channel(c).unwrap(),
                XmltvRecord::Programme(p) => writer.write_programme(p).unwrap(),
                XmltvRecord::Other(_) => {}
            }
        }
        let output = gunzip(&writer.finish().unwrap());

        let reparsed: Vec<XmltvRecord> = RecordReader::new(output.as_bytes())
            .map(Result::unwrap)
            .collect();
        assert_eq!(reparsed, records);
    }
}
