//! Streaming XMLTV record parser
//!
//! Reads an uncompressed XMLTV stream with quick-xml and yields one
//! [`XmltvRecord`] per top-level element under the root. Only the record that
//! is currently open is held in memory, and the event buffer is reused, so
//! memory grows with the largest single element rather than the document.
//!
//! Any syntax violation ends the sequence with a `MalformedInput` error; the
//! reader does not try to resynchronize.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::errors::{AppError, AppResult};
use crate::xmltv::records::{XmlElement, XmltvRecord};

/// Lazy, forward-only sequence of XMLTV records
pub struct RecordReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// Depth of the element currently open, the root being 1
    depth: usize,
    root_seen: bool,
    /// Open elements of the record being captured, outermost first
    stack: Vec<XmlElement>,
    /// Name of the top-level sibling being skipped
    skipped: Option<String>,
    elements_parsed: u64,
    finished: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = true;

        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            depth: 0,
            root_seen: false,
            stack: Vec::new(),
            skipped: None,
            elements_parsed: 0,
            finished: false,
        }
    }

    /// Number of elements closed so far, nested elements included
    pub fn elements_parsed(&self) -> u64 {
        self.elements_parsed
    }

    /// Byte offset into the uncompressed stream
    pub fn position(&self) -> u64 {
        self.reader.buffer_position()
    }

    fn read_next(&mut self) -> AppResult<Option<XmltvRecord>> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(AppError::malformed(
                        Some(self.reader.error_position()),
                        e.to_string(),
                    ));
                }
            };
            let decoder = self.reader.decoder();
            let position = self.reader.buffer_position();

            match event {
                Event::Start(start) => {
                    if self.depth == 0 && self.root_seen {
                        return Err(AppError::malformed(
                            Some(self.reader.buffer_position()),
                            "multiple root elements",
                        ));
                    }
                    self.root_seen = true;
                    self.depth += 1;

                    if self.depth == 2 {
                        let element = element_from_start(&start, decoder, position)?;
                        if is_record_name(&element.name) {
                            self.stack.push(element);
                        } else {
                            self.skipped = Some(element.name);
                        }
                    } else if !self.stack.is_empty() {
                        self.stack.push(element_from_start(&start, decoder, position)?);
                    }
                }

                Event::Empty(start) => {
                    self.elements_parsed += 1;
                    match self.depth {
                        0 => {
                            if self.root_seen {
                                return Err(AppError::malformed(
                                    Some(self.reader.buffer_position()),
                                    "multiple root elements",
                                ));
                            }
                            self.root_seen = true;
                        }
                        1 => {
                            let element = element_from_start(&start, decoder, position)?;
                            return Ok(Some(XmltvRecord::from_element(element)));
                        }
                        _ => {
                            if !self.stack.is_empty() {
                                let element = element_from_start(&start, decoder, position)?;
                                if let Some(parent) = self.stack.last_mut() {
                                    parent.children.push(crate::xmltv::XmlNode::Element(element));
                                }
                            }
                        }
                    }
                }

                Event::End(_) => {
                    self.elements_parsed += 1;
                    let closing_depth = self.depth;
                    self.depth = self.depth.saturating_sub(1);

                    if closing_depth == 2 {
                        if let Some(element) = self.stack.pop() {
                            return Ok(Some(XmltvRecord::from_element(element)));
                        }
                        if let Some(name) = self.skipped.take() {
                            return Ok(Some(XmltvRecord::Other(name)));
                        }
                    } else if closing_depth > 2 {
                        if let Some(element) = self.stack.pop() {
                            match self.stack.last_mut() {
                                Some(parent) => {
                                    parent.children.push(crate::xmltv::XmlNode::Element(element))
                                }
                                None => {
                                    return Err(AppError::internal(
                                        "record stack underflow while closing nested element",
                                    ));
                                }
                            }
                        }
                    }
                }

                Event::Text(text) => {
                    let decoded = text.decode().map_err(|e| {
                        AppError::malformed(Some(self.reader.buffer_position()), e.to_string())
                    })?;
                    if let Some(current) = self.stack.last_mut() {
                        current.push_text(&decoded);
                    } else if self.depth == 0 && !decoded.trim().is_empty() {
                        return Err(AppError::malformed(
                            Some(self.reader.buffer_position()),
                            "text outside the root element",
                        ));
                    }
                }

                Event::CData(cdata) => {
                    if let Some(current) = self.stack.last_mut() {
                        let decoded = cdata.decode().map_err(|e| {
                            AppError::malformed(Some(self.reader.buffer_position()), e.to_string())
                        })?;
                        current.push_text(&decoded);
                    }
                }

                Event::GeneralRef(reference) => {
                    if self.depth == 0 {
                        return Err(AppError::malformed(
                            Some(self.reader.buffer_position()),
                            "entity reference outside the root element",
                        ));
                    }
                    if let Some(current) = self.stack.last_mut() {
                        let resolved = match reference
                            .resolve_char_ref()
                            .map_err(|e| AppError::malformed(Some(position), e.to_string()))?
                        {
                            Some(ch) => ch.to_string(),
                            None => {
                                let name = reference
                                    .decode()
                                    .map_err(|e| AppError::malformed(Some(position), e.to_string()))?;
                                resolve_predefined_entity(&name)
                                    .ok_or_else(|| {
                                        AppError::malformed(
                                            Some(position),
                                            format!("unknown entity reference &{name};"),
                                        )
                                    })?
                                    .to_string()
                            }
                        };
                        current.push_text(&resolved);
                    }
                }

                Event::Eof => {
                    if self.depth > 0 {
                        return Err(AppError::malformed(
                            Some(self.reader.buffer_position()),
                            format!(
                                "unexpected end of document with {} element(s) still open",
                                self.depth
                            ),
                        ));
                    }
                    if !self.root_seen {
                        return Err(AppError::malformed(
                            Some(self.reader.buffer_position()),
                            "document has no root element",
                        ));
                    }
                    return Ok(None);
                }

                // Declarations, comments, processing instructions, doctype
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = AppResult<XmltvRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

fn is_record_name(name: &str) -> bool {
    matches!(name, "channel" | "programme")
}

/// Names and attribute values are decoded with the document's declared
/// encoding
fn element_from_start(
    start: &BytesStart<'_>,
    decoder: Decoder,
    position: u64,
) -> AppResult<XmlElement> {
    let name = decoder
        .decode(start.name().as_ref())
        .map_err(|e| AppError::malformed(Some(position), format!("Undecodable element name: {e}")))?
        .into_owned();

    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AppError::malformed(Some(position), e.to_string()))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|e| {
                AppError::malformed(Some(position), format!("Undecodable attribute name: {e}"))
            })?
            .into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| AppError::malformed(Some(position), e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}
