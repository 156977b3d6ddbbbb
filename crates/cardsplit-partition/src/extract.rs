//! Streaming record extraction using quick-xml
//!
//! Pulls events from a `BufRead` one at a time and yields each record element
//! (by default `<businesscard>`) as soon as its end tag is seen. Only the
//! current record is ever held in memory.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;

/// One record element, re-serialized from its parse events.
///
/// Text, attributes, entity references and whitespace between tags come out
/// byte for byte. Markup is rebuilt by quick-xml, so whitespace inside an end
/// tag (`</businesscard >`) is dropped.
#[derive(Debug, Clone)]
pub struct Record {
    /// 1-based position in the document
    pub seq: u64,
    /// Serialized element, start tag to end tag (see above for what is normalized)
    pub raw: Vec<u8>,
    /// `countrycode` attribute of the first `entity` (or of the record itself)
    pub country: Option<String>,
    /// Text of the first `regdate` element
    pub regdate: Option<String>,
    /// Byte offset just past the record's end tag
    pub end_offset: u64,
}

/// Start tag of the document's root element, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTag {
    /// Full start tag including `<` and `>`
    pub raw: Vec<u8>,
    /// Qualified element name (for the matching end tag)
    pub name: Vec<u8>,
}

impl RootTag {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let mut raw = Vec::with_capacity(e.len() + 2);
        raw.push(b'<');
        raw.extend_from_slice(e);
        raw.push(b'>');
        Self {
            raw,
            name: e.name().as_ref().to_vec(),
        }
    }
}

/// Lazy sequence of [`Record`]s over an XML byte stream.
///
/// Yields `Err` once on malformed framing (unterminated tag, mismatched end
/// tag, EOF inside a record or before the root closes) and `None` afterwards.
pub struct RecordExtractor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    record_tag: Vec<u8>,
    root: Option<RootTag>,
    /// Element depth outside of records
    depth: usize,
    root_closed: bool,
    cursor: Cursor,
}

/// Progress through the document, kept apart from the event buffer so it can
/// be updated while an event still borrows that buffer.
#[derive(Debug, Default)]
struct Cursor {
    seq: u64,
    done: bool,
}

impl Cursor {
    fn fail(&mut self, offset: u64, message: impl Into<String>) -> ParseError {
        self.done = true;
        ParseError {
            offset,
            records: self.seq,
            message: message.into(),
        }
    }
}

enum Step {
    Record(BytesStart<'static>, bool),
    Root(RootTag),
    Open,
    Close,
    Eof,
    Skip,
    Fail(String),
}

impl<R: BufRead> RecordExtractor<R> {
    pub fn new(reader: R, record_tag: &str) -> Self {
        let mut reader = Reader::from_reader(reader);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = true;

        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            record_tag: record_tag.as_bytes().to_vec(),
            root: None,
            depth: 0,
            root_closed: false,
            cursor: Cursor::default(),
        }
    }

    /// Root start tag, once it has been read
    pub fn root(&self) -> Option<&RootTag> {
        self.root.as_ref()
    }

    /// Records yielded so far
    pub fn records(&self) -> u64 {
        self.cursor.seq
    }

    /// Bytes consumed from the underlying reader
    pub fn byte_offset(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Capacity of the reusable event buffer (bounded by the largest event)
    pub fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn error(&mut self, message: impl Into<String>) -> ParseError {
        let offset = self.byte_offset();
        self.cursor.fail(offset, message)
    }

    /// Read events until the record opened by `start` closes.
    fn read_record(&mut self, start: BytesStart<'static>, empty: bool) -> Result<Record, ParseError> {
        let mut country = attribute(&start, b"countrycode");
        let mut regdate: Option<String> = None;
        let mut out = Writer::new(Vec::with_capacity(1024));

        if empty {
            out.write_event(Event::Empty(start))
                .map_err(|e| self.error(e.to_string()))?;
        } else {
            out.write_event(Event::Start(start))
                .map_err(|e| self.error(e.to_string()))?;

            let mut depth = 1usize;
            // Depth of the open <regdate>, while inside it
            let mut regdate_depth: Option<usize> = None;
            let mut regdate_seen = false;

            loop {
                let event = match self.reader.read_event_into(&mut self.buf) {
                    Ok(Event::Eof) => {
                        let offset = self.reader.buffer_position() as u64;
                        return Err(self.cursor.fail(offset, "unexpected end of file inside record"));
                    }
                    Ok(event) => event,
                    Err(e) => {
                        let offset = self.reader.buffer_position() as u64;
                        return Err(self.cursor.fail(offset, e.to_string()));
                    }
                };

                match &event {
                    Event::Start(e) => {
                        depth += 1;
                        let local = e.local_name();
                        if local.as_ref() == b"entity" && country.is_none() {
                            country = attribute(e, b"countrycode");
                        } else if local.as_ref() == b"regdate" && !regdate_seen {
                            regdate_seen = true;
                            regdate_depth = Some(depth);
                            regdate = Some(String::new());
                        }
                    }
                    Event::Empty(e) => {
                        if e.local_name().as_ref() == b"entity" && country.is_none() {
                            country = attribute(e, b"countrycode");
                        }
                    }
                    Event::Text(t) if regdate_depth.is_some() => {
                        if let Some(text) = regdate.as_mut() {
                            match t.unescape() {
                                Ok(s) => text.push_str(&s),
                                Err(_) => text.push_str(&String::from_utf8_lossy(t)),
                            }
                        }
                    }
                    Event::CData(t) if regdate_depth.is_some() => {
                        if let Some(text) = regdate.as_mut() {
                            text.push_str(&String::from_utf8_lossy(t));
                        }
                    }
                    Event::End(_) => {
                        if regdate_depth == Some(depth) {
                            regdate_depth = None;
                        }
                        depth -= 1;
                    }
                    _ => {}
                }

                let write = out.write_event(event);
                self.buf.clear();
                write.map_err(|e| self.error(e.to_string()))?;

                if depth == 0 {
                    break;
                }
            }
        }

        self.cursor.seq += 1;
        Ok(Record {
            seq: self.cursor.seq,
            raw: out.into_inner(),
            country,
            regdate,
            end_offset: self.byte_offset(),
        })
    }
}

impl<R: BufRead> Iterator for RecordExtractor<R> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.done {
            return None;
        }

        loop {
            let tag = self.record_tag.as_slice();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if is_tag(&e, tag) => Step::Record(e.into_owned(), false),
                Ok(Event::Empty(e)) if is_tag(&e, tag) => Step::Record(e.into_owned(), true),
                Ok(Event::Start(e)) if self.depth == 0 && self.root.is_none() => {
                    Step::Root(RootTag::from_start(&e))
                }
                Ok(Event::Start(_)) => Step::Open,
                Ok(Event::End(_)) => Step::Close,
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => Step::Fail(e.to_string()),
            };
            self.buf.clear();

            match step {
                Step::Record(start, empty) => return Some(self.read_record(start, empty)),
                Step::Root(root) => {
                    log::debug!("Root element: {}", String::from_utf8_lossy(&root.raw));
                    self.root = Some(root);
                    self.depth = 1;
                }
                Step::Open => self.depth += 1,
                Step::Close => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.root_closed = true;
                    }
                }
                Step::Eof => {
                    if self.root.is_some() && !self.root_closed {
                        return Some(Err(self.error("unexpected end of file before root element closed")));
                    }
                    self.cursor.done = true;
                    return None;
                }
                Step::Fail(message) => return Some(Err(self.error(message))),
                Step::Skip => {}
            }
        }
    }
}

fn is_tag(e: &BytesStart<'_>, local_name: &[u8]) -> bool {
    e.local_name().as_ref() == local_name
}

/// Unescaped value of the attribute whose local name is `key`
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .map(|attr| match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
}
