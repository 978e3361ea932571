//! Streaming record extraction.
//!
//! [`RecordReader`] tokenizes a byte stream with `quick-xml` and yields each
//! element named `record_tag` once its closing tag is read, with its complete
//! subtree. Outside a record only the element depth is tracked, so peak memory
//! is one in-progress record regardless of document size.
//!
//! Every occurrence of `record_tag` is a record, including one nested inside
//! another record. A nested record is yielded at its own close tag, before its
//! enclosing record, and is left in the enclosing subtree as an empty element
//! of the same name.
//!
//! Records are numbered by ordinal in the order their start tags appear. With
//! an [`Assignment`] attached, records owned by other workers are tokenized
//! past without being built.
//!
//! Extraction is a single forward pass. After the first error the reader is
//! exhausted; records yielded before it stay valid.

use crate::element::{Element, trimmed};
use crate::error::ParseError;
use crate::partition::Assignment;
use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesRef, BytesStart, Event};
use std::io::BufRead;

/// Lazy, single-pass iterator over the record subtrees of a document.
pub struct RecordReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    record_tag: String,
    assignment: Option<Assignment>,
    /// Open elements in the whole document.
    depth: usize,
    /// Open elements from the outermost open record down, innermost last.
    stack: Vec<Frame>,
    next_ordinal: u64,
    skipped: u64,
    done: bool,
}

/// An open element inside a record.
struct Frame {
    is_record: bool,
    /// `None` when nothing this reader yields needs the element's content.
    pending: Option<PendingElement>,
}

/// An element whose closing tag has not been read yet.
struct PendingElement {
    element: Element,
    text: String,
}

impl<R: BufRead> RecordReader<R> {
    /// Read every `record_tag` element from `input`.
    pub fn new(input: R, record_tag: impl Into<String>) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(8 * 1024),
            record_tag: record_tag.into(),
            assignment: None,
            depth: 0,
            stack: Vec::new(),
            next_ordinal: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Only build records owned by `assignment`; others are skipped.
    #[must_use]
    pub fn with_assignment(mut self, assignment: Assignment) -> Self {
        self.assignment = Some(assignment);
        self
    }

    /// Number of record start tags seen so far, built or skipped.
    pub fn records_seen(&self) -> u64 {
        self.next_ordinal
    }

    /// Number of records tokenized past because another worker owns them.
    pub fn records_skipped(&self) -> u64 {
        self.skipped
    }

    /// Byte offset in the input reached so far.
    pub fn byte_offset(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Pull the next record, or `None` at the end of the document.
    ///
    /// # Errors
    /// Returns a [`ParseError`] for malformed XML and an I/O error if reading
    /// the stream fails. Both end the sequence.
    pub fn next_record(&mut self) -> Result<Option<Element>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = std::mem::take(&mut self.buf);
        let out = self.pump(&mut buf);
        buf.clear();
        self.buf = buf;
        if !matches!(out, Ok(Some(_))) {
            self.done = true;
            self.stack.clear();
        }
        out
    }

    fn pump(&mut self, buf: &mut Vec<u8>) -> Result<Option<Element>> {
        loop {
            buf.clear();
            let event = match self.reader.read_event_into(buf) {
                Ok(ev) => ev,
                Err(quick_xml::Error::Io(err)) => {
                    return Err(std::io::Error::new(err.kind(), err.to_string()).into());
                }
                Err(err) => {
                    return Err(ParseError::new(self.reader.error_position() as u64, err.to_string()).into());
                }
            };

            match event {
                Event::Start(e) => {
                    self.depth += 1;
                    if self.is_record_tag(&e) {
                        let pending = self.claim(&e)?;
                        self.stack.push(Frame {
                            is_record: true,
                            pending,
                        });
                    } else if !self.stack.is_empty() {
                        let pending = if self.building() {
                            Some(PendingElement {
                                element: self.open(&e)?,
                                text: String::new(),
                            })
                        } else {
                            None
                        };
                        self.stack.push(Frame {
                            is_record: false,
                            pending,
                        });
                    }
                }
                Event::Empty(e) => {
                    if self.is_record_tag(&e) {
                        let pending = self.claim(&e)?;
                        self.leave_placeholder();
                        if let Some(p) = pending {
                            return Ok(Some(finish(p)));
                        }
                    } else if self.building() {
                        let element = self.open(&e)?;
                        self.attach(element);
                    }
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    let Some(frame) = self.stack.pop() else {
                        continue;
                    };
                    if frame.is_record {
                        self.leave_placeholder();
                        if let Some(p) = frame.pending {
                            return Ok(Some(finish(p)));
                        }
                    } else if let Some(p) = frame.pending {
                        self.attach(finish(p));
                    }
                }
                Event::Text(t) => {
                    if !self.collecting_text() {
                        continue;
                    }
                    let s = std::str::from_utf8(&t).map_err(|err| self.invalid(err))?;
                    self.push_text(s);
                }
                Event::CData(t) => {
                    if !self.collecting_text() {
                        continue;
                    }
                    let s = std::str::from_utf8(&t).map_err(|err| self.invalid(err))?;
                    self.push_text(s);
                }
                Event::GeneralRef(r) => {
                    if self.collecting_text() {
                        let resolved = self.resolve_ref(&r)?;
                        self.push_text(&resolved);
                    }
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(ParseError::new(
                            self.byte_offset(),
                            format!("unexpected end of document with {} unclosed element(s)", self.depth),
                        )
                        .into());
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn is_record_tag(&self, e: &BytesStart<'_>) -> bool {
        e.name().as_ref() == self.record_tag.as_bytes()
    }

    /// Assign the next ordinal to a record start tag and open it if this
    /// reader owns it.
    fn claim(&mut self, e: &BytesStart<'_>) -> Result<Option<PendingElement>> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        if let Some(a) = self.assignment
            && !a.owns(ordinal)
        {
            self.skipped += 1;
            return Ok(None);
        }
        Ok(Some(PendingElement {
            element: self.open(e)?,
            text: String::new(),
        }))
    }

    /// Whether the innermost open element is being built.
    fn building(&self) -> bool {
        self.stack.last().is_some_and(|f| f.pending.is_some())
    }

    /// Mark where a just-closed record sat inside an enclosing built element.
    fn leave_placeholder(&mut self) {
        if self.building() {
            let placeholder = Element::new(self.record_tag.clone());
            self.attach(placeholder);
        }
    }

    fn open(&self, e: &BytesStart<'_>) -> Result<Element> {
        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| self.invalid(err))?
            .to_string();
        let mut element = Element::new(name);
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ParseError::new(self.byte_offset(), err.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| self.invalid(err))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| ParseError::new(self.byte_offset(), err.to_string()))?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attach(&mut self, child: Element) {
        if let Some(parent) = self.stack.last_mut().and_then(|f| f.pending.as_mut()) {
            parent.element.children.push(child);
        }
    }

    /// Text is kept only until the element's first child appears.
    fn collecting_text(&self) -> bool {
        self.stack
            .last()
            .and_then(|f| f.pending.as_ref())
            .is_some_and(|top| top.element.children.is_empty())
    }

    fn push_text(&mut self, s: &str) {
        if let Some(top) = self.stack.last_mut().and_then(|f| f.pending.as_mut())
            && top.element.children.is_empty()
        {
            top.text.push_str(s);
        }
    }

    fn resolve_ref(&self, r: &BytesRef<'_>) -> Result<String> {
        let name = std::str::from_utf8(r).map_err(|err| self.invalid(err))?;
        resolve_entity(name)
            .map(String::from)
            .ok_or_else(|| ParseError::new(self.byte_offset(), format!("unknown entity &{name};")).into())
    }

    fn invalid(&self, err: std::str::Utf8Error) -> anyhow::Error {
        ParseError::new(self.byte_offset(), format!("invalid UTF-8: {err}")).into()
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn finish(pending: PendingElement) -> Element {
    let PendingElement { mut element, text } = pending;
    element.text = trimmed(&text);
    element
}

/// Resolve a predefined entity name or character reference (`#38`, `#x26`).
fn resolve_entity(name: &str) -> Option<std::borrow::Cow<'static, str>> {
    use std::borrow::Cow;
    let predefined = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            return char::from_u32(value).map(|c| Cow::Owned(c.to_string()));
        }
    };
    Some(Cow::Borrowed(predefined))
}

#[cfg(test)]
mod tests {
    use super::resolve_entity;

    #[test]
    fn resolves_predefined_and_numeric_references() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("quot").as_deref(), Some("\""));
        assert_eq!(resolve_entity("#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#x263A").as_deref(), Some("\u{263A}"));
        assert_eq!(resolve_entity("nbsp"), None);
        assert_eq!(resolve_entity("#xD800"), None);
    }
}
