//! The serializer: events back to bytes.
//!
//! [`Serializer`] is a stream transform producing one byte chunk per
//! rendered event; [`Rechunk`] regroups those chunks to a caller block
//! size for I/O shaping. [`to_string`]/[`to_bytes`] are the whole-document
//! conveniences. Canonical output lives in the [`c14n`] submodule.

mod c14n;

pub use self::c14n::{canonicalize, Canonicalization};

use std::borrow::Cow;
use std::collections::VecDeque;

use crate::events::{Attribute, Event};

/// The `standalone` pseudo-attribute of a generated XML declaration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Standalone {
    Yes,
    No,
    Omit,
}

/// Serializer configuration, built with chained setters.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    pub(crate) pretty: bool,
    pub(crate) indent: String,
    pub(crate) xml_declaration: bool,
    pub(crate) standalone: Standalone,
    pub(crate) normalize_empty: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        WriterConfig {
            pretty: false,
            indent: "  ".to_string(),
            xml_declaration: false,
            standalone: Standalone::Omit,
            normalize_empty: true,
        }
    }

    /// Indent nested markup. Mixed content is left alone: an element that
    /// contains text gets no indentation inserted into it.
    ///
    /// (`false` by default)
    pub fn pretty(mut self, val: bool) -> Self {
        self.pretty = val;
        self
    }

    /// The indent unit used per nesting level when pretty printing.
    ///
    /// (two spaces by default)
    pub fn indent(mut self, val: impl Into<String>) -> Self {
        self.indent = val.into();
        self
    }

    /// Write an XML declaration at the start of the document, replacing
    /// whatever `Prolog` event the stream carries.
    ///
    /// (`false` by default)
    pub fn xml_declaration(mut self, val: bool) -> Self {
        self.xml_declaration = val;
        self
    }

    /// The `standalone` value of a generated declaration.
    ///
    /// ([`Standalone::Omit`] by default)
    pub fn standalone(mut self, val: Standalone) -> Self {
        self.standalone = val;
        self
    }

    /// Collapse childless elements to `<name/>`.
    ///
    /// (`true` by default)
    pub fn normalize_empty(mut self, val: bool) -> Self {
        self.normalize_empty = val;
        self
    }
}

/// Escape `&`, `<` and `>` in character data.
pub(crate) fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| matches!(b, b'&' | b'<' | b'>')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape `&`, `<`, `>` and both quote characters in attribute values.
pub(crate) fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| matches!(b, b'&' | b'<' | b'>' | b'"' | b'\'')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum IndentFlags {
    WroteNothing,
    WroteMarkup,
    WroteText,
}

/// Stream transform mapping each event to its byte rendering.
///
/// Yields one `Vec<u8>` per event that produces output; `Error` and
/// `NamespaceContext` events produce none. Wrap in [`Rechunk`] to shape
/// the chunks for a sink.
pub struct Serializer<I> {
    inner: I,
    config: WriterConfig,
    indent_stack: Vec<IndentFlags>,
    depth: usize,
    /// A start tag held back, `>` unwritten, until the next event decides
    /// between `<n>` and `<n/>`.
    pending_start: Option<(String, String)>,
    declared: bool,
    done: bool,
}

impl<I: Iterator<Item = Event>> Serializer<I> {
    pub fn new(inner: I, config: WriterConfig) -> Self {
        Serializer {
            inner,
            config,
            indent_stack: vec![IndentFlags::WroteNothing],
            depth: 0,
            pending_start: None,
            declared: false,
            done: false,
        }
    }

    /// Shape the output into blocks of `block_size` bytes.
    pub fn rechunk(self, block_size: usize) -> Rechunk<Self> {
        Rechunk::new(self, block_size)
    }

    fn wrote_text(&self) -> bool {
        self.indent_stack.last() == Some(&IndentFlags::WroteText)
    }

    fn wrote_markup(&self) -> bool {
        self.indent_stack.last() == Some(&IndentFlags::WroteMarkup)
    }

    fn set_wrote_text(&mut self) {
        if let Some(top) = self.indent_stack.last_mut() {
            *top = IndentFlags::WroteText;
        }
    }

    /// Mark the current frame as containing markup. A frame that already
    /// contains text keeps its flag, so mixed content is never reindented.
    fn set_wrote_markup(&mut self) {
        if let Some(top) = self.indent_stack.last_mut() {
            if *top != IndentFlags::WroteText {
                *top = IndentFlags::WroteMarkup;
            }
        }
    }

    fn write_newline(&self, out: &mut String, level: usize) {
        out.push('\n');
        for _ in 0..level {
            out.push_str(&self.config.indent);
        }
    }

    fn before_markup(&mut self, out: &mut String) {
        if self.config.pretty
            && !self.wrote_text()
            && (self.depth > 0 || self.wrote_markup())
        {
            self.write_newline(out, self.depth);
        }
        self.set_wrote_markup();
    }

    fn flush_pending(&mut self, out: &mut String) {
        if let Some((_, rendered)) = self.pending_start.take() {
            out.push_str(&rendered);
            out.push('>');
        }
    }

    fn render(&mut self, ev: Event, out: &mut String) {
        match &ev {
            Event::EndElement { name, .. }
                if self
                    .pending_start
                    .as_ref()
                    .map_or(false, |(n, _)| n == name.raw()) =>
            {
                if let Some((_, rendered)) = self.pending_start.take() {
                    out.push_str(&rendered);
                    out.push_str("/>");
                }
                if self.depth > 0 {
                    self.depth -= 1;
                    self.indent_stack.pop();
                }
                self.set_wrote_markup();
                return;
            }
            _ => self.flush_pending(out),
        }

        match ev {
            Event::StartDocument => {
                if self.config.xml_declaration {
                    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"");
                    match self.config.standalone {
                        Standalone::Yes => out.push_str(" standalone=\"yes\""),
                        Standalone::No => out.push_str(" standalone=\"no\""),
                        Standalone::Omit => {}
                    }
                    out.push_str("?>");
                    self.declared = true;
                    self.set_wrote_markup();
                }
            }
            Event::EndDocument => {
                self.done = true;
            }
            Event::Prolog { target, attributes, .. } => {
                if !self.declared {
                    out.push('<');
                    out.push('?');
                    out.push_str(&target);
                    render_attributes(out, &attributes);
                    out.push_str("?>");
                    self.declared = true;
                    self.set_wrote_markup();
                }
            }
            Event::DocType { text, .. } => {
                self.before_markup(out);
                out.push_str("<!DOCTYPE ");
                out.push_str(&text);
                out.push('>');
            }
            Event::StartElement { name, attributes, .. } => {
                self.before_markup(out);
                let mut rendered = String::new();
                rendered.push('<');
                rendered.push_str(name.raw());
                render_attributes(&mut rendered, &attributes);
                self.indent_stack.push(IndentFlags::WroteNothing);
                self.depth += 1;
                if self.config.normalize_empty {
                    self.pending_start = Some((name.raw().to_string(), rendered));
                } else {
                    out.push_str(&rendered);
                    out.push('>');
                }
            }
            Event::EndElement { name, .. } => {
                if self.config.pretty
                    && self.depth > 0
                    && self.wrote_markup()
                    && !self.wrote_text()
                {
                    self.write_newline(out, self.depth - 1);
                }
                if self.depth > 0 {
                    self.depth -= 1;
                    self.indent_stack.pop();
                }
                out.push_str("</");
                out.push_str(name.raw());
                out.push('>');
                self.set_wrote_markup();
            }
            Event::Characters { text, .. } => {
                out.push_str(&escape_text(&text));
                self.set_wrote_text();
            }
            Event::Space { text, .. } => {
                // Inter-element whitespace is only replayed verbatim when
                // the output is not being reformatted.
                if !self.config.pretty {
                    out.push_str(&text);
                }
            }
            Event::CData { text, .. } => {
                out.push_str("<![CDATA[");
                // A `]]>` inside the data closes and reopens the section.
                out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
                out.push_str("]]>");
                self.set_wrote_text();
            }
            Event::Comment { text, .. } => {
                self.before_markup(out);
                out.push_str("<!--");
                out.push_str(&text);
                out.push_str("-->");
            }
            Event::ProcessingInstruction { target, data, .. } => {
                self.before_markup(out);
                out.push_str("<?");
                out.push_str(&target);
                if let Some(data) = data {
                    out.push(' ');
                    out.push_str(&data);
                }
                out.push_str("?>");
            }
            Event::NamespaceContext { .. } | Event::Error { .. } => {}
        }
    }
}

fn render_attributes(out: &mut String, attributes: &[Attribute]) {
    for attr in attributes {
        out.push(' ');
        out.push_str(attr.name.raw());
        out.push_str("=\"");
        out.push_str(&escape_attr(&attr.value));
        out.push('"');
    }
}

impl<I: Iterator<Item = Event>> Iterator for Serializer<I> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.done {
                return None;
            }
            let ev = match self.inner.next() {
                Some(ev) => ev,
                None => {
                    self.done = true;
                    let mut out = String::new();
                    self.flush_pending(&mut out);
                    if out.is_empty() {
                        return None;
                    }
                    return Some(out.into_bytes());
                }
            };
            let mut out = String::new();
            self.render(ev, &mut out);
            if !out.is_empty() {
                return Some(out.into_bytes());
            }
        }
    }
}

/// Regroups byte chunks to a fixed block size for use with block-oriented
/// sinks. The final block may be short.
pub struct Rechunk<I> {
    inner: I,
    block_size: usize,
    buffer: VecDeque<u8>,
    exhausted: bool,
}

impl<I: Iterator<Item = Vec<u8>>> Rechunk<I> {
    pub fn new(inner: I, block_size: usize) -> Self {
        Rechunk {
            inner,
            block_size: block_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<I: Iterator<Item = Vec<u8>>> Iterator for Rechunk<I> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while self.buffer.len() < self.block_size && !self.exhausted {
            match self.inner.next() {
                Some(chunk) => self.buffer.extend(chunk),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let take = self.block_size.min(self.buffer.len());
        Some(self.buffer.drain(..take).collect())
    }
}

/// Serialize a whole event sequence to bytes.
pub fn to_bytes<I: Iterator<Item = Event>>(events: I, config: WriterConfig) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in Serializer::new(events, config) {
        out.extend(chunk);
    }
    out
}

/// Serialize a whole event sequence to a string.
pub fn to_string<I: Iterator<Item = Event>>(events: I, config: WriterConfig) -> String {
    // Chunks are rendered from `String`s, so the bytes are valid UTF-8.
    String::from_utf8(to_bytes(events, config)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{EventStream, ParserConfig};
    use pretty_assertions::assert_eq;

    fn roundtrip(doc: &str, config: WriterConfig) -> String {
        to_string(EventStream::from_str(doc, &ParserConfig::new()), config)
    }

    #[test]
    fn plain_roundtrip() {
        let doc = r#"<r a="1"><c>x &amp; y</c><!--n--><![CDATA[raw]]></r>"#;
        let config = ParserConfig::new();
        let resolved = crate::entity::EntityResolver::new(
            EventStream::from_str(doc, &config),
            &config,
        );
        assert_eq!(to_string(resolved, WriterConfig::new()), doc);
    }

    #[test]
    fn empty_elements_collapse() {
        assert_eq!(roundtrip("<r><c></c></r>", WriterConfig::new()), "<r><c/></r>");
        assert_eq!(
            roundtrip("<r><c></c></r>", WriterConfig::new().normalize_empty(false)),
            "<r><c></c></r>"
        );
    }

    #[test]
    fn escapes_regenerated() {
        let events = EventStream::from_str("<r a=\"&lt;&quot;&gt;\">&lt;</r>", &ParserConfig::new());
        let resolved = crate::entity::EntityResolver::new(events, &ParserConfig::new());
        let out = to_string(resolved, WriterConfig::new());
        assert_eq!(out, "<r a=\"&lt;&quot;&gt;\">&lt;</r>");
    }

    #[test]
    fn pretty_printing_indents_elements_only() {
        let doc = "<root><a><b/></a><mixed>text<i>in</i></mixed></root>";
        let out = roundtrip(doc, WriterConfig::new().pretty(true).indent("  "));
        assert_eq!(
            out,
            "<root>\n  <a>\n    <b/>\n  </a>\n  <mixed>text<i>in</i></mixed>\n</root>"
        );
    }

    #[test]
    fn generated_declaration() {
        let out = roundtrip(
            "<r/>",
            WriterConfig::new().xml_declaration(true).standalone(Standalone::Yes),
        );
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><r/>"
        );
    }

    #[test]
    fn stream_prolog_preserved_without_config() {
        let doc = "<?xml version=\"1.0\"?><r/>";
        assert_eq!(roundtrip(doc, WriterConfig::new()), doc);
    }

    #[test]
    fn cdata_close_sequence_split() {
        let events = vec![
            Event::StartDocument,
            Event::StartElement {
                location: crate::events::Location::start(),
                name: crate::events::Name::new("r"),
                attributes: vec![],
            },
            Event::CData {
                location: crate::events::Location::start(),
                text: "a]]>b".to_string(),
            },
            Event::EndElement {
                location: crate::events::Location::start(),
                name: crate::events::Name::new("r"),
            },
            Event::EndDocument,
        ];
        let out = to_string(events.into_iter(), WriterConfig::new());
        assert_eq!(out, "<r><![CDATA[a]]]]><![CDATA[>b]]></r>");
    }

    #[test]
    fn rechunk_blocks() {
        let events = EventStream::from_str("<root><child/>text</root>", &ParserConfig::new());
        let chunks: Vec<_> = Serializer::new(events, WriterConfig::new()).rechunk(8).collect();
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == 8));
        let total: Vec<u8> = chunks.concat();
        assert_eq!(String::from_utf8(total).unwrap(), "<root><child/>text</root>");
    }
}
