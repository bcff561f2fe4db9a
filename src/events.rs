//! The event model shared by every pipeline stage.
//!
//! There is exactly one event schema. Stages may rewrite payloads (entity
//! resolution, namespace expansion) or insert events, but every stage speaks
//! the same [`Event`] enum and preserves relative order.

use std::fmt;

use crate::errors::ErrorKind;

/// A position in the logical (post-normalization) input.
///
/// `line` is 1-based and advances once per LF byte consumed. `line_start`
/// is the byte offset just past the most recent LF, so the column falls out
/// as `offset - line_start`. `offset` counts absolute bytes from the start
/// of the logical input and never decreases within a parse.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Location {
    /// 1-based line number.
    pub line: u64,
    /// Byte offset of the first byte of the current line.
    pub line_start: usize,
    /// Absolute byte offset.
    pub offset: usize,
}

impl Location {
    /// The position before any input: line 1, offset 0.
    pub fn start() -> Self {
        Location { line: 1, line_start: 0, offset: 0 }
    }

    /// 0-based column derived from the line start.
    pub fn column(&self) -> usize {
        self.offset - self.line_start
    }

    /// Advance over `bytes` non-newline bytes.
    #[inline]
    pub(crate) fn advance(&mut self, bytes: usize) {
        self.offset += bytes;
    }

    /// Advance over one LF byte.
    #[inline]
    pub(crate) fn newline(&mut self) {
        self.offset += 1;
        self.line += 1;
        self.line_start = self.offset;
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::start()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column())
    }
}

/// An element or attribute name.
///
/// Holds the qualified name exactly as written plus the namespace URI the
/// resolver stage filled in, if any. Equality covers both, so unresolved
/// and resolved names with the same spelling compare unequal on purpose.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Name {
    raw: String,
    uri: Option<String>,
}

impl Name {
    /// A name as written in the document, not yet namespace-resolved.
    pub fn new(raw: impl Into<String>) -> Self {
        Name { raw: raw.into(), uri: None }
    }

    /// A name carrying a resolved namespace URI.
    pub fn resolved(raw: impl Into<String>, uri: impl Into<String>) -> Self {
        Name { raw: raw.into(), uri: Some(uri.into()) }
    }

    /// The qualified name as written (`prefix:local` or `local`).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The prefix part, if the name is prefixed.
    pub fn prefix(&self) -> Option<&str> {
        self.raw.find(':').map(|i| &self.raw[..i])
    }

    /// The local part (everything after the first `:`, or the whole name).
    pub fn local(&self) -> &str {
        match self.raw.find(':') {
            Some(i) => &self.raw[i + 1..],
            None => &self.raw,
        }
    }

    /// The resolved namespace URI, if the namespace stage ran in resolve
    /// mode and found a binding.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub(crate) fn set_uri(&mut self, uri: Option<String>) {
        self.uri = uri;
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local()),
            None => f.write_str(&self.raw),
        }
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.raw == *other
    }
}

/// One attribute: name plus value, in document order within its element.
///
/// The value holds the literal bytes between the quotes until the entity
/// resolver stage rewrites it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Attribute {
    pub name: Name,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute { name: Name::new(name), value: value.into() }
    }
}

/// One prefix binding reported by a [`Event::NamespaceContext`] event.
///
/// `prefix == None` is the default namespace; `uri == None` records an
/// unbinding (`xmlns=""`), which only appears in delta snapshots.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NamespaceBinding {
    pub prefix: Option<String>,
    pub uri: Option<String>,
}

/// A single event of the stream.
///
/// Every variant except the document brackets carries the [`Location`] of
/// its first significant byte.
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    /// Always the first event of a stream.
    StartDocument,
    /// Always the last event of a stream.
    EndDocument,
    /// The XML declaration, parsed like a start tag.
    Prolog {
        location: Location,
        target: String,
        attributes: Vec<Attribute>,
    },
    /// Raw DOCTYPE text; decoded later by the DTD stage.
    DocType { location: Location, text: String },
    /// A start tag (a self-closing tag produces this plus the matching
    /// `EndElement`).
    StartElement {
        location: Location,
        name: Name,
        attributes: Vec<Attribute>,
    },
    /// An end tag.
    EndElement { location: Location, name: Name },
    /// Character data containing at least one non-whitespace character,
    /// or any character data when whitespace tracking is off.
    Characters { location: Location, text: String },
    /// Whitespace-only inter-element text (only when whitespace tracking
    /// is on).
    Space { location: Location, text: String },
    /// A comment body, `<!--` and `-->` stripped.
    Comment { location: Location, text: String },
    /// A CDATA section body, uninterpreted.
    CData { location: Location, text: String },
    /// A processing instruction; `data` is everything after the first
    /// whitespace run following the target.
    ProcessingInstruction {
        location: Location,
        target: String,
        data: Option<String>,
    },
    /// Ambient snapshot (or delta) of the namespace scope, emitted just
    /// before the start tag it describes and sharing its location.
    NamespaceContext {
        location: Location,
        bindings: Vec<NamespaceBinding>,
    },
    /// A parse or validation error, recoverable unless
    /// [`ErrorKind::is_fatal`] says otherwise.
    Error {
        location: Location,
        kind: ErrorKind,
        message: String,
    },
}

impl Event {
    /// The location of a positional event; `None` for the document
    /// brackets.
    pub fn location(&self) -> Option<Location> {
        match self {
            Event::StartDocument | Event::EndDocument => None,
            Event::Prolog { location, .. }
            | Event::DocType { location, .. }
            | Event::StartElement { location, .. }
            | Event::EndElement { location, .. }
            | Event::Characters { location, .. }
            | Event::Space { location, .. }
            | Event::Comment { location, .. }
            | Event::CData { location, .. }
            | Event::ProcessingInstruction { location, .. }
            | Event::NamespaceContext { location, .. }
            | Event::Error { location, .. } => Some(*location),
        }
    }

    /// Whether this is an [`Event::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }

    pub(crate) fn relocate(&mut self, to: Location) {
        match self {
            Event::StartDocument | Event::EndDocument => {}
            Event::Prolog { location, .. }
            | Event::DocType { location, .. }
            | Event::StartElement { location, .. }
            | Event::EndElement { location, .. }
            | Event::Characters { location, .. }
            | Event::Space { location, .. }
            | Event::Comment { location, .. }
            | Event::CData { location, .. }
            | Event::ProcessingInstruction { location, .. }
            | Event::NamespaceContext { location, .. }
            | Event::Error { location, .. } => *location = to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_parts() {
        let n = Name::new("svg:rect");
        assert_eq!(n.prefix(), Some("svg"));
        assert_eq!(n.local(), "rect");
        assert_eq!(n.uri(), None);

        let n = Name::new("rect");
        assert_eq!(n.prefix(), None);
        assert_eq!(n.local(), "rect");
    }

    #[test]
    fn location_column() {
        let mut loc = Location::start();
        loc.advance(3);
        assert_eq!(loc.column(), 3);
        loc.newline();
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column(), 0);
        loc.advance(2);
        assert_eq!((loc.line, loc.column(), loc.offset), (2, 2, 6));
    }
}
