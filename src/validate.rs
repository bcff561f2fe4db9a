//! Well-formedness validators.
//!
//! Each validator is an independent stream transform enforcing a single
//! property. All share the same policy mechanics: a violation always
//! queues an [`Event::Error`] at the offending token's location, and the
//! [`Policy`] decides what happens next: `Raise` truncates the stream,
//! `Emit` forwards the offending event and continues, `Skip` drops the
//! offending event and continues.
//!
//! [`conformant`] composes the full set with one default policy;
//! [`halt_on_error`] turns a stream into `Result`s that short-circuit at
//! the first error.

use std::collections::VecDeque;

use crate::chars::{is_name_char, is_name_start_char, is_xml_char, Edition};
use crate::dtd::DtdHandle;
use crate::errors::{Error, ErrorKind, ParseError};
use crate::events::{Event, Location};

/// What a validator does after reporting a violation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Policy {
    /// Report, then truncate the stream.
    Raise,
    /// Report, forward the offending event, continue.
    Emit,
    /// Report, drop the offending event, continue.
    Skip,
}

struct Fault {
    location: Location,
    kind: ErrorKind,
    message: String,
}

impl Fault {
    fn new(location: Location, kind: ErrorKind, message: impl Into<String>) -> Self {
        Fault { location, kind, message: message.into() }
    }
}

/// One property check, driven by the shared [`Validator`] harness.
trait Check {
    fn check(&mut self, ev: &Event) -> Vec<Fault>;
}

struct Validator<I, C> {
    inner: I,
    check: C,
    policy: Policy,
    queue: VecDeque<Event>,
    done: bool,
}

impl<I, C> Validator<I, C> {
    fn new(inner: I, check: C, policy: Policy) -> Self {
        Validator { inner, check, policy, queue: VecDeque::new(), done: false }
    }
}

impl<I: Iterator<Item = Event>, C: Check> Iterator for Validator<I, C> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Some(ev);
            }
            if self.done {
                return None;
            }
            let ev = self.inner.next()?;
            let faults = self.check.check(&ev);
            if faults.is_empty() {
                return Some(ev);
            }
            for f in faults {
                self.queue.push_back(Event::Error {
                    location: f.location,
                    kind: f.kind,
                    message: f.message,
                });
            }
            match self.policy {
                Policy::Raise => self.done = true,
                Policy::Emit => self.queue.push_back(ev),
                Policy::Skip => {}
            }
        }
    }
}

// -- individual validators ------------------------------------------------

#[derive(Default)]
struct WellFormedCheck {
    stack: Vec<String>,
    seen_root: bool,
}

impl Check for WellFormedCheck {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        match ev {
            Event::StartElement { name, location, .. } => {
                if self.stack.is_empty() && self.seen_root {
                    faults.push(Fault::new(
                        *location,
                        ErrorKind::MultipleRoots,
                        format!("second root element <{}>", name.raw()),
                    ));
                }
                self.seen_root = true;
                self.stack.push(name.raw().to_string());
            }
            Event::EndElement { name, location } => match self.stack.pop() {
                None => faults.push(Fault::new(
                    *location,
                    ErrorKind::UnexpectedEndTag,
                    format!("</{}> with no element open", name.raw()),
                )),
                Some(open) if open != name.raw() => faults.push(Fault::new(
                    *location,
                    ErrorKind::MismatchedEndTag,
                    format!("mismatched close tag: expected </{}>, found </{}>", open, name.raw()),
                )),
                Some(_) => {}
            },
            Event::Characters { location, .. } | Event::CData { location, .. }
                if self.stack.is_empty() =>
            {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::ContentOutsideRoot,
                    "text outside the root element",
                ));
            }
            Event::EndDocument if !self.stack.is_empty() => {
                faults.push(Fault::new(
                    Location::start(),
                    ErrorKind::UnexpectedEof,
                    format!("input ended with {} element(s) still open", self.stack.len()),
                ));
            }
            _ => {}
        }
        faults
    }
}

/// Tag matching, single root, text-outside-root and premature end of
/// input.
pub fn well_formed<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, WellFormedCheck::default(), policy)
}

struct UniqueAttributes;

impl Check for UniqueAttributes {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let (location, attrs) = match ev {
            Event::StartElement { location, attributes, .. }
            | Event::Prolog { location, attributes, .. } => (*location, attributes),
            _ => return Vec::new(),
        };
        let mut faults = Vec::new();
        for (i, attr) in attrs.iter().enumerate() {
            if attrs[..i].iter().any(|a| a.name.raw() == attr.name.raw()) {
                faults.push(Fault::new(
                    location,
                    ErrorKind::DuplicateAttribute,
                    format!("attribute '{}' appears twice", attr.name.raw()),
                ));
            }
        }
        faults
    }
}

/// Per-start-tag check that attribute names are unique.
pub fn attributes<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, UniqueAttributes, policy)
}

struct LegalCharacters;

impl LegalCharacters {
    fn scan(location: Location, text: &str, faults: &mut Vec<Fault>) {
        if let Some(c) = text.chars().find(|&c| !is_xml_char(c)) {
            faults.push(Fault::new(
                location,
                ErrorKind::IllegalChar,
                format!("character U+{:04X} is not allowed in XML", c as u32),
            ));
        }
    }
}

impl Check for LegalCharacters {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        match ev {
            Event::Characters { location, text }
            | Event::Space { location, text }
            | Event::Comment { location, text }
            | Event::CData { location, text } => {
                Self::scan(*location, text, &mut faults);
            }
            Event::ProcessingInstruction { location, data: Some(data), .. } => {
                Self::scan(*location, data, &mut faults);
            }
            Event::StartElement { location, attributes, .. } => {
                for attr in attributes {
                    Self::scan(*location, &attr.value, &mut faults);
                }
            }
            _ => {}
        }
        faults
    }
}

/// Scans text payloads for characters illegal in XML.
pub fn characters<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, LegalCharacters, policy)
}

struct CommentSyntax;

impl Check for CommentSyntax {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        if let Event::Comment { location, text } = ev {
            if text.contains("--") {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::InvalidComment,
                    "'--' is not allowed inside a comment",
                ));
            } else if text.ends_with('-') {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::InvalidComment,
                    "comment must not end with '-'",
                ));
            }
        }
        faults
    }
}

/// Rejects `--` inside comment bodies and a trailing `-` before `-->`.
pub fn comments<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, CommentSyntax, policy)
}

struct PiSyntax;

impl Check for PiSyntax {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        if let Event::ProcessingInstruction { location, target, .. } = ev {
            if target.is_empty() {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::InvalidPiTarget,
                    "processing instruction without a target",
                ));
            } else if target.eq_ignore_ascii_case("xml") {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::InvalidPiTarget,
                    format!("'{}' is reserved outside the document prolog", target),
                ));
            } else if !valid_name(target) {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::InvalidPiTarget,
                    format!("'{}' is not a valid processing instruction target", target),
                ));
            }
        }
        faults
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c, Edition::Fifth) => {}
        _ => return false,
    }
    chars.all(|c| is_name_char(c, Edition::Fifth))
}

/// Rejects empty PI targets and the reserved target `xml` (any case).
pub fn processing_instructions<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, PiSyntax, policy)
}

#[derive(Default)]
struct RootBoundary {
    depth: usize,
    seen_root: bool,
    seen_prolog: bool,
    seen_doctype: bool,
}

impl Check for RootBoundary {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        match ev {
            Event::StartElement { location, name, .. } => {
                if self.depth == 0 && self.seen_root {
                    faults.push(Fault::new(
                        *location,
                        ErrorKind::MultipleRoots,
                        format!("second root element <{}>", name.raw()),
                    ));
                }
                self.seen_root = true;
                self.depth += 1;
            }
            Event::EndElement { .. } => {
                self.depth = self.depth.saturating_sub(1);
            }
            Event::Characters { location, .. } | Event::CData { location, .. }
                if self.depth == 0 =>
            {
                faults.push(Fault::new(
                    *location,
                    ErrorKind::ContentOutsideRoot,
                    "content outside the root element",
                ));
            }
            Event::Prolog { location, .. } => {
                if self.seen_root || self.seen_prolog {
                    faults.push(Fault::new(
                        *location,
                        ErrorKind::InvalidDeclaration,
                        "XML declaration must come first and only once",
                    ));
                }
                self.seen_prolog = true;
            }
            Event::DocType { location, .. } => {
                if self.seen_root || self.seen_doctype {
                    faults.push(Fault::new(
                        *location,
                        ErrorKind::InvalidDtdDecl,
                        "DOCTYPE must appear once, before the root element",
                    ));
                }
                self.seen_doctype = true;
            }
            Event::EndDocument if !self.seen_root => {
                faults.push(Fault::new(
                    Location::start(),
                    ErrorKind::UnexpectedEof,
                    "no root element found",
                ));
            }
            _ => {}
        }
        faults
    }
}

/// Exactly one root element; only comments, PIs and whitespace outside it;
/// prolog and DOCTYPE at most once, before the root.
pub fn root_boundary<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, RootBoundary::default(), policy)
}

struct EntityReferences {
    dtd: DtdHandle,
}

impl EntityReferences {
    fn scan(&self, location: Location, text: &str, faults: &mut Vec<Fault>) {
        let mut rest = text;
        while let Some(i) = rest.find('&') {
            let after = &rest[i + 1..];
            rest = after;
            if after.starts_with('#') {
                continue;
            }
            let end = match after.find(';') {
                Some(e) if e > 0 => e,
                _ => continue,
            };
            let name = &after[..end];
            if !valid_name(name) {
                continue;
            }
            if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
                continue;
            }
            let declared = self
                .dtd
                .borrow()
                .as_ref()
                .map_or(false, |d| d.entities.contains_key(name));
            if !declared {
                faults.push(Fault::new(
                    location,
                    ErrorKind::UnknownEntity,
                    format!("entity '{}' is not declared", name),
                ));
            }
        }
    }
}

impl Check for EntityReferences {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        match ev {
            Event::Characters { location, text } => self.scan(*location, text, &mut faults),
            Event::StartElement { location, attributes, .. } => {
                for attr in attributes {
                    self.scan(*location, &attr.value, &mut faults);
                }
            }
            _ => {}
        }
        faults
    }
}

/// All named references must resolve to a declared entity. Runs on the
/// unresolved stream, reading declarations through the DTD stage handle.
pub fn entity_references<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
    dtd: DtdHandle,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, EntityReferences { dtd }, policy)
}

struct DeclarationSyntax;

impl Check for DeclarationSyntax {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        let (location, attrs) = match ev {
            Event::Prolog { location, attributes, .. } => (*location, attributes),
            _ => return faults,
        };
        let mut fault = |message: String| {
            faults.push(Fault::new(location, ErrorKind::InvalidDeclaration, message));
        };
        let mut iter = attrs.iter().peekable();
        match iter.next() {
            Some(a) if a.name.raw() == "version" => {
                if !(a.value.starts_with("1.")
                    && a.value.len() > 2
                    && a.value[2..].bytes().all(|b| b.is_ascii_digit()))
                {
                    fault(format!("invalid XML version {:?}", a.value));
                }
            }
            _ => fault("XML declaration must start with a version".to_string()),
        }
        if matches!(iter.peek(), Some(a) if a.name.raw() == "encoding") {
            let a = iter.next();
            if let Some(a) = a {
                let mut bytes = a.value.bytes();
                let head_ok = matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic());
                let tail_ok = bytes
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
                if !head_ok || !tail_ok {
                    fault(format!("invalid encoding name {:?}", a.value));
                }
            }
        }
        if matches!(iter.peek(), Some(a) if a.name.raw() == "standalone") {
            let a = iter.next();
            if let Some(a) = a {
                if a.value != "yes" && a.value != "no" {
                    fault(format!("standalone must be 'yes' or 'no', not {:?}", a.value));
                }
            }
        }
        if let Some(extra) = iter.next() {
            fault(format!(
                "unexpected {:?} in XML declaration (order is version, encoding, standalone)",
                extra.name.raw()
            ));
        }
        faults
    }
}

/// Enforces XML declaration syntax: mandatory version, optional encoding,
/// optional `standalone="yes|no"`, in that order.
pub fn xml_declaration<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, DeclarationSyntax, policy)
}

struct AttributeValues;

impl Check for AttributeValues {
    fn check(&mut self, ev: &Event) -> Vec<Fault> {
        let mut faults = Vec::new();
        if let Event::StartElement { location, attributes, .. } = ev {
            for attr in attributes {
                if attr.value.contains('<') {
                    faults.push(Fault::new(
                        *location,
                        ErrorKind::LtInAttributeValue,
                        format!("'<' in the value of attribute '{}'", attr.name.raw()),
                    ));
                }
            }
        }
        faults
    }
}

/// Forbids a literal `<` in attribute values.
pub fn attribute_values<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    Validator::new(inner, AttributeValues, policy)
}

/// The composition of every validator (except the DTD-dependent
/// entity-reference check) under one policy.
pub fn conformant<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
) -> impl Iterator<Item = Event> {
    let s = well_formed(inner, policy);
    let s = attributes(s, policy);
    let s = characters(s, policy);
    let s = comments(s, policy);
    let s = processing_instructions(s, policy);
    let s = root_boundary(s, policy);
    let s = xml_declaration(s, policy);
    attribute_values(s, policy)
}

/// [`conformant`] plus the entity-reference validator reading declarations
/// from `dtd`.
pub fn conformant_with_dtd<I: Iterator<Item = Event>>(
    inner: I,
    policy: Policy,
    dtd: DtdHandle,
) -> impl Iterator<Item = Event> {
    entity_references(conformant(inner, policy), policy, dtd)
}

/// Sink adapter that truncates the stream at the first error: every event
/// before it comes out as `Ok`, the error itself as `Err`, and nothing
/// after.
pub fn halt_on_error<I: Iterator<Item = Event>>(inner: I) -> HaltOnError<I> {
    HaltOnError { inner, done: false }
}

pub struct HaltOnError<I> {
    inner: I,
    done: bool,
}

impl<I: Iterator<Item = Event>> Iterator for HaltOnError<I> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Event::Error { location, kind, message } => {
                self.done = true;
                Some(Err(Error::Parse(ParseError { kind, location, message })))
            }
            ev => Some(Ok(ev)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{EventStream, ParserConfig};
    use pretty_assertions::assert_eq;

    fn stream(doc: &str) -> impl Iterator<Item = Event> {
        EventStream::from_str(doc, &ParserConfig::new())
    }

    fn kinds(events: &[Event]) -> Vec<ErrorKind> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Error { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn mismatched_close_tag_located_and_haltable() {
        // `<r><c></d></r>`: error at the `</d>`.
        let events: Vec<_> = well_formed(stream("<r><c></d></r>"), Policy::Emit).collect();
        let err = events
            .iter()
            .find_map(|e| match e {
                Event::Error { location, kind, .. } => Some((*location, *kind)),
                _ => None,
            })
            .unwrap();
        assert_eq!(err.1, ErrorKind::MismatchedEndTag);
        assert_eq!(err.0.offset, 6);

        // halt_on_error truncates there.
        let collected: Vec<_> =
            halt_on_error(well_formed(stream("<r><c></d></r>"), Policy::Emit)).collect();
        assert!(collected.last().unwrap().is_err());
        let ok_count = collected.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, collected.len() - 1);
    }

    #[test]
    fn well_formed_passes_clean_documents() {
        let events: Vec<_> =
            well_formed(stream("<a><b/><b></b>t</a>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![]);
    }

    #[test]
    fn unexpected_and_premature() {
        let events: Vec<_> = well_formed(stream("</x>"), Policy::Emit).collect();
        assert!(kinds(&events).contains(&ErrorKind::UnexpectedEndTag));

        let events: Vec<_> = well_formed(stream("<a><b>"), Policy::Emit).collect();
        assert!(kinds(&events).contains(&ErrorKind::UnexpectedEof));
    }

    #[test]
    fn duplicate_attributes_flagged() {
        let events: Vec<_> =
            attributes(stream(r#"<a x="1" x="2"/>"#), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::DuplicateAttribute]);
    }

    #[test]
    fn comment_rules() {
        let events: Vec<_> = comments(stream("<a><!--x--y--></a>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::InvalidComment]);

        let events: Vec<_> = comments(stream("<a><!--x- --></a>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![]);
    }

    #[test]
    fn pi_target_rules() {
        let events: Vec<_> =
            processing_instructions(stream("<a><?XML data?></a>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::InvalidPiTarget]);
    }

    #[test]
    fn root_boundary_rules() {
        let events: Vec<_> = root_boundary(stream("<a/><b/>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::MultipleRoots]);

        let events: Vec<_> = root_boundary(stream("<a/>stray"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::ContentOutsideRoot]);

        // Comments and PIs around the root are fine.
        let events: Vec<_> =
            root_boundary(stream("<!--ok--><a/><?pi ok?>"), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![]);
    }

    #[test]
    fn xml_declaration_rules() {
        let ok: Vec<_> = xml_declaration(
            stream("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><r/>"),
            Policy::Emit,
        )
        .collect();
        assert_eq!(kinds(&ok), vec![]);

        let bad: Vec<_> = xml_declaration(
            stream("<?xml encoding=\"UTF-8\" version=\"1.0\"?><r/>"),
            Policy::Emit,
        )
        .collect();
        assert!(kinds(&bad).contains(&ErrorKind::InvalidDeclaration));

        let bad: Vec<_> = xml_declaration(
            stream("<?xml version=\"1.0\" standalone=\"maybe\"?><r/>"),
            Policy::Emit,
        )
        .collect();
        assert!(kinds(&bad).contains(&ErrorKind::InvalidDeclaration));
    }

    #[test]
    fn lt_in_attribute_value_flagged() {
        let events: Vec<_> =
            attribute_values(stream(r#"<a x="a<b"/>"#), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::LtInAttributeValue]);
    }

    #[test]
    fn policies_differ() {
        let doc = r#"<a x="1" x="2">t</a>"#;

        // Emit keeps the offending start tag.
        let emitted: Vec<_> = attributes(stream(doc), Policy::Emit).collect();
        assert!(emitted.iter().any(|e| matches!(e, Event::StartElement { .. })));

        // Skip drops it but the stream continues.
        let skipped: Vec<_> = attributes(stream(doc), Policy::Skip).collect();
        assert!(!skipped.iter().any(|e| matches!(e, Event::StartElement { .. })));
        assert!(skipped.iter().any(|e| matches!(e, Event::EndElement { .. })));

        // Raise truncates after the error.
        let raised: Vec<_> = attributes(stream(doc), Policy::Raise).collect();
        assert!(matches!(raised.last(), Some(Event::Error { .. })));
    }

    #[test]
    fn entity_reference_validation_uses_dtd() {
        use crate::dtd::DtdStage;
        let doc = r#"<!DOCTYPE r [<!ENTITY known "k">]><r>&known;&unknown;</r>"#;
        let (stage, dtd) = DtdStage::new(stream(doc));
        let events: Vec<_> = entity_references(stage, Policy::Emit, dtd).collect();
        assert_eq!(kinds(&events), vec![ErrorKind::UnknownEntity]);
    }

    #[test]
    fn conformant_accepts_clean_document() {
        let doc = "<?xml version=\"1.0\"?><r a=\"1\"><c/>text<!--note--></r>";
        let events: Vec<_> = conformant(stream(doc), Policy::Emit).collect();
        assert_eq!(kinds(&events), vec![]);
    }
}
