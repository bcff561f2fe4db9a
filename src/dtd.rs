//! DTD support: the declaration model, the stream stage that decodes
//! `DocType` events, and the out-of-band handle the entity resolver reads.

mod parser;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::events::Event;

/// An ExternalID on the DOCTYPE or on an external entity declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExternalId {
    /// `SYSTEM "system-id"`
    System(String),
    /// `PUBLIC "public-id" "system-id"`
    Public(String, String),
}

impl ExternalId {
    pub fn system_id(&self) -> &str {
        match self {
            ExternalId::System(s) => s,
            ExternalId::Public(_, s) => s,
        }
    }

    pub fn public_id(&self) -> Option<&str> {
        match self {
            ExternalId::System(_) => None,
            ExternalId::Public(p, _) => Some(p),
        }
    }
}

/// Occurrence indicator on a content particle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Occurrence {
    /// No indicator.
    One,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

/// One particle of a content group.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Particle {
    /// A child element name.
    Element(String),
    /// `#PCDATA` inside a mixed group.
    PcData,
    /// A nested sequence group.
    Sequence(Vec<ContentItem>),
    /// A nested choice group.
    Choice(Vec<ContentItem>),
}

/// A particle plus its occurrence indicator.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ContentItem {
    pub particle: Particle,
    pub occurrence: Occurrence,
}

/// The content model of one `<!ELEMENT>` declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ContentModel {
    /// `EMPTY`
    Empty,
    /// `ANY`
    Any,
    /// `(#PCDATA)` with no element alternatives.
    PcData,
    /// A sequence group with its own occurrence indicator.
    Sequence(Vec<ContentItem>, Occurrence),
    /// A choice group (including mixed content) with its occurrence.
    Choice(Vec<ContentItem>, Occurrence),
}

/// The declared type of an attribute.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AttrType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    /// `(a|b|c)`
    Enumerated(Vec<String>),
    /// `NOTATION (a|b)`
    Notation(Vec<String>),
}

/// The default of an attribute declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AttrDefault {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

/// One attribute declared in an `<!ATTLIST>`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AttrDecl {
    pub name: String,
    pub ty: AttrType,
    pub default: AttrDefault,
}

/// A general entity definition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EntityDef {
    /// `<!ENTITY n "literal">`
    Internal(String),
    /// `<!ENTITY n SYSTEM ...>` / `PUBLIC ...`
    External(ExternalId),
}

/// The decoded DTD: root element, content models, attribute lists and
/// general entities. Parameter entities are expanded away during parsing
/// and do not appear here.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Dtd {
    pub root_element: String,
    pub external_id: Option<ExternalId>,
    pub elements: HashMap<String, ContentModel>,
    pub attributes: HashMap<String, Vec<AttrDecl>>,
    pub entities: HashMap<String, EntityDef>,
}

impl Dtd {
    /// Parses DOCTYPE literal text (the payload of a `DocType` event)
    /// without external-subset access.
    pub fn parse(literal: &str) -> (Dtd, Vec<crate::errors::ParseError>) {
        let (dtd, errors) = parser::parse(literal, None);
        (dtd, errors.into_iter().map(parser::DtdError::into_parse_error).collect())
    }
}

/// Caller-supplied access to external DTD subsets:
/// `(system_id, public_id) -> bytes`.
pub type Resolver = Box<dyn FnMut(&str, Option<&str>) -> crate::errors::Result<Vec<u8>>>;

/// Shared, out-of-band handle to the model decoded by a [`DtdStage`].
///
/// The pipeline is single-threaded by design, so a `Rc<RefCell<..>>` is
/// all the sharing needed: the stage fills it when the `DocType` event
/// passes through, and downstream stages (the entity resolver, the
/// entity-reference validator) read it lazily.
pub type DtdHandle = Rc<RefCell<Option<Dtd>>>;

/// Stream stage that decodes the `DocType` event into a [`Dtd`].
///
/// The stage never modifies upstream events: the `DocType` event is
/// re-emitted as-is, followed by an `Error` event per malformed
/// declaration. The model is surfaced through the returned [`DtdHandle`].
pub struct DtdStage<I> {
    inner: I,
    handle: DtdHandle,
    resolver: Option<Resolver>,
    queue: VecDeque<Event>,
}

impl<I: Iterator<Item = Event>> DtdStage<I> {
    /// A stage without external-subset access.
    pub fn new(inner: I) -> (Self, DtdHandle) {
        let handle: DtdHandle = Rc::new(RefCell::new(None));
        (
            DtdStage { inner, handle: Rc::clone(&handle), resolver: None, queue: VecDeque::new() },
            handle,
        )
    }

    /// A stage fetching the external subset through `resolver`. The
    /// resolver is called at most once per document; a failure aborts DTD
    /// parsing with an error event but not the XML parse.
    pub fn with_resolver(inner: I, resolver: Resolver) -> (Self, DtdHandle) {
        let (mut stage, handle) = Self::new(inner);
        stage.resolver = Some(resolver);
        (stage, handle)
    }
}

impl<I: Iterator<Item = Event>> Iterator for DtdStage<I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if let Some(ev) = self.queue.pop_front() {
            return Some(ev);
        }
        let ev = self.inner.next()?;
        if let Event::DocType { location, text } = &ev {
            let (dtd, errors) = parser::parse(text, self.resolver.as_mut());
            *self.handle.borrow_mut() = Some(dtd);
            for err in errors {
                self.queue.push_back(Event::Error {
                    location: *location,
                    kind: err.kind,
                    message: err.message,
                });
            }
        }
        Some(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{EventStream, ParserConfig};
    use pretty_assertions::assert_eq;

    fn decode(doc: &str) -> (Vec<Event>, Option<Dtd>) {
        let (stage, handle) =
            DtdStage::new(EventStream::from_str(doc, &ParserConfig::new()));
        let events: Vec<_> = stage.collect();
        let dtd = handle.borrow().clone();
        (events, dtd)
    }

    #[test]
    fn stage_reemits_events_and_surfaces_model() {
        let doc = r#"<!DOCTYPE note [<!ENTITY greet "hi">]><note>&greet;</note>"#;
        let (events, dtd) = decode(doc);
        let dtd = dtd.unwrap();
        assert_eq!(dtd.root_element, "note");
        assert_eq!(
            dtd.entities.get("greet"),
            Some(&EntityDef::Internal("hi".to_string()))
        );
        // The DocType event itself still flows downstream.
        assert!(events.iter().any(|e| matches!(e, Event::DocType { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::StartElement { .. })));
    }

    #[test]
    fn external_subset_resolved_once_and_overridden() {
        let calls = Rc::new(RefCell::new(0));
        let calls2 = Rc::clone(&calls);
        let resolver: Resolver = Box::new(move |system_id, public_id| {
            *calls2.borrow_mut() += 1;
            assert_eq!(system_id, "note.dtd");
            assert_eq!(public_id, None);
            Ok(br#"<!ENTITY a "external"> <!ENTITY b "kept">"#.to_vec())
        });
        let doc = r#"<!DOCTYPE note SYSTEM "note.dtd" [<!ENTITY a "internal">]><note/>"#;
        let (stage, handle) = DtdStage::with_resolver(
            EventStream::from_str(doc, &ParserConfig::new()),
            resolver,
        );
        let _events: Vec<_> = stage.collect();
        let dtd = handle.borrow().clone().unwrap();
        assert_eq!(*calls.borrow(), 1);
        // Internal declarations shadow external ones for duplicate names.
        assert_eq!(dtd.entities.get("a"), Some(&EntityDef::Internal("internal".into())));
        assert_eq!(dtd.entities.get("b"), Some(&EntityDef::Internal("kept".into())));
    }

    #[test]
    fn resolver_failure_reports_but_does_not_halt() {
        let resolver: Resolver = Box::new(|_, _| {
            Err(crate::errors::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )))
        });
        let doc = r#"<!DOCTYPE note SYSTEM "missing.dtd"><note/>"#;
        let (stage, handle) = DtdStage::with_resolver(
            EventStream::from_str(doc, &ParserConfig::new()),
            resolver,
        );
        let events: Vec<_> = stage.collect();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Error { kind: crate::errors::ErrorKind::ExternalDtdFailed, .. }
        )));
        // The XML parse continued.
        assert!(events.iter().any(|e| matches!(e, Event::StartElement { .. })));
        assert_eq!(handle.borrow().as_ref().unwrap().root_element, "note");
    }
}
