//! The entity resolver transform.
//!
//! Rewrites entity references in `Characters` events and attribute values:
//! the five predefined entities, decimal/hex character references, and
//! general entities declared by the DTD. A DTD-defined expansion that
//! contains markup is re-parsed through a nested tokenizer and the
//! resulting events are spliced into the stream at the reference's
//! location. Expansion is hard-bounded in depth and in cumulative bytes as
//! a defense against exponential-entity documents.

use std::collections::VecDeque;

use crate::chars::{is_name_char, is_name_start_char, Edition};
use crate::dtd::{DtdHandle, EntityDef};
use crate::errors::ErrorKind;
use crate::events::{Attribute, Event, Location};
use crate::reader::tokenizer::Tokenizer;
use crate::reader::ParserConfig;

/// Policy for a named reference that resolves to nothing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnknownEntityMode {
    /// Emit the error and truncate the stream.
    Raise,
    /// Emit the error and keep the reference text.
    Emit,
    /// Pass the reference through silently.
    Keep,
    /// Drop the reference from the text.
    Remove,
}

enum Ref {
    /// A numeric reference or predefined entity, already a scalar.
    Char(char),
    /// A numeric reference outside the legal range.
    BadChar(String),
    /// A named general entity.
    Named(String),
}

/// Stream transform resolving entity references.
///
/// Built over any event iterator; reads DTD-declared entities through the
/// [`DtdHandle`] of an upstream [`DtdStage`](crate::dtd::DtdStage), which
/// fills the handle before the first post-DOCTYPE event arrives here.
pub struct EntityResolver<I> {
    inner: I,
    dtd: Option<DtdHandle>,
    edition: Edition,
    on_unknown: UnknownEntityMode,
    max_depth: usize,
    max_total: usize,
    total_expanded: usize,
    queue: VecDeque<Event>,
    fused: bool,
    fuse_with_end: bool,
}

impl<I: Iterator<Item = Event>> EntityResolver<I> {
    /// A resolver without DTD knowledge: predefined and numeric references
    /// only.
    pub fn new(inner: I, config: &ParserConfig) -> Self {
        EntityResolver {
            inner,
            dtd: None,
            edition: config.edition,
            on_unknown: config.on_unknown_entity,
            max_depth: config.max_expansion_depth,
            max_total: config.max_total_expansion,
            total_expanded: 0,
            queue: VecDeque::new(),
            fused: false,
            fuse_with_end: false,
        }
    }

    /// A resolver that also looks up general entities in the model behind
    /// `dtd`.
    pub fn with_dtd(inner: I, config: &ParserConfig, dtd: DtdHandle) -> Self {
        let mut r = Self::new(inner, config);
        r.dtd = Some(dtd);
        r
    }

    fn lookup(&self, name: &str) -> Option<EntityDef> {
        let handle = self.dtd.as_ref()?;
        let dtd = handle.borrow();
        dtd.as_ref()?.entities.get(name).cloned()
    }

    /// Truncate the stream after the events queued by the current step.
    /// `process` appends the closing `EndDocument` once the step's own
    /// events are in order.
    fn fuse(&mut self, with_end_document: bool) {
        self.fused = true;
        self.fuse_with_end = with_end_document;
    }

    fn charge(&mut self, bytes: usize, location: Location, out: &mut Vec<Event>) -> bool {
        self.total_expanded += bytes;
        if self.total_expanded > self.max_total {
            out.push(Event::Error {
                location,
                kind: ErrorKind::ExpansionLimit,
                message: format!(
                    "cumulative entity expansion exceeds {} bytes",
                    self.max_total
                ),
            });
            return false;
        }
        true
    }

    /// Resolve all references in `text`. Resolved character data collects
    /// in `out`; errors and spliced markup events append to `events`.
    /// Returns `false` on a fatal budget violation.
    fn resolve_into(
        &mut self,
        text: &str,
        location: Location,
        in_attr: bool,
        depth: usize,
        active: &mut Vec<String>,
        out: &mut String,
        events: &mut Vec<Event>,
    ) -> bool {
        let mut rest = text;
        while let Some(i) = rest.find('&') {
            out.push_str(&rest[..i]);
            let after = &rest[i + 1..];
            match self.parse_reference(after) {
                None => {
                    // A bare `&` is an error regardless of `on_unknown`.
                    events.push(Event::Error {
                        location,
                        kind: ErrorKind::BareAmpersand,
                        message: "'&' does not start a reference".to_string(),
                    });
                    out.push('&');
                    rest = after;
                }
                Some((Ref::Char(c), len)) => {
                    out.push(c);
                    rest = &after[len..];
                }
                Some((Ref::BadChar(repr), len)) => {
                    events.push(Event::Error {
                        location,
                        kind: ErrorKind::InvalidCharRef,
                        message: format!("&{}; is not a legal character", repr),
                    });
                    rest = &after[len..];
                }
                Some((Ref::Named(name), len)) => {
                    rest = &after[len..];
                    if !self.expand_named(&name, location, in_attr, depth, active, out, events) {
                        return false;
                    }
                }
            }
        }
        out.push_str(rest);
        true
    }

    /// Expand one named reference. Returns `false` on fatal violations.
    fn expand_named(
        &mut self,
        name: &str,
        location: Location,
        in_attr: bool,
        depth: usize,
        active: &mut Vec<String>,
        out: &mut String,
        events: &mut Vec<Event>,
    ) -> bool {
        if let Some(c) = predefined(name) {
            out.push(c);
            return true;
        }
        let def = self.lookup(name);
        match def {
            Some(EntityDef::Internal(value)) => {
                if active.iter().any(|n| n == name) {
                    events.push(Event::Error {
                        location,
                        kind: ErrorKind::CyclicEntity,
                        message: format!("entity '{}' expands through itself", name),
                    });
                    out.push_str(&format!("&{};", name));
                    return true;
                }
                if depth + 1 > self.max_depth {
                    events.push(Event::Error {
                        location,
                        kind: ErrorKind::ExpansionLimit,
                        message: format!(
                            "entity expansion deeper than {} levels",
                            self.max_depth
                        ),
                    });
                    self.fuse(true);
                    return false;
                }
                if !self.charge(value.len(), location, events) {
                    self.fuse(true);
                    return false;
                }
                active.push(name.to_string());
                let ok = if value.contains('<') {
                    if in_attr {
                        events.push(Event::Error {
                            location,
                            kind: ErrorKind::LtInAttributeValue,
                            message: format!(
                                "entity '{}' expands to '<' inside an attribute value",
                                name
                            ),
                        });
                        true
                    } else {
                        // Flush the text gathered so far so the spliced
                        // events land in document order.
                        if !out.is_empty() {
                            events.push(Event::Characters {
                                location,
                                text: std::mem::take(out),
                            });
                        }
                        self.splice_markup(&value, location, depth + 1, active, events)
                    }
                } else {
                    self.resolve_into(&value, location, in_attr, depth + 1, active, out, events)
                };
                active.pop();
                ok
            }
            Some(EntityDef::External(_)) | None => {
                let declared_external = matches!(def, Some(EntityDef::External(_)));
                match self.on_unknown {
                    UnknownEntityMode::Keep => {
                        out.push_str(&format!("&{};", name));
                        true
                    }
                    UnknownEntityMode::Remove => true,
                    mode => {
                        events.push(Event::Error {
                            location,
                            kind: ErrorKind::UnknownEntity,
                            message: if declared_external {
                                format!("external entity '{}' is not resolved", name)
                            } else {
                                format!("entity '{}' is not declared", name)
                            },
                        });
                        if mode == UnknownEntityMode::Raise {
                            self.fuse(false);
                            return false;
                        }
                        out.push_str(&format!("&{};", name));
                        true
                    }
                }
            }
        }
    }

    /// Re-parse a markup-bearing expansion through a nested tokenizer and
    /// splice the events, relocated to the reference. Character references
    /// inside the expansion resolve while the nested character data and
    /// attribute values pass back through `resolve_into`, ahead of any
    /// named references they contain.
    fn splice_markup(
        &mut self,
        value: &str,
        location: Location,
        depth: usize,
        active: &mut Vec<String>,
        events: &mut Vec<Event>,
    ) -> bool {
        let mut nested = Tokenizer::new(self.edition, false);
        nested.feed(value.as_bytes());
        nested.finish();
        // Skip the nested StartDocument bracket.
        nested.next_event();
        while let Some(mut ev) = nested.next_event() {
            match ev {
                Event::EndDocument => break,
                Event::Characters { text, .. } => {
                    let mut resolved = String::new();
                    let ok = self.resolve_into(
                        &text, location, false, depth, active, &mut resolved, events,
                    );
                    if !resolved.is_empty() {
                        events.push(Event::Characters { location, text: resolved });
                    }
                    if !ok {
                        return false;
                    }
                }
                Event::StartElement { name, mut attributes, .. } => {
                    let mut attr_events = Vec::new();
                    if !self.resolve_attributes(
                        &mut attributes, location, depth, active, &mut attr_events,
                    ) {
                        events.extend(attr_events);
                        return false;
                    }
                    events.extend(attr_events);
                    events.push(Event::StartElement { location, name, attributes });
                }
                _ => {
                    ev.relocate(location);
                    events.push(ev);
                }
            }
        }
        true
    }

    fn resolve_attributes(
        &mut self,
        attributes: &mut [Attribute],
        location: Location,
        depth: usize,
        active: &mut Vec<String>,
        events: &mut Vec<Event>,
    ) -> bool {
        for attr in attributes.iter_mut() {
            if !attr.value.contains('&') {
                continue;
            }
            let value = std::mem::take(&mut attr.value);
            let mut resolved = String::new();
            let ok = self.resolve_into(
                &value, location, true, depth, active, &mut resolved, events,
            );
            attr.value = resolved;
            if !ok {
                return false;
            }
        }
        true
    }

    fn parse_reference(&self, after: &str) -> Option<(Ref, usize)> {
        let mut chars = after.char_indices();
        let first = chars.next()?;
        if first.1 == '#' {
            return parse_char_ref(after);
        }
        if !is_name_start_char(first.1, self.edition) {
            return None;
        }
        for (i, c) in chars {
            if c == ';' {
                return Some((Ref::Named(after[..i].to_string()), i + 1));
            }
            if !is_name_char(c, self.edition) {
                return None;
            }
        }
        None
    }

    fn process(&mut self, ev: Event) {
        match ev {
            Event::Characters { location, text } => {
                if !text.contains('&') {
                    self.queue.push_back(Event::Characters { location, text });
                } else {
                    let mut out = String::new();
                    let mut events = Vec::new();
                    let mut active = Vec::new();
                    self.resolve_into(
                        &text, location, false, 0, &mut active, &mut out, &mut events,
                    );
                    self.queue.extend(events);
                    if !self.fused && !out.is_empty() {
                        self.queue.push_back(Event::Characters { location, text: out });
                    }
                }
            }
            Event::StartElement { location, name, mut attributes } => {
                let mut events = Vec::new();
                let mut active = Vec::new();
                let ok = self.resolve_attributes(
                    &mut attributes, location, 0, &mut active, &mut events,
                );
                self.queue.extend(events);
                if ok {
                    self.queue.push_back(Event::StartElement { location, name, attributes });
                }
            }
            other => self.queue.push_back(other),
        }
        if self.fused && std::mem::replace(&mut self.fuse_with_end, false) {
            self.queue.push_back(Event::EndDocument);
        }
    }
}

impl<I: Iterator<Item = Event>> Iterator for EntityResolver<I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Some(ev);
            }
            if self.fused {
                return None;
            }
            let ev = self.inner.next()?;
            self.process(ev);
        }
    }
}

fn predefined(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

fn parse_char_ref(after: &str) -> Option<(Ref, usize)> {
    // `after` starts with '#'.
    let body = &after[1..];
    let (digits, radix, digits_start) = if let Some(hex) = body.strip_prefix('x') {
        (hex, 16, 2)
    } else {
        (body, 10, 1)
    };
    let end = digits.find(';')?;
    if end == 0 {
        return None;
    }
    let repr = &digits[..end];
    let consumed = digits_start + end + 1;
    let value = match u32::from_str_radix(repr, radix) {
        Ok(v) => v,
        Err(_) => return Some((Ref::BadChar(after[..consumed - 1].to_string()), consumed)),
    };
    match char::from_u32(value) {
        Some(c) if crate::chars::is_xml_char(c) => Some((Ref::Char(c), consumed)),
        _ => Some((Ref::BadChar(after[..consumed - 1].to_string()), consumed)),
    }
}
