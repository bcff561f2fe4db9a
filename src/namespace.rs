//! Namespace support: the scoped binding stack and the stream transform
//! that validates prefixes and rewrites names.

use std::collections::VecDeque;

use crate::errors::ErrorKind;
use crate::events::{Attribute, Event, Location, Name, NamespaceBinding};

/// The reserved `xml` prefix URI, preseeded into every stack.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// The URI of the declaration syntax itself; never bindable by documents.
pub const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// What the namespace stage does with the stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NamespaceMode {
    /// Pass events through untouched.
    Off,
    /// Check declarations and prefix usage, leave names as written.
    Validate,
    /// Rewrite element/attribute names to carry their namespace URI.
    Resolve,
    /// Validate and rewrite.
    Both,
}

impl NamespaceMode {
    fn active(self) -> bool {
        self != NamespaceMode::Off
    }

    fn resolves(self) -> bool {
        matches!(self, NamespaceMode::Resolve | NamespaceMode::Both)
    }
}

#[derive(Default)]
struct Scope {
    /// `xmlns:prefix` declarations of this element.
    bindings: Vec<(String, String)>,
    /// `xmlns` declaration of this element: `Some(None)` is the explicit
    /// removal `xmlns=""`.
    default_ns: Option<Option<String>>,
}

/// A stack of namespace scopes, one per open element.
///
/// Each scope is owned by the stack frame of its declaring element and is
/// discarded on the matching end tag. `xml` is preseeded and never
/// overridden; `xmlns` is declaration syntax, never a lookup key.
#[derive(Default)]
pub struct NamespaceStack {
    scopes: Vec<Scope>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        NamespaceStack { scopes: Vec::new() }
    }

    fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// The URI bound to `prefix` at the current point, if any.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_URI);
        }
        for scope in self.scopes.iter().rev() {
            for (p, uri) in scope.bindings.iter().rev() {
                if p == prefix {
                    return Some(uri);
                }
            }
        }
        None
    }

    /// The default namespace in effect, if any.
    pub fn default_ns(&self) -> Option<&str> {
        for scope in self.scopes.iter().rev() {
            if let Some(d) = &scope.default_ns {
                return d.as_deref();
            }
        }
        None
    }

    /// All effective bindings, default namespace first, then prefixes in
    /// sorted order. The implicit `xml` binding is not included.
    pub fn snapshot(&self) -> Vec<NamespaceBinding> {
        let mut out = Vec::new();
        if let Some(uri) = self.default_ns() {
            out.push(NamespaceBinding { prefix: None, uri: Some(uri.to_string()) });
        }
        let mut prefixes: Vec<&str> = Vec::new();
        for scope in &self.scopes {
            for (p, _) in &scope.bindings {
                if !prefixes.contains(&p.as_str()) {
                    prefixes.push(p.as_str());
                }
            }
        }
        prefixes.sort_unstable();
        for p in prefixes {
            if let Some(uri) = self.resolve_prefix(p) {
                out.push(NamespaceBinding {
                    prefix: Some(p.to_string()),
                    uri: Some(uri.to_string()),
                });
            }
        }
        out
    }
}

/// The stateful core of the namespace stage: feed events in document
/// order, get back the (possibly rewritten and augmented) events.
pub struct NamespaceTracker {
    stack: NamespaceStack,
    mode: NamespaceMode,
    emit_context: bool,
    only_changes: bool,
}

impl NamespaceTracker {
    pub fn new(mode: NamespaceMode) -> Self {
        NamespaceTracker {
            stack: NamespaceStack::new(),
            mode,
            emit_context: false,
            only_changes: false,
        }
    }

    /// Enable ambient [`Event::NamespaceContext`] events before each start
    /// tag, as full snapshots or (with `only_changes`) as deltas.
    pub fn emit_context(mut self, only_changes: bool) -> Self {
        self.emit_context = true;
        self.only_changes = only_changes;
        self
    }

    /// Process one event. Returns the replacement events in order.
    pub fn apply(&mut self, ev: Event) -> Vec<Event> {
        if !self.mode.active() {
            return vec![ev];
        }
        match ev {
            Event::StartElement { location, name, attributes } => {
                self.start_element(location, name, attributes)
            }
            Event::EndElement { location, mut name } => {
                let mut out = Vec::new();
                if let Some(err) = self.resolve_name(&mut name, location, true) {
                    out.push(err);
                }
                self.stack.pop();
                out.push(Event::EndElement { location, name });
                out
            }
            other => vec![other],
        }
    }

    fn start_element(
        &mut self,
        location: Location,
        mut name: Name,
        mut attributes: Vec<Attribute>,
    ) -> Vec<Event> {
        let mut out = Vec::new();
        let mut scope = Scope::default();
        let mut delta = Vec::new();

        for attr in &attributes {
            let raw = attr.name.raw();
            if raw == "xmlns" {
                let uri = if attr.value.is_empty() { None } else { Some(attr.value.clone()) };
                delta.push(NamespaceBinding { prefix: None, uri: uri.clone() });
                scope.default_ns = Some(uri);
            } else if attr.name.prefix() == Some("xmlns") {
                let prefix = attr.name.local().to_string();
                if prefix == "xmlns" {
                    out.push(ns_error(
                        location,
                        format!("the 'xmlns' prefix cannot be declared (to {:?})", attr.value),
                    ));
                    continue;
                }
                if prefix == "xml" && attr.value != XML_URI {
                    out.push(ns_error(
                        location,
                        format!("the 'xml' prefix cannot be bound to {:?}", attr.value),
                    ));
                    continue;
                }
                if attr.value == XMLNS_URI || (attr.value == XML_URI && prefix != "xml") {
                    out.push(ns_error(
                        location,
                        format!("the reserved URI {:?} cannot be bound to '{}'", attr.value, prefix),
                    ));
                    continue;
                }
                delta.push(NamespaceBinding {
                    prefix: Some(prefix.clone()),
                    uri: Some(attr.value.clone()),
                });
                scope.bindings.push((prefix, attr.value.clone()));
            }
        }
        self.stack.push(scope);

        if self.emit_context {
            let bindings = if self.only_changes { delta } else { self.stack.snapshot() };
            out.push(Event::NamespaceContext { location, bindings });
        }

        if let Some(err) = self.resolve_name(&mut name, location, true) {
            out.push(err);
        }
        for attr in &mut attributes {
            // Declaration attributes stay as written; unprefixed attributes
            // never inherit the default namespace.
            if attr.name.raw() == "xmlns" || attr.name.prefix() == Some("xmlns") {
                continue;
            }
            if attr.name.prefix().is_some() {
                if let Some(err) = self.resolve_name(&mut attr.name, location, false) {
                    out.push(err);
                }
            }
        }

        out.push(Event::StartElement { location, name, attributes });
        out
    }

    /// Resolve one name in the current scope. `use_default` applies the
    /// default namespace to unprefixed names (elements yes, attributes no).
    fn resolve_name(
        &self,
        name: &mut Name,
        location: Location,
        use_default: bool,
    ) -> Option<Event> {
        match name.prefix() {
            Some(prefix) => match self.stack.resolve_prefix(prefix) {
                Some(uri) => {
                    if self.mode.resolves() {
                        let uri = uri.to_string();
                        name.set_uri(Some(uri));
                    }
                    None
                }
                None => Some(Event::Error {
                    location,
                    kind: ErrorKind::UndeclaredPrefix,
                    message: format!("prefix '{}' is not declared", prefix),
                }),
            },
            None => {
                if use_default && self.mode.resolves() {
                    name.set_uri(self.stack.default_ns().map(str::to_string));
                }
                None
            }
        }
    }
}

fn ns_error(location: Location, message: String) -> Event {
    Event::Error { location, kind: ErrorKind::ReservedNamespace, message }
}

/// Iterator adapter running the namespace stage over any event stream.
pub struct Namespaced<I> {
    inner: I,
    tracker: NamespaceTracker,
    queue: VecDeque<Event>,
}

impl<I: Iterator<Item = Event>> Namespaced<I> {
    pub fn new(inner: I, mode: NamespaceMode) -> Self {
        Namespaced { inner, tracker: NamespaceTracker::new(mode), queue: VecDeque::new() }
    }

    /// Enable ambient `NamespaceContext` events.
    pub fn emit_context(mut self, only_changes: bool) -> Self {
        self.tracker = self.tracker.emit_context(only_changes);
        self
    }
}

impl<I: Iterator<Item = Event>> Iterator for Namespaced<I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Some(ev);
            }
            let ev = self.inner.next()?;
            self.queue.extend(self.tracker.apply(ev));
        }
    }
}
