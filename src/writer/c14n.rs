//! Canonical XML serialization (C14N and exclusive C14N).
//!
//! Canonical output is byte-deterministic: attributes sorted by
//! (namespace URI, local name), namespace declarations sorted with the
//! default first, `"` quotes throughout, C14N escaping, empty elements
//! written as `<n></n>`, LF-only line endings, and the XML declaration and
//! DOCTYPE dropped. Exclusive mode additionally emits a namespace
//! declaration only on elements that visibly use it.
//!
//! Canonicalization consumes the (finite) event sequence directly; the
//! streaming serializer stays in the parent module.

use std::collections::BTreeMap;

use crate::events::{Attribute, Event};

/// Which canonicalization profile to apply.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Canonicalization {
    /// Canonical XML 1.0; comments dropped.
    Inclusive,
    /// Canonical XML 1.0 with comments preserved.
    InclusiveWithComments,
    /// Exclusive C14N; comments dropped.
    Exclusive,
    /// Exclusive C14N with comments preserved.
    ExclusiveWithComments,
}

impl Canonicalization {
    fn keeps_comments(self) -> bool {
        matches!(
            self,
            Canonicalization::InclusiveWithComments | Canonicalization::ExclusiveWithComments
        )
    }

    fn exclusive(self) -> bool {
        matches!(
            self,
            Canonicalization::Exclusive | Canonicalization::ExclusiveWithComments
        )
    }
}

/// One namespace declaration: `(prefix, uri)`; `prefix == None` is the
/// default namespace and `uri == None` the explicit unbinding `xmlns=""`.
type Decl = (Option<String>, Option<String>);

/// Serialize an event sequence canonically.
///
/// Input is expected entity-resolved; names need not be namespace-resolved
/// because the canonicalizer tracks declarations itself.
pub fn canonicalize<I: Iterator<Item = Event>>(events: I, mode: Canonicalization) -> Vec<u8> {
    let mut out = String::new();
    // Declarations as written, per open element.
    let mut input_stack: Vec<Vec<Decl>> = Vec::new();
    // Declarations actually rendered, per open element.
    let mut output_stack: Vec<Vec<Decl>> = Vec::new();

    for ev in events {
        match ev {
            Event::StartElement { name, attributes, .. } => {
                let (decls, attrs) = split_attributes(&attributes);
                input_stack.push(decls);

                let in_scope = effective(&input_stack);
                let rendered_ctx = effective(&output_stack);
                let to_render = if mode.exclusive() {
                    visibly_used(&name, &attrs, &in_scope, &rendered_ctx)
                } else {
                    inclusive_delta(&in_scope, &rendered_ctx)
                };

                out.push('<');
                out.push_str(name.raw());
                for (prefix, uri) in &to_render {
                    match prefix {
                        None => out.push_str(" xmlns=\""),
                        Some(p) => {
                            out.push_str(" xmlns:");
                            out.push_str(p);
                            out.push_str("=\"");
                        }
                    }
                    if let Some(uri) = uri {
                        out.push_str(&escape_attr_c14n(uri));
                    }
                    out.push('"');
                }
                output_stack.push(to_render);

                let mut sorted: Vec<&Attribute> = attrs;
                sorted.sort_by(|a, b| {
                    let ka = (a.name.uri().unwrap_or(""), a.name.local());
                    let kb = (b.name.uri().unwrap_or(""), b.name.local());
                    ka.cmp(&kb)
                });
                for attr in sorted {
                    out.push(' ');
                    out.push_str(attr.name.raw());
                    out.push_str("=\"");
                    out.push_str(&escape_attr_c14n(&attr.value));
                    out.push('"');
                }
                out.push('>');
            }
            Event::EndElement { name, .. } => {
                input_stack.pop();
                output_stack.pop();
                out.push_str("</");
                out.push_str(name.raw());
                out.push('>');
            }
            Event::Characters { text, .. } | Event::Space { text, .. } => {
                out.push_str(&escape_text_c14n(&text));
            }
            // CDATA loses its brackets and becomes escaped text.
            Event::CData { text, .. } => {
                out.push_str(&escape_text_c14n(&text));
            }
            Event::Comment { text, .. } => {
                if mode.keeps_comments() {
                    out.push_str("<!--");
                    out.push_str(&text);
                    out.push_str("-->");
                }
            }
            Event::ProcessingInstruction { target, data, .. } => {
                out.push_str("<?");
                out.push_str(&target);
                if let Some(data) = &data {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
            // The declaration, the DOCTYPE and ambient or error events
            // have no canonical form.
            Event::StartDocument
            | Event::EndDocument
            | Event::Prolog { .. }
            | Event::DocType { .. }
            | Event::NamespaceContext { .. }
            | Event::Error { .. } => {}
        }
    }
    out.into_bytes()
}

fn split_attributes(attributes: &[Attribute]) -> (Vec<Decl>, Vec<&Attribute>) {
    let mut decls = Vec::new();
    let mut attrs = Vec::new();
    for attr in attributes {
        if attr.name.raw() == "xmlns" {
            let uri = if attr.value.is_empty() { None } else { Some(attr.value.clone()) };
            decls.push((None, uri));
        } else if attr.name.prefix() == Some("xmlns") {
            decls.push((Some(attr.name.local().to_string()), Some(attr.value.clone())));
        } else {
            attrs.push(attr);
        }
    }
    (decls, attrs)
}

/// The effective prefix → URI map of a declaration stack. Unbound
/// defaults drop out of the map entirely.
fn effective(stack: &[Vec<Decl>]) -> BTreeMap<Option<String>, String> {
    let mut map = BTreeMap::new();
    for frame in stack {
        for (prefix, uri) in frame {
            match uri {
                Some(uri) => {
                    map.insert(prefix.clone(), uri.clone());
                }
                None => {
                    map.remove(prefix);
                }
            }
        }
    }
    map
}

/// Inclusive mode: every in-scope binding not already rendered
/// identically, plus an explicit unbinding when a rendered default
/// namespace goes out of scope. `BTreeMap` ordering puts the default
/// first, then prefixes sorted.
fn inclusive_delta(
    in_scope: &BTreeMap<Option<String>, String>,
    rendered: &BTreeMap<Option<String>, String>,
) -> Vec<Decl> {
    let mut out = Vec::new();
    if rendered.contains_key(&None) && !in_scope.contains_key(&None) {
        out.push((None, None));
    }
    for (prefix, uri) in in_scope {
        if rendered.get(prefix) != Some(uri) {
            out.push((prefix.clone(), Some(uri.clone())));
        }
    }
    out.sort();
    out
}

/// Exclusive mode: only bindings visibly used by this element (its own
/// prefix and the prefixes of its attributes), and only where the
/// rendered context differs.
fn visibly_used(
    name: &crate::events::Name,
    attrs: &[&Attribute],
    in_scope: &BTreeMap<Option<String>, String>,
    rendered: &BTreeMap<Option<String>, String>,
) -> Vec<Decl> {
    let mut used: Vec<Option<String>> = Vec::new();
    match name.prefix() {
        Some(p) => used.push(Some(p.to_string())),
        // An unprefixed element visibly uses the default namespace.
        None => used.push(None),
    }
    for attr in attrs {
        if let Some(p) = attr.name.prefix() {
            let p = Some(p.to_string());
            if !used.contains(&p) {
                used.push(p);
            }
        }
    }

    let mut out = Vec::new();
    for prefix in used {
        match (in_scope.get(&prefix), rendered.get(&prefix)) {
            (Some(uri), r) if r != Some(uri) => out.push((prefix, Some(uri.clone()))),
            // Default namespace rendered by an ancestor but no longer in
            // scope (or never was): unbind it.
            (None, Some(_)) if prefix.is_none() => out.push((None, None)),
            _ => {}
        }
    }
    out.sort();
    out
}

/// C14N text escaping: `&`, `<`, `>` and CR.
fn escape_text_c14n(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

/// C14N attribute escaping: `&`, `<`, `"`, tab, LF and CR.
fn escape_attr_c14n(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityResolver;
    use crate::reader::{EventStream, ParserConfig};
    use pretty_assertions::assert_eq;

    fn c14n(doc: &str, mode: Canonicalization) -> String {
        let config = ParserConfig::new();
        let events = EntityResolver::new(EventStream::from_str(doc, &config), &config);
        String::from_utf8(canonicalize(events, mode)).unwrap()
    }

    #[test]
    fn attributes_sorted_and_quotes_normalized() {
        let out = c14n(
            "<r b='2' a=\"1\"><c z='' y=''/></r>",
            Canonicalization::Inclusive,
        );
        assert_eq!(out, r#"<r a="1" b="2"><c y="" z=""></c></r>"#);
    }

    #[test]
    fn equivalent_inputs_canonicalize_identically() {
        let a = c14n("<r b='2' a='1'><c/></r>", Canonicalization::Inclusive);
        let b = c14n(r#"<r a="1" b="2"><c></c></r>"#, Canonicalization::Inclusive);
        assert_eq!(a, b);
    }

    #[test]
    fn comments_dropped_or_kept() {
        let doc = "<r><!--note--></r>";
        assert_eq!(c14n(doc, Canonicalization::Inclusive), "<r></r>");
        assert_eq!(
            c14n(doc, Canonicalization::InclusiveWithComments),
            "<r><!--note--></r>"
        );
    }

    #[test]
    fn cdata_becomes_escaped_text() {
        let out = c14n("<r><![CDATA[a<b&c]]></r>", Canonicalization::Inclusive);
        assert_eq!(out, "<r>a&lt;b&amp;c</r>");
    }

    #[test]
    fn prolog_and_doctype_dropped() {
        let out = c14n(
            "<?xml version=\"1.0\"?><!DOCTYPE r><r/>",
            Canonicalization::Inclusive,
        );
        assert_eq!(out, "<r></r>");
    }

    #[test]
    fn duplicate_namespace_declarations_not_reemitted() {
        let out = c14n(
            r#"<a xmlns:p="u"><b xmlns:p="u"><p:c/></b></a>"#,
            Canonicalization::Inclusive,
        );
        assert_eq!(out, r#"<a xmlns:p="u"><b><p:c></p:c></b></a>"#);
    }

    #[test]
    fn exclusive_moves_declarations_to_use_sites() {
        let out = c14n(
            r#"<a xmlns:p="u" xmlns:q="v"><p:b>x</p:b></a>"#,
            Canonicalization::Exclusive,
        );
        // `q` is never visibly used; `p` is declared where used.
        assert_eq!(out, r#"<a><p:b xmlns:p="u">x</p:b></a>"#);
    }

    #[test]
    fn exclusive_keeps_default_namespace_of_unprefixed_elements() {
        let out = c14n(r#"<a xmlns="u"><b/></a>"#, Canonicalization::Exclusive);
        assert_eq!(out, r#"<a xmlns="u"><b></b></a>"#);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let doc = r#"<r xmlns="u" b="2" a="1"> text <c/></r>"#;
        let once = c14n(doc, Canonicalization::Inclusive);
        let twice = c14n(&once, Canonicalization::Inclusive);
        assert_eq!(once, twice);
    }
}
