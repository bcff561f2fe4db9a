//! Namespace scope properties over whole documents.

use pretty_assertions::assert_eq;
use xmlpipe::namespace::{NamespaceMode, Namespaced};
use xmlpipe::{ErrorKind, Event, EventStream, ParserConfig};

fn resolve(doc: &str) -> Vec<Event> {
    Namespaced::new(
        EventStream::from_str(doc, &ParserConfig::new()),
        NamespaceMode::Resolve,
    )
    .collect()
}

/// A start tag carries a URI iff a declaration for its prefix (or a
/// default) is in scope at its location, whether declared on the same
/// element or an ancestor.
#[test]
fn uri_iff_declaration_in_scope() {
    let doc = concat!(
        r#"<root xmlns:a="urn:a">"#,
        r#"<a:one/>"#,
        r#"<two xmlns="urn:d"><inner/><a:three/></two>"#,
        r#"<four/>"#,
        r#"</root>"#,
    );
    let events = resolve(doc);
    let starts: Vec<(String, Option<String>)> = events
        .iter()
        .filter_map(|e| match e {
            Event::StartElement { name, .. } => {
                Some((name.local().to_string(), name.uri().map(str::to_string)))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        starts,
        vec![
            ("root".to_string(), None),
            ("one".to_string(), Some("urn:a".to_string())),
            ("two".to_string(), Some("urn:d".to_string())),
            ("inner".to_string(), Some("urn:d".to_string())),
            ("three".to_string(), Some("urn:a".to_string())),
            ("four".to_string(), None),
        ]
    );
    assert!(!events.iter().any(Event::is_error));
}

/// Scopes pop with their element: a child declaration does not leak to
/// siblings.
#[test]
fn sibling_scopes_are_independent() {
    let doc = r#"<r><a xmlns:p="u"><p:x/></a><p:y/></r>"#;
    let events = resolve(doc);
    let errors: Vec<ErrorKind> = events
        .iter()
        .filter_map(|e| match e {
            Event::Error { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    // `p:y` sits outside the scope that declared `p`.
    assert_eq!(errors, vec![ErrorKind::UndeclaredPrefix]);
}

/// Shadowing: the innermost declaration wins, and unwinds on end tags.
#[test]
fn shadowing_and_unwind() {
    let doc = r#"<r xmlns:p="outer"><m xmlns:p="inner"><p:x/></m><p:x/></r>"#;
    let events = resolve(doc);
    let uris: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::StartElement { name, .. } if name.local() == "x" => {
                name.uri().map(str::to_string)
            }
            _ => None,
        })
        .collect();
    assert_eq!(uris, vec!["inner".to_string(), "outer".to_string()]);
}

/// Validate mode reports problems without rewriting names.
#[test]
fn validate_mode_leaves_names_alone() {
    let events: Vec<Event> = Namespaced::new(
        EventStream::from_str(r#"<a xmlns="u"><b/></a>"#, &ParserConfig::new()),
        NamespaceMode::Validate,
    )
    .collect();
    for ev in &events {
        if let Event::StartElement { name, .. } = ev {
            assert_eq!(name.uri(), None);
        }
    }
}
