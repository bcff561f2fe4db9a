//! End-to-end scenarios over the assembled pipeline.

use pretty_assertions::assert_eq;
use xmlpipe::dtd::DtdStage;
use xmlpipe::entity::EntityResolver;
use xmlpipe::namespace::{NamespaceMode, Namespaced};
use xmlpipe::validate::{halt_on_error, well_formed, Policy};
use xmlpipe::{
    Attribute, ErrorKind, Event, EventStream, Location, Name, ParserConfig,
};

fn loc(line: u64, line_start: usize, offset: usize) -> Location {
    Location { line, line_start, offset }
}

fn parse(doc: &str) -> Vec<Event> {
    EventStream::from_str(doc, &ParserConfig::new()).collect()
}

#[test]
fn simple_document_event_sequence() {
    // `<r><c id="1">x</c></r>`
    let events = parse(r#"<r><c id="1">x</c></r>"#);
    assert_eq!(
        events,
        vec![
            Event::StartDocument,
            Event::StartElement {
                location: loc(1, 0, 0),
                name: Name::new("r"),
                attributes: vec![],
            },
            Event::StartElement {
                location: loc(1, 0, 3),
                name: Name::new("c"),
                attributes: vec![Attribute::new("id", "1")],
            },
            Event::Characters { location: loc(1, 0, 13), text: "x".into() },
            Event::EndElement { location: loc(1, 0, 14), name: Name::new("c") },
            Event::EndElement { location: loc(1, 0, 18), name: Name::new("r") },
            Event::EndDocument,
        ]
    );
}

#[test]
fn entity_resolution_coalesces_to_one_text_event() {
    // `<r>&amp;&#60;&#x3e;</r>` resolves to exactly one Characters event.
    let config = ParserConfig::new();
    let events: Vec<Event> = EntityResolver::new(
        EventStream::from_str("<r>&amp;&#60;&#x3e;</r>", &config),
        &config,
    )
    .collect();
    let texts: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::Characters { .. }))
        .collect();
    assert_eq!(texts.len(), 1);
    assert_eq!(
        texts[0],
        &Event::Characters { location: loc(1, 0, 3), text: "&<>".into() }
    );
}

#[test]
fn namespace_resolution_rewrites_names() {
    // `<r xmlns="u"><c/></r>` with namespaces=Resolve.
    let events: Vec<Event> = Namespaced::new(
        EventStream::from_str(r#"<r xmlns="u"><c/></r>"#, &ParserConfig::new()),
        NamespaceMode::Resolve,
    )
    .collect();
    let mut names = Vec::new();
    for ev in &events {
        match ev {
            Event::StartElement { name, .. } | Event::EndElement { name, .. } => {
                names.push((name.uri().map(str::to_string), name.local().to_string()));
            }
            _ => {}
        }
    }
    let u = Some("u".to_string());
    assert_eq!(
        names,
        vec![
            (u.clone(), "r".to_string()),
            (u.clone(), "c".to_string()),
            (u.clone(), "c".to_string()),
            (u, "r".to_string()),
        ]
    );
}

#[test]
fn crlf_input_normalized_and_located() {
    // `"<r>\r\n x\r\n</r>"`: `x` is on line 2 column 1; no `\r` survives.
    let events: Vec<Event> =
        EventStream::from_bytes(b"<r>\r\n x\r\n</r>", &ParserConfig::new()).collect();
    for ev in &events {
        match ev {
            Event::Characters { text, .. }
            | Event::Space { text, .. }
            | Event::Comment { text, .. }
            | Event::CData { text, .. } => assert!(!text.contains('\r')),
            _ => {}
        }
    }
    let x = events
        .iter()
        .find_map(|e| match e {
            Event::Characters { location, text } if text == "x" => Some(*location),
            _ => None,
        })
        .expect("the x character event");
    assert_eq!(x.line, 2);
    assert_eq!(x.column(), 1);
}

#[test]
fn mismatched_close_tag_reported_and_halted() {
    // `<r><c></d></r>`: error at the `</d>` with kind "mismatched close
    // tag"; halt_on_error truncates there.
    let doc = "<r><c></d></r>";
    let checked = well_formed(
        EventStream::from_str(doc, &ParserConfig::new()),
        Policy::Emit,
    );
    let results: Vec<_> = halt_on_error(checked).collect();

    let err = results.last().expect("nonempty stream").as_ref().unwrap_err();
    let (kind, location) = match err {
        xmlpipe::Error::Parse(p) => (p.kind, p.location),
        other => panic!("expected parse error, got {:?}", other),
    };
    assert_eq!(kind, ErrorKind::MismatchedEndTag);
    assert_eq!(location.offset, 6);

    // Nothing after the error.
    assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
}

#[test]
fn split_chunks_match_single_chunk() {
    // `["<roo", "t a=\"", "1\"/>"]` behaves exactly like one buffer.
    let chunks: Vec<Vec<u8>> = vec![b"<roo".to_vec(), b"t a=\"".to_vec(), b"1\"/>".to_vec()];
    let config = ParserConfig::new();
    let split: Vec<Event> = EventStream::new(chunks.into_iter(), &config).collect();
    let whole: Vec<Event> = EventStream::from_str(r#"<root a="1"/>"#, &config).collect();
    assert_eq!(split, whole);

    assert_eq!(
        split,
        vec![
            Event::StartDocument,
            Event::StartElement {
                location: loc(1, 0, 0),
                name: Name::new("root"),
                attributes: vec![Attribute::new("a", "1")],
            },
            Event::EndElement { location: loc(1, 0, 0), name: Name::new("root") },
            Event::EndDocument,
        ]
    );
}

#[test]
fn dtd_entities_flow_through_the_full_pipeline() {
    let doc = concat!(
        r#"<!DOCTYPE note [<!ENTITY sig "<b>me</b>">]>"#,
        r#"<note title="a&#x20;b">hi &sig;</note>"#,
    );
    let config = ParserConfig::new();
    let (stage, dtd) = DtdStage::new(EventStream::from_str(doc, &config));
    let events: Vec<Event> = EntityResolver::with_dtd(stage, &config, dtd).collect();

    assert!(!events.iter().any(Event::is_error));
    let names: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::StartElement { name, attributes, .. } => {
                if name.raw() == "note" {
                    assert_eq!(attributes[0].value, "a b");
                }
                Some(name.raw().to_string())
            }
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["note".to_string(), "b".to_string()]);
}

#[test]
fn pipeline_convenience_is_quiet_on_clean_input() {
    let doc = "<?xml version=\"1.0\"?><a xmlns=\"u\"><b c=\"1\">t</b></a>";
    let config = ParserConfig::new().namespaces(NamespaceMode::Both);
    let events: Vec<Event> = xmlpipe::pipeline(doc, &config).collect();
    assert!(!events.iter().any(Event::is_error));
    assert_eq!(events.first(), Some(&Event::StartDocument));
    assert_eq!(events.last(), Some(&Event::EndDocument));
}

#[test]
fn pipeline_reports_undeclared_entity_references() {
    let doc = r#"<!DOCTYPE r [<!ENTITY known "k">]><r>&known; and &foo;</r>"#;

    let events: Vec<Event> = xmlpipe::pipeline(doc, &ParserConfig::new()).collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error { kind: ErrorKind::UnknownEntity, .. })));
    // The declared reference still resolved.
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Characters { text, .. } if text.starts_with("k and"))));

    // Even when the resolver passes unknown references through silently,
    // the reference validator checks them against the DTD.
    let config = ParserConfig::new().on_unknown_entity(xmlpipe::UnknownEntityMode::Keep);
    let events: Vec<Event> = xmlpipe::pipeline(doc, &config).collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error { kind: ErrorKind::UnknownEntity, .. })));
}
