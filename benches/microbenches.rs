use criterion::{self, criterion_group, criterion_main, Criterion};
use xmlpipe::entity::EntityResolver;
use xmlpipe::namespace::{NamespaceMode, Namespaced};
use xmlpipe::{Event, EventStream, ParserConfig};

/// A synthetic feed-like document with nesting, attributes, text and
/// namespaces.
fn sample() -> String {
    let mut doc = String::from("<feed xmlns:m=\"urn:meta\">\n");
    for i in 0..500 {
        doc.push_str(&format!(
            "  <entry id=\"e{i}\" kind=\"note\">\n    <m:title>Entry {i} &amp; friends</m:title>\n    <body>some <b>mixed</b> content {i}</body>\n  </entry>\n",
            i = i
        ));
    }
    doc.push_str("</feed>\n");
    doc
}

/// Benchmarks pulling every event out of the tokenizer, with and without
/// whitespace tracking.
fn read_event(c: &mut Criterion) {
    let doc = sample();
    let mut group = c.benchmark_group("read_event");
    group.bench_function("track_whitespace = true", |b| {
        b.iter(|| {
            let mut count = criterion::black_box(0);
            for ev in EventStream::from_str(&doc, &ParserConfig::new()) {
                if let Event::StartElement { .. } = ev {
                    count += 1;
                }
            }
            assert_eq!(count, 2001, "start tags in the sample document");
        })
    });
    group.bench_function("track_whitespace = false", |b| {
        let config = ParserConfig::new().track_whitespace(false);
        b.iter(|| {
            let mut count = criterion::black_box(0);
            for ev in EventStream::from_str(&doc, &config) {
                if let Event::StartElement { .. } = ev {
                    count += 1;
                }
            }
            assert_eq!(count, 2001, "start tags in the sample document");
        })
    });
    group.finish();
}

/// Benchmarks the namespace stage stacked on the tokenizer.
fn read_namespaced_event(c: &mut Criterion) {
    let doc = sample();
    let mut group = c.benchmark_group("read_namespaced_event");
    group.bench_function("resolve", |b| {
        let config = ParserConfig::new();
        b.iter(|| {
            let mut resolved = criterion::black_box(0);
            let events = Namespaced::new(
                EventStream::from_str(&doc, &config),
                NamespaceMode::Resolve,
            );
            for ev in events {
                if let Event::StartElement { name, .. } = ev {
                    if name.uri().is_some() {
                        resolved += 1;
                    }
                }
            }
            assert_eq!(resolved, 500, "m:title elements in the sample document");
        })
    });
    group.finish();
}

/// Benchmarks entity resolution over entity-heavy character data.
fn resolve_entities(c: &mut Criterion) {
    let mut doc = String::from("<r>");
    for _ in 0..1000 {
        doc.push_str("a &amp; b &lt; c &#62; d ");
    }
    doc.push_str("</r>");

    let mut group = c.benchmark_group("resolve_entities");
    group.bench_function("predefined_and_numeric", |b| {
        let config = ParserConfig::new().track_whitespace(false);
        b.iter(|| {
            let mut bytes = criterion::black_box(0);
            let events =
                EntityResolver::new(EventStream::from_str(&doc, &config), &config);
            for ev in events {
                if let Event::Characters { text, .. } = ev {
                    bytes += text.len();
                }
            }
            assert_eq!(bytes, 14000, "resolved text length");
        })
    });
    group.finish();
}

/// Benchmarks how fast a single event parses.
fn one_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("one_event");
    group.bench_function("start_tag", |b| {
        let src = format!(r#"<hello target="{}">"#, "world".repeat(512 / 5));
        b.iter(|| {
            let mut len = criterion::black_box(0);
            for ev in EventStream::from_str(&src, &ParserConfig::new()) {
                if let Event::StartElement { attributes, .. } = ev {
                    len += attributes[0].value.len();
                }
            }
            assert_eq!(len, 510);
        })
    });
    group.bench_function("comment", |b| {
        let src = format!(r#"<!-- hello "{}" -->"#, "world".repeat(512 / 5));
        b.iter(|| {
            let mut len = criterion::black_box(0);
            for ev in EventStream::from_str(&src, &ParserConfig::new()) {
                if let Event::Comment { text, .. } = ev {
                    len += text.len();
                }
            }
            assert_eq!(len, 520);
        })
    });
    group.bench_function("cdata", |b| {
        let src = format!(r#"<c><![CDATA[hello "{}"]]></c>"#, "world".repeat(512 / 5));
        b.iter(|| {
            let mut len = criterion::black_box(0);
            for ev in EventStream::from_str(&src, &ParserConfig::new()) {
                if let Event::CData { text, .. } = ev {
                    len += text.len();
                }
            }
            assert_eq!(len, 518);
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    read_event,
    read_namespaced_event,
    resolve_entities,
    one_event,
);
criterion_main!(benches);
