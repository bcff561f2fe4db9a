//! The pull driver over the resumable tokenizer.
//!
//! [`Reader`] is the push/pull core: feed it byte chunks, drain events.
//! [`EventStream`] adapts an iterator of chunks into an iterator of events,
//! running the input-normalization transforms (encoding detection, line
//! endings) in front of the tokenizer. [`NsReader`] layers the namespace
//! engine on top of a `Reader`.

mod config;
pub(crate) mod tokenizer;

use std::collections::VecDeque;
use std::iter::FusedIterator;

use delegate::delegate;
use encoding_rs::UTF_8;

use crate::errors::ErrorKind;
use crate::events::{Event, Location};
use crate::input::{LineEndings, Utf16ToUtf8};
use crate::namespace::NamespaceTracker;

pub use self::config::ParserConfig;
use self::tokenizer::Tokenizer;

/// A low level chunk-fed XML event reader.
///
/// The reader never performs I/O: the caller supplies byte buffers of any
/// granularity with [`feed`](Reader::feed), signals end of input with
/// [`finish`](Reader::finish), and drains events with
/// [`next_event`](Reader::next_event). Suspension is implicit: when a
/// chunk ends mid-token the tokenizer keeps its state and resumes on the
/// next `feed`.
///
/// Input must already be line-normalized UTF-8; [`EventStream`] bundles
/// the normalization transforms for callers starting from raw bytes.
///
/// # Examples
///
/// ```
/// use xmlpipe::{Event, ParserConfig, Reader};
///
/// let mut reader = Reader::new();
/// reader.feed(b"<greeting>hi");
/// reader.feed(b"</greeting>");
/// reader.finish();
///
/// let mut names = Vec::new();
/// while let Some(event) = reader.next_event() {
///     if let Event::StartElement { name, .. } = &event {
///         names.push(name.raw().to_string());
///     }
/// }
/// assert_eq!(names, ["greeting"]);
/// ```
pub struct Reader {
    tokenizer: Tokenizer,
}

impl Reader {
    /// A reader with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&ParserConfig::new())
    }

    /// A reader using the given configuration.
    pub fn with_config(config: &ParserConfig) -> Self {
        Reader {
            tokenizer: Tokenizer::new(config.edition, config.track_whitespace),
        }
    }

    /// Consume one chunk of line-normalized UTF-8 input.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.tokenizer.feed(chunk);
    }

    /// Signal end of input; queues the trailing events.
    pub fn finish(&mut self) {
        self.tokenizer.finish();
    }

    /// The next queued event, or `None` when the reader needs more input
    /// (or is done after `finish`).
    pub fn next_event(&mut self) -> Option<Event> {
        self.tokenizer.next_event()
    }

    /// Position of the next input byte; useful when reporting errors.
    pub fn location(&self) -> Location {
        self.tokenizer.location()
    }

    pub(crate) fn fail(&mut self, kind: ErrorKind, message: String) {
        self.tokenizer.fail(kind, message);
    }
}

impl Default for Reader {
    fn default() -> Self {
        Reader::new()
    }
}

/// A chunk-fed reader that resolves namespaces as it goes.
///
/// Wraps a [`Reader`] and the namespace engine; events come out with
/// prefixes validated and (in resolve mode) names rewritten to carry their
/// namespace URI, with ambient [`Event::NamespaceContext`] events when
/// tracking is enabled.
pub struct NsReader {
    inner: Reader,
    tracker: NamespaceTracker,
    queue: VecDeque<Event>,
}

impl NsReader {
    pub fn with_config(config: &ParserConfig) -> Self {
        NsReader {
            inner: Reader::with_config(config),
            tracker: NamespaceTracker::new(config.namespaces),
            queue: VecDeque::new(),
        }
    }

    delegate! {
        to self.inner {
            /// Consume one chunk of line-normalized UTF-8 input.
            pub fn feed(&mut self, chunk: &[u8]);
            /// Signal end of input; queues the trailing events.
            pub fn finish(&mut self);
            /// Position of the next input byte.
            pub fn location(&self) -> Location;
        }
    }

    /// Enable ambient `NamespaceContext` events before each start tag;
    /// with `only_changes` the snapshots shrink to deltas.
    pub fn emit_context(mut self, only_changes: bool) -> Self {
        self.tracker = self.tracker.emit_context(only_changes);
        self
    }

    /// The next namespace-processed event.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Some(ev);
            }
            let ev = self.inner.next_event()?;
            self.queue.extend(self.tracker.apply(ev));
        }
    }
}

/// An iterator of events over an iterator of raw byte chunks.
///
/// Runs encoding detection/transcoding and line-ending normalization in
/// front of the tokenizer, so arbitrary chunkings of the same document
/// yield identical event sequences. Fatal transcoding failures surface as
/// an in-stream [`Event::Error`] followed by `EndDocument`.
pub struct EventStream<I> {
    chunks: I,
    reader: Reader,
    line_endings: LineEndings,
    transcoder: Utf16ToUtf8,
    fed_all: bool,
}

impl<I: Iterator<Item = Vec<u8>>> EventStream<I> {
    /// Stream events from raw (possibly UTF-16) chunks, auto-detecting the
    /// encoding from the first bytes.
    pub fn new(chunks: I, config: &ParserConfig) -> Self {
        EventStream {
            chunks,
            reader: Reader::with_config(config),
            line_endings: LineEndings::new(),
            transcoder: Utf16ToUtf8::new(),
            fed_all: false,
        }
    }
}

impl EventStream<std::iter::Once<Vec<u8>>> {
    /// Stream events from one complete buffer.
    pub fn from_bytes(bytes: &[u8], config: &ParserConfig) -> Self {
        Self::new(std::iter::once(bytes.to_vec()), config)
    }

    /// Stream events from a string slice.
    pub fn from_str(input: &str, config: &ParserConfig) -> Self {
        let mut stream = Self::new(std::iter::once(input.as_bytes().to_vec()), config);
        // Rust strings are guaranteed to be UTF-8, so lock the encoding.
        stream.transcoder = Utf16ToUtf8::with_encoding(UTF_8);
        stream
    }
}

impl<I: Iterator<Item = Vec<u8>>> Iterator for EventStream<I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(ev) = self.reader.next_event() {
                return Some(ev);
            }
            if self.fed_all {
                return None;
            }
            match self.chunks.next() {
                Some(chunk) => match self.transcoder.push(&chunk) {
                    Ok(utf8) => {
                        let normalized = self.line_endings.push(&utf8);
                        self.reader.feed(&normalized);
                    }
                    Err(e) => {
                        self.fed_all = true;
                        self.reader.fail(e.kind, e.message);
                    }
                },
                None => {
                    self.fed_all = true;
                    match self.transcoder.finish() {
                        Ok(utf8) => {
                            let mut normalized = self.line_endings.push(&utf8);
                            normalized.extend(self.line_endings.finish());
                            self.reader.feed(&normalized);
                            self.reader.finish();
                        }
                        Err(e) => self.reader.fail(e.kind, e.message),
                    }
                }
            }
        }
    }
}

impl<I: Iterator<Item = Vec<u8>>> FusedIterator for EventStream<I> {}
