//! A streaming XML 1.0 event pipeline.
//!
//! `xmlpipe` parses bytes into a lazy sequence of [`Event`]s and composes
//! stream-to-stream transforms on top: input normalization (line endings,
//! UTF-16 transcoding), DTD decoding, entity resolution, namespace
//! tracking, well-formedness validation, and serialization back to bytes
//! (plain, pretty-printed, or canonical).
//!
//! The tokenizer is a resumable state machine: input arrives as byte
//! chunks of any size, and parsing suspends and resumes across chunk
//! boundaries with identical results for every chunking. No stage performs
//! I/O or blocks; errors travel inside the stream as [`Event::Error`]
//! values carrying a location.
//!
//! # Examples
//!
//! ```
//! use xmlpipe::{Event, ParserConfig};
//!
//! let mut depth = 0;
//! for event in xmlpipe::pipeline("<cfg><opt name=\"a\"/></cfg>", &ParserConfig::new()) {
//!     match event {
//!         Event::StartElement { name, .. } => {
//!             println!("{:indent$}{}", "", name.raw(), indent = depth * 2);
//!             depth += 1;
//!         }
//!         Event::EndElement { .. } => depth -= 1,
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Transforms are plain iterator adapters, so custom pipelines compose by
//! nesting:
//!
//! ```
//! use xmlpipe::dtd::DtdStage;
//! use xmlpipe::entity::EntityResolver;
//! use xmlpipe::validate::{conformant, halt_on_error, Policy};
//! use xmlpipe::{EventStream, ParserConfig};
//!
//! let config = ParserConfig::new();
//! let stream = EventStream::from_str("<a>&amp;</a>", &config);
//! let (stage, dtd) = DtdStage::new(stream);
//! let resolved = EntityResolver::with_dtd(stage, &config, dtd);
//! let validated = conformant(resolved, Policy::Emit);
//! for event in halt_on_error(validated) {
//!     let event = event.expect("well-formed input");
//!     # let _ = event;
//! }
//! ```

pub mod chars;
pub mod dtd;
pub mod entity;
pub mod errors;
pub mod events;
pub mod input;
pub mod namespace;
pub mod reader;
pub mod validate;
pub mod writer;

pub use crate::chars::Edition;
pub use crate::entity::UnknownEntityMode;
pub use crate::errors::{Error, ErrorKind, ParseError, Result};
pub use crate::events::{Attribute, Event, Location, Name, NamespaceBinding};
pub use crate::namespace::NamespaceMode;
pub use crate::reader::{EventStream, NsReader, ParserConfig, Reader};
pub use crate::validate::Policy;
pub use crate::writer::{Canonicalization, Standalone, WriterConfig};

use crate::dtd::DtdStage;
use crate::entity::EntityResolver;
use crate::namespace::Namespaced;

/// The standard pipeline over a complete string: tokenizer, DTD stage,
/// entity resolver, namespace stage (per `config.namespaces`), and the
/// conformant validator set under `config.on_error`, including the
/// entity-reference check against the document's DTD.
///
/// For chunked input or bespoke stage orders, compose the stages directly
/// as in the crate example.
pub fn pipeline(input: &str, config: &ParserConfig) -> impl Iterator<Item = Event> {
    let stream = EventStream::from_str(input, config);
    let (stage, dtd) = DtdStage::new(stream);
    let resolved = EntityResolver::with_dtd(stage, config, dtd.clone());
    let namespaced: Box<dyn Iterator<Item = Event>> = match config.namespaces {
        NamespaceMode::Off => Box::new(resolved),
        mode => Box::new(Namespaced::new(resolved, mode)),
    };
    validate::conformant_with_dtd(namespaced, config.on_error, dtd)
}
