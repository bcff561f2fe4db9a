//! Error types.
//!
//! Parse and validation failures travel *inside* the event stream as
//! [`Event::Error`](crate::events::Event::Error) values carrying an
//! [`ErrorKind`] plus a location. The crate-level [`Error`] is reserved for
//! caller-facing hard failures: I/O from a DTD resolver, transcoding entry
//! points, and streams promoted to `Result`s by
//! [`halt_on_error`](crate::validate::halt_on_error).

use std::fmt;
use std::io;

use crate::events::Location;

/// A specialized `Result` type where the error is the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of an in-stream parse or validation error.
///
/// Kinds group into the lexical / structural / attribute / entity /
/// namespace / DTD / encoding families; the grouping is documentation only,
/// the enum is flat so consumers can match on a single tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Lexical
    /// A byte or character that no tokenizer mode accepts at this point.
    IllegalChar,
    /// A name violating the NameStartChar/NameChar productions.
    InvalidName,
    /// Input ended with an unterminated token.
    UnclosedToken,
    /// A processing-instruction target that is missing or reserved.
    InvalidPiTarget,
    /// `--` inside a comment body, or a comment ending in `--->`.
    InvalidComment,
    /// `]]>` misuse or an unterminated CDATA section.
    InvalidCData,
    /// A malformed XML declaration.
    InvalidDeclaration,

    // Structural
    /// An end tag whose name does not match the open element.
    MismatchedEndTag,
    /// An end tag with no element open.
    UnexpectedEndTag,
    /// A second root element.
    MultipleRoots,
    /// Character data outside the root element.
    ContentOutsideRoot,
    /// Input ended while elements were still open.
    UnexpectedEof,

    // Attribute
    /// The same attribute name twice on one element.
    DuplicateAttribute,
    /// A literal `<` inside an attribute value.
    LtInAttributeValue,
    /// A missing or mismatched attribute-value quote (or a missing `=`).
    InvalidQuote,

    // Entity
    /// A named reference that no DTD declares.
    UnknownEntity,
    /// A `&` that does not open a well-formed reference.
    BareAmpersand,
    /// A numeric character reference outside the legal scalar range.
    InvalidCharRef,
    /// Entity expansion exceeded the configured depth or byte budget.
    ExpansionLimit,
    /// An entity whose expansion references itself.
    CyclicEntity,

    // Namespace
    /// A prefix used without an in-scope declaration.
    UndeclaredPrefix,
    /// `xml` or `xmlns` bound to something other than their reserved URIs.
    ReservedNamespace,

    // DTD
    /// A malformed ELEMENT, ATTLIST or ENTITY declaration.
    InvalidDtdDecl,
    /// A `%name;` reference with no matching parameter entity.
    UndefinedParameterEntity,
    /// The caller-supplied external-subset resolver failed.
    ExternalDtdFailed,

    // Encoding
    /// An invalid UTF-8 or UTF-16 byte sequence.
    InvalidEncoding,
    /// Input ended in the middle of a multi-byte sequence.
    IncompleteEncoding,
}

impl ErrorKind {
    /// Whether the stream must stop after reporting this error.
    ///
    /// Encoding failures and exhausted expansion budgets are fatal; every
    /// other kind allows best-effort continuation.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidEncoding | ErrorKind::IncompleteEncoding | ErrorKind::ExpansionLimit
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::IllegalChar => "illegal character",
            ErrorKind::InvalidName => "invalid name",
            ErrorKind::UnclosedToken => "unclosed token",
            ErrorKind::InvalidPiTarget => "invalid processing instruction target",
            ErrorKind::InvalidComment => "invalid comment",
            ErrorKind::InvalidCData => "invalid CDATA section",
            ErrorKind::InvalidDeclaration => "invalid XML declaration",
            ErrorKind::MismatchedEndTag => "mismatched close tag",
            ErrorKind::UnexpectedEndTag => "unexpected close tag",
            ErrorKind::MultipleRoots => "more than one root element",
            ErrorKind::ContentOutsideRoot => "content outside root element",
            ErrorKind::UnexpectedEof => "unexpected end of input",
            ErrorKind::DuplicateAttribute => "duplicate attribute",
            ErrorKind::LtInAttributeValue => "'<' in attribute value",
            ErrorKind::InvalidQuote => "invalid attribute quoting",
            ErrorKind::UnknownEntity => "unknown entity",
            ErrorKind::BareAmpersand => "bare '&'",
            ErrorKind::InvalidCharRef => "invalid character reference",
            ErrorKind::ExpansionLimit => "entity expansion limit exceeded",
            ErrorKind::CyclicEntity => "cyclic entity reference",
            ErrorKind::UndeclaredPrefix => "undeclared namespace prefix",
            ErrorKind::ReservedNamespace => "illegal binding of reserved namespace",
            ErrorKind::InvalidDtdDecl => "malformed DTD declaration",
            ErrorKind::UndefinedParameterEntity => "undefined parameter entity",
            ErrorKind::ExternalDtdFailed => "external DTD subset resolution failed",
            ErrorKind::InvalidEncoding => "invalid byte sequence",
            ErrorKind::IncompleteEncoding => "incomplete byte sequence",
        };
        f.write_str(s)
    }
}

/// An in-stream error promoted to a value: kind, location and diagnostic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where in the logical input it went wrong.
    pub location: Location,
    /// Short human-readable diagnostic.
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.location.line,
            self.location.column(),
            self.kind,
            self.message
        )
    }
}

/// The error type used by this crate's fallible entry points.
#[derive(Debug)]
pub enum Error {
    /// I/O error from a caller-supplied source or resolver.
    Io(io::Error),
    /// A stream error promoted to a hard failure.
    Parse(ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Parse(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}
