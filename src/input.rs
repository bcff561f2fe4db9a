//! Input normalization: line endings and character encodings.
//!
//! Both transforms exist in two forms: a whole-buffer function for callers
//! that hold the complete document, and a chunk-spanning struct that carries
//! the minimal state needed to produce identical output for any chunking of
//! the same bytes.
//!
//! Encoding detection follows the W3C guessing table, restricted to the
//! encodings `encoding_rs` can transcode losslessly to UTF-8: UTF-8 (with or
//! without BOM) and UTF-16 LE/BE.

use std::borrow::Cow;

use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};

use crate::errors::{ErrorKind, ParseError};
use crate::events::Location;

/// Maps `CRLF` and standalone `CR` to `LF` over a complete buffer.
///
/// Returns the input unchanged (borrowed) when it contains no `CR`.
pub fn normalize_line_endings(input: &[u8]) -> Cow<'_, [u8]> {
    if memchr::memchr(b'\r', input).is_none() {
        return Cow::Borrowed(input);
    }
    let mut normalizer = LineEndings::new();
    let mut out = normalizer.push(input);
    out.extend(normalizer.finish());
    Cow::Owned(out)
}

/// Chunk-spanning line-ending normalizer.
///
/// Holds at most one pending `CR`: a `CR` at the end of a chunk is not
/// emitted until the next chunk shows whether a `LF` follows.
#[derive(Clone, Debug, Default)]
pub struct LineEndings {
    pending_cr: bool,
}

impl LineEndings {
    pub fn new() -> Self {
        LineEndings { pending_cr: false }
    }

    /// Normalize one chunk, carrying a trailing `CR` into the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + 1);
        let mut rest = chunk;

        if self.pending_cr && !rest.is_empty() {
            self.pending_cr = false;
            out.push(b'\n');
            if rest[0] == b'\n' {
                rest = &rest[1..];
            }
        }

        while let Some(i) = memchr::memchr(b'\r', rest) {
            out.extend_from_slice(&rest[..i]);
            if i + 1 == rest.len() {
                // CR at the chunk boundary; defer until we see the next byte.
                self.pending_cr = true;
                return out;
            }
            out.push(b'\n');
            rest = if rest[i + 1] == b'\n' { &rest[i + 2..] } else { &rest[i + 1..] };
        }
        out.extend_from_slice(rest);
        out
    }

    /// Flush the pending `CR`, if any, at end of input.
    pub fn finish(&mut self) -> Vec<u8> {
        if std::mem::replace(&mut self.pending_cr, false) {
            vec![b'\n']
        } else {
            Vec::new()
        }
    }
}

/// Automatic encoding detection based on the [recommended algorithm]
/// (https://www.w3.org/TR/xml/#sec-guessing), restricted to the subset this
/// crate transcodes.
///
/// Returns the detected encoding and the number of BOM bytes to strip.
pub fn detect_encoding(bytes: &[u8]) -> (&'static Encoding, usize) {
    match bytes {
        // with BOM
        _ if bytes.starts_with(&[0xFE, 0xFF]) => (UTF_16BE, 2),
        _ if bytes.starts_with(&[0xFF, 0xFE]) => (UTF_16LE, 2),
        _ if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) => (UTF_8, 3),

        // without BOM, sniffing the `<?` of a declaration
        _ if bytes.starts_with(&[0x00, b'<', 0x00, b'?']) => (UTF_16BE, 0),
        _ if bytes.starts_with(&[b'<', 0x00, b'?', 0x00]) => (UTF_16LE, 0),

        _ => (UTF_8, 0),
    }
}

/// Transcodes a complete buffer to UTF-8 with automatic detection.
///
/// UTF-8 input is passed through with the BOM stripped; its validity is
/// checked later, incrementally, by the tokenizer.
pub fn decode_to_utf8(bytes: &[u8]) -> Result<Cow<'_, [u8]>, ParseError> {
    let (encoding, bom_len) = detect_encoding(bytes);
    if encoding == UTF_8 {
        return Ok(Cow::Borrowed(&bytes[bom_len..]));
    }
    let mut transcoder = Utf16ToUtf8::with_encoding(encoding);
    let mut out = transcoder.push(&bytes[bom_len..])?;
    out.extend(transcoder.finish()?);
    Ok(Cow::Owned(out))
}

enum TranscodeState {
    /// Auto-detect; buffers the first bytes until the guessing table can
    /// decide.
    Sniff(Vec<u8>),
    /// UTF-16 transcoding through an incremental decoder, which carries
    /// unpaired bytes of a split code unit or surrogate pair internally.
    Decode(Decoder),
    /// UTF-8 input passed through unchanged.
    PassThrough,
    /// A fatal transcoding error was reported; all further input ignored.
    Failed,
}

/// Chunk-spanning UTF-16 → UTF-8 transcoder with BOM-based detection.
///
/// In auto mode the first call buffers up to four bytes until the guessing
/// table can decide. Explicit mode bypasses detection entirely. Error
/// locations report the byte offset into the *encoded* input.
pub struct Utf16ToUtf8 {
    state: TranscodeState,
    consumed: usize,
}

impl Utf16ToUtf8 {
    /// Auto-detecting transcoder.
    pub fn new() -> Self {
        Utf16ToUtf8 { state: TranscodeState::Sniff(Vec::new()), consumed: 0 }
    }

    /// Explicit-encoding mode; no BOM detection is performed.
    pub fn with_encoding(encoding: &'static Encoding) -> Self {
        let state = if encoding == UTF_8 {
            TranscodeState::PassThrough
        } else {
            TranscodeState::Decode(encoding.new_decoder_without_bom_handling())
        };
        Utf16ToUtf8 { state, consumed: 0 }
    }

    fn error(&self, kind: ErrorKind, message: &str) -> ParseError {
        ParseError {
            kind,
            location: Location { line: 1, line_start: 0, offset: self.consumed },
            message: message.to_string(),
        }
    }

    /// Transcode one chunk of encoded input.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, ParseError> {
        match &mut self.state {
            TranscodeState::Sniff(held) => {
                held.extend_from_slice(chunk);
                if held.len() < 4 {
                    return Ok(Vec::new());
                }
                let held = std::mem::take(held);
                self.commit_detection(&held)
            }
            TranscodeState::PassThrough => {
                self.consumed += chunk.len();
                Ok(chunk.to_vec())
            }
            TranscodeState::Decode(_) => self.decode(chunk, false),
            TranscodeState::Failed => Ok(Vec::new()),
        }
    }

    /// Signal end of input, flushing any held bytes.
    ///
    /// Fails with an incomplete-sequence error if the input ended in the
    /// middle of a code unit or surrogate pair.
    pub fn finish(&mut self) -> Result<Vec<u8>, ParseError> {
        match &mut self.state {
            TranscodeState::Sniff(held) => {
                // Short input; detect on whatever arrived.
                let held = std::mem::take(held);
                let mut out = self.commit_detection(&held)?;
                out.extend(self.finish()?);
                Ok(out)
            }
            TranscodeState::PassThrough | TranscodeState::Failed => Ok(Vec::new()),
            TranscodeState::Decode(_) => self.decode(&[], true),
        }
    }

    fn commit_detection(&mut self, held: &[u8]) -> Result<Vec<u8>, ParseError> {
        let (encoding, bom_len) = detect_encoding(held);
        self.consumed = bom_len;
        if encoding == UTF_8 {
            self.state = TranscodeState::PassThrough;
            self.consumed += held.len() - bom_len;
            Ok(held[bom_len..].to_vec())
        } else {
            self.state =
                TranscodeState::Decode(encoding.new_decoder_without_bom_handling());
            self.decode(&held[bom_len..], false)
        }
    }

    fn decode(&mut self, src: &[u8], last: bool) -> Result<Vec<u8>, ParseError> {
        let mut out;
        let mut total_read = 0;
        let mut total_written = 0;
        let mut malformed = false;
        {
            let decoder = match &mut self.state {
                TranscodeState::Decode(d) => d,
                _ => unreachable!("decode called outside Decode state"),
            };
            let cap = decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .unwrap_or(src.len().saturating_mul(3) + 4);
            out = vec![0u8; cap.max(4)];
            loop {
                let (result, read, written) = decoder.decode_to_utf8_without_replacement(
                    &src[total_read..],
                    &mut out[total_written..],
                    last,
                );
                total_read += read;
                total_written += written;
                match result {
                    DecoderResult::InputEmpty => break,
                    DecoderResult::OutputFull => {
                        out.resize(out.len() * 2, 0);
                    }
                    DecoderResult::Malformed(..) => {
                        malformed = true;
                        break;
                    }
                }
            }
        }
        self.consumed += total_read;
        if malformed {
            self.state = TranscodeState::Failed;
            // A malformation surfaced by the flush call is a code unit or
            // surrogate half cut off by end of input.
            return Err(if last && total_read == src.len() {
                self.error(ErrorKind::IncompleteEncoding, "Incomplete")
            } else {
                self.error(ErrorKind::InvalidEncoding, "invalid UTF-16 sequence")
            });
        }
        out.truncate(total_written);
        Ok(out)
    }
}

impl Default for Utf16ToUtf8 {
    fn default() -> Self {
        Utf16ToUtf8::new()
    }
}
