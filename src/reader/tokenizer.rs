//! The resumable tokenizer state machine.
//!
//! The tokenizer consumes line-normalized UTF-8 bytes and queues [`Event`]s.
//! All state is explicit (the current mode, the partial-token accumulators
//! and the location trio live in the struct), so the machine can suspend
//! between any two bytes: when a chunk runs out mid-token, `feed` simply
//! returns, and the next `feed` resumes exactly where it left off. Up to
//! three bytes of an incomplete UTF-8 scalar are carried across the
//! boundary.
//!
//! Failures are stream events, never panics or `Err` returns: a lexical
//! error queues an [`Event::Error`] and the machine resynchronizes at the
//! next `<`; a fatal encoding error queues the error followed by
//! `EndDocument` and the machine stops consuming.

use std::collections::VecDeque;

use crate::chars::{is_name_char, is_name_start_char, is_whitespace_char, Edition};
use crate::errors::ErrorKind;
use crate::events::{Attribute, Event, Location, Name};

/// Tokenizer modes. Sub-token progress (literal match counters, trailing
/// dash/bracket runs, quote characters) is kept in dedicated fields so the
/// mode itself stays a plain tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
    /// Outside markup, accumulating character data.
    TopLevel,
    /// Seen `<`.
    TagOpen,
    /// Seen `<!`.
    Bang,
    /// Seen `<!-`, the second `-` must follow.
    CommentOpen,
    /// Inside `<!--`.
    Comment,
    /// Matching the `CDATA[` of `<![CDATA[`.
    CDataOpen,
    /// Inside `<![CDATA[`.
    CData,
    /// Matching the `OCTYPE` of `<!DOCTYPE`.
    DoctypeOpen,
    /// Inside `<!DOCTYPE`, scanning for the balancing `>`.
    Doctype,
    /// Seen `<?`, reading the target name.
    PiTarget,
    /// Whitespace between a PI target and its data.
    PiSpace,
    /// PI data, up to `?>`.
    PiData,
    /// Seen `?` inside a PI.
    PiQuestion,
    /// Seen `?` inside the XML declaration.
    DeclQuestion,
    /// Reading an element name after `<`.
    TagName,
    /// Inside a start tag, between attributes.
    InTag,
    /// Reading an attribute name.
    AttrName,
    /// After an attribute name, awaiting `=`.
    AfterAttrName,
    /// After `=`, awaiting the opening quote.
    BeforeAttrValue,
    /// Inside a quoted attribute value.
    AttrValue,
    /// Seen `/` inside a start tag.
    SlashSeen,
    /// Seen `</`, reading the element name.
    EndTagName,
    /// After an end-tag name, whitespace until `>`.
    EndTagSpace,
    /// Discarding input until the next `<` after a recoverable error.
    Recover,
}

enum Step {
    Pending,
    Char(char, usize),
    Invalid,
}

const CDATA_OPEN: &[u8] = b"CDATA[";
const DOCTYPE_OPEN: &[u8] = b"OCTYPE";

pub(crate) struct Tokenizer {
    mode: Mode,
    edition: Edition,
    track_whitespace: bool,

    /// Position of the next byte to consume.
    loc: Location,
    /// Position of the `<` (or first byte) of the token in progress.
    event_loc: Location,
    /// Position of the first byte of the pending text run.
    text_loc: Location,

    pending: VecDeque<Event>,

    /// Character-data accumulator, reused as the content scratch for
    /// comments, CDATA, DOCTYPE and PI data (text is always flushed before
    /// markup starts).
    text: String,
    name: String,
    attrs: Vec<Attribute>,
    attr_name: String,
    attr_value: String,
    quote: char,
    /// Progress through `CDATA[` / `OCTYPE`.
    matched: usize,
    /// Uncommitted trailing `-` run inside a comment (capped at 2).
    dashes: u8,
    /// Uncommitted trailing `]` run inside CDATA (capped at 2).
    brackets: u8,
    /// `<`/`>` balance inside DOCTYPE.
    depth: i32,
    /// Quote currently open inside DOCTYPE, if any.
    dt_quote: Option<char>,
    in_prolog: bool,

    /// Incomplete UTF-8 scalar carried across a chunk boundary.
    carry: [u8; 4],
    carry_len: usize,
    carry_need: usize,

    finished: bool,
}

impl Tokenizer {
    pub(crate) fn new(edition: Edition, track_whitespace: bool) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(Event::StartDocument);
        Tokenizer {
            mode: Mode::TopLevel,
            edition,
            track_whitespace,
            loc: Location::start(),
            event_loc: Location::start(),
            text_loc: Location::start(),
            pending,
            text: String::new(),
            name: String::new(),
            attrs: Vec::new(),
            attr_name: String::new(),
            attr_value: String::new(),
            quote: '"',
            matched: 0,
            dashes: 0,
            brackets: 0,
            depth: 0,
            dt_quote: None,
            in_prolog: false,
            carry: [0; 4],
            carry_len: 0,
            carry_need: 0,
            finished: false,
        }
    }

    /// Next queued event, if any.
    pub(crate) fn next_event(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    /// Position of the next byte the tokenizer will consume.
    pub(crate) fn location(&self) -> Location {
        self.loc
    }

    /// Consume one chunk. Suspends wherever the chunk ends.
    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while !rest.is_empty() {
            if self.finished {
                return;
            }
            // Fast path: scan character data in bulk up to the next `<`.
            if self.mode == Mode::TopLevel && self.carry_len == 0 {
                let (text_len, found_lt) = match memchr::memchr(b'<', rest) {
                    Some(i) => (i, true),
                    None => (rest.len(), false),
                };
                if text_len > 0 {
                    self.take_text(&rest[..text_len], !found_lt);
                    if self.finished {
                        return;
                    }
                }
                rest = &rest[text_len..];
                if found_lt {
                    self.flush_text();
                    self.event_loc = self.loc;
                    self.mode = Mode::TagOpen;
                    self.loc.advance(1);
                    rest = &rest[1..];
                }
                continue;
            }
            let b = rest[0];
            rest = &rest[1..];
            match self.decode_step(b) {
                Step::Pending => {}
                Step::Char(c, len) => self.consume_char(c, len),
                Step::Invalid => {
                    self.fail(ErrorKind::InvalidEncoding, "invalid UTF-8 sequence".into());
                    return;
                }
            }
        }
    }

    /// Signal end of input. Flushes pending text, reports an unterminated
    /// token, and queues the closing `EndDocument`.
    pub(crate) fn finish(&mut self) {
        if self.finished {
            return;
        }
        if self.carry_len > 0 {
            self.fail(
                ErrorKind::IncompleteEncoding,
                "incomplete UTF-8 sequence at end of input".into(),
            );
            return;
        }
        match self.mode {
            Mode::TopLevel => self.flush_text(),
            Mode::Recover => {}
            _ => {
                let what = self.unfinished_construct();
                self.pending.push_back(Event::Error {
                    location: self.event_loc,
                    kind: ErrorKind::UnexpectedEof,
                    message: format!("unclosed {}", what),
                });
            }
        }
        self.pending.push_back(Event::EndDocument);
        self.finished = true;
    }

    /// Report a fatal error: the error event, then `EndDocument`, then
    /// silence.
    pub(crate) fn fail(&mut self, kind: ErrorKind, message: String) {
        if self.finished {
            return;
        }
        self.pending.push_back(Event::Error { location: self.loc, kind, message });
        self.pending.push_back(Event::EndDocument);
        self.finished = true;
    }

    fn unfinished_construct(&self) -> &'static str {
        match self.mode {
            Mode::Comment | Mode::CommentOpen => "comment",
            Mode::CData | Mode::CDataOpen => "CDATA section",
            Mode::Doctype | Mode::DoctypeOpen => "DOCTYPE declaration",
            Mode::PiTarget | Mode::PiSpace | Mode::PiData | Mode::PiQuestion => {
                "processing instruction"
            }
            Mode::DeclQuestion => "XML declaration",
            Mode::EndTagName | Mode::EndTagSpace => "end tag",
            _ => "start tag",
        }
    }

    // -- incremental UTF-8 ------------------------------------------------

    fn decode_step(&mut self, b: u8) -> Step {
        if self.carry_len == 0 {
            if b < 0x80 {
                return Step::Char(b as char, 1);
            }
            let need = utf8_len(b);
            if need == 0 {
                return Step::Invalid;
            }
            self.carry[0] = b;
            self.carry_len = 1;
            self.carry_need = need;
            return Step::Pending;
        }
        if b & 0xC0 != 0x80 {
            return Step::Invalid;
        }
        self.carry[self.carry_len] = b;
        self.carry_len += 1;
        if self.carry_len < self.carry_need {
            return Step::Pending;
        }
        let len = self.carry_need;
        self.carry_len = 0;
        match std::str::from_utf8(&self.carry[..len]) {
            Ok(s) => match s.chars().next() {
                Some(c) => Step::Char(c, len),
                None => Step::Invalid,
            },
            // Overlong or surrogate encodings.
            Err(_) => Step::Invalid,
        }
    }

    /// Append a bulk run of character data, validating UTF-8 and updating
    /// the location per LF. `chunk_end` tells whether an incomplete scalar
    /// at the tail may be carried (true) or is an outright error (false,
    /// since an ASCII `<` follows it).
    fn take_text(&mut self, bytes: &[u8], chunk_end: bool) {
        let valid_len = match std::str::from_utf8(bytes) {
            Ok(_) => bytes.len(),
            Err(e) => {
                if e.error_len().is_some() || !chunk_end {
                    self.fail(ErrorKind::InvalidEncoding, "invalid UTF-8 sequence".into());
                    return;
                }
                e.valid_up_to()
            }
        };
        let (valid, tail) = bytes.split_at(valid_len);
        if !valid.is_empty() {
            if self.text.is_empty() {
                self.text_loc = self.loc;
            }
            // from_utf8 above validated this prefix.
            if let Ok(s) = std::str::from_utf8(valid) {
                self.text.push_str(s);
            }
            let start = self.loc.offset;
            let mut newlines = 0u64;
            let mut last_lf = 0;
            for i in memchr::memchr_iter(b'\n', valid) {
                newlines += 1;
                last_lf = i;
            }
            self.loc.offset = start + valid.len();
            if newlines > 0 {
                self.loc.line += newlines;
                self.loc.line_start = start + last_lf + 1;
            }
        }
        if !tail.is_empty() {
            self.carry[..tail.len()].copy_from_slice(tail);
            self.carry_len = tail.len();
            self.carry_need = utf8_len(tail[0]);
        }
    }

    // -- dispatch ---------------------------------------------------------

    fn consume_char(&mut self, c: char, len: usize) {
        match self.mode {
            Mode::TopLevel => self.top_level(c),
            Mode::TagOpen => self.tag_open(c),
            Mode::Bang => self.bang(c),
            Mode::CommentOpen => self.comment_open(c),
            Mode::Comment => self.comment(c),
            Mode::CDataOpen => self.literal_open(c, CDATA_OPEN),
            Mode::CData => self.cdata(c),
            Mode::DoctypeOpen => self.literal_open(c, DOCTYPE_OPEN),
            Mode::Doctype => self.doctype(c),
            Mode::PiTarget => self.pi_target(c),
            Mode::PiSpace => self.pi_space(c),
            Mode::PiData => self.pi_data(c),
            Mode::PiQuestion => self.pi_question(c),
            Mode::DeclQuestion => self.decl_question(c),
            Mode::TagName => self.tag_name(c),
            Mode::InTag => self.in_tag(c),
            Mode::AttrName => self.attr_name(c),
            Mode::AfterAttrName => self.after_attr_name(c),
            Mode::BeforeAttrValue => self.before_attr_value(c),
            Mode::AttrValue => self.attr_value(c),
            Mode::SlashSeen => self.slash_seen(c),
            Mode::EndTagName => self.end_tag_name(c),
            Mode::EndTagSpace => self.end_tag_space(c),
            Mode::Recover => self.recover(c),
        }
        if !self.finished {
            if c == '\n' {
                self.loc.newline();
            } else {
                self.loc.advance(len);
            }
        }
    }

    /// Recoverable error: queue the event and skip to the next `<`.
    fn error_recover(&mut self, kind: ErrorKind, message: String) {
        self.pending.push_back(Event::Error { location: self.loc, kind, message });
        self.text.clear();
        self.in_prolog = false;
        self.mode = Mode::Recover;
    }

    /// Emit the pending text run. With whitespace tracking on, leading and
    /// trailing whitespace split off as `Space` events so the `Characters`
    /// event is located at its first non-whitespace byte.
    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let start = self.text_loc;
        if !self.track_whitespace {
            self.pending.push_back(Event::Characters { location: start, text });
            return;
        }
        let head = match text.find(|c| !is_whitespace_char(c)) {
            None => {
                self.pending.push_back(Event::Space { location: start, text });
                return;
            }
            Some(i) => i,
        };
        let tail = match text.rfind(|c: char| !is_whitespace_char(c)) {
            Some(p) => p + text[p..].chars().next().map_or(1, char::len_utf8),
            None => text.len(),
        };
        let mid_loc = advance_over(start, &text[..head]);
        if head > 0 {
            self.pending.push_back(Event::Space {
                location: start,
                text: text[..head].to_string(),
            });
        }
        self.pending.push_back(Event::Characters {
            location: mid_loc,
            text: text[head..tail].to_string(),
        });
        if tail < text.len() {
            self.pending.push_back(Event::Space {
                location: advance_over(mid_loc, &text[head..tail]),
                text: text[tail..].to_string(),
            });
        }
    }

    fn top_level(&mut self, c: char) {
        if c == '<' {
            self.flush_text();
            self.event_loc = self.loc;
            self.mode = Mode::TagOpen;
        } else {
            if self.text.is_empty() {
                self.text_loc = self.loc;
            }
            self.text.push(c);
        }
    }

    fn tag_open(&mut self, c: char) {
        match c {
            '/' => {
                self.name.clear();
                self.mode = Mode::EndTagName;
            }
            '?' => {
                self.name.clear();
                self.mode = Mode::PiTarget;
            }
            '!' => self.mode = Mode::Bang,
            _ if is_name_start_char(c, self.edition) => {
                self.name.clear();
                self.name.push(c);
                self.attrs.clear();
                self.mode = Mode::TagName;
            }
            _ => self.error_recover(
                ErrorKind::InvalidName,
                format!("expected element name after '<', found {:?}", c),
            ),
        }
    }

    fn bang(&mut self, c: char) {
        match c {
            '-' => self.mode = Mode::CommentOpen,
            '[' => {
                self.matched = 0;
                self.mode = Mode::CDataOpen;
            }
            'D' => {
                self.matched = 0;
                self.mode = Mode::DoctypeOpen;
            }
            _ => self.error_recover(
                ErrorKind::InvalidDeclaration,
                "expected comment, CDATA section or DOCTYPE after '<!'".into(),
            ),
        }
    }

    fn comment_open(&mut self, c: char) {
        if c == '-' {
            self.text.clear();
            self.dashes = 0;
            self.mode = Mode::Comment;
        } else {
            self.error_recover(ErrorKind::InvalidComment, "expected '<!--'".into());
        }
    }

    fn comment(&mut self, c: char) {
        match c {
            '-' => {
                if self.dashes < 2 {
                    self.dashes += 1;
                } else {
                    self.text.push('-');
                }
            }
            '>' if self.dashes >= 2 => {
                self.dashes = 0;
                let ev = Event::Comment {
                    location: self.event_loc,
                    text: std::mem::take(&mut self.text),
                };
                self.pending.push_back(ev);
                self.mode = Mode::TopLevel;
            }
            _ => {
                for _ in 0..self.dashes {
                    self.text.push('-');
                }
                self.dashes = 0;
                self.text.push(c);
            }
        }
    }

    /// Shared matcher for the fixed `CDATA[` / `OCTYPE` literals.
    fn literal_open(&mut self, c: char, literal: &'static [u8]) {
        if c == literal[self.matched] as char {
            self.matched += 1;
            if self.matched == literal.len() {
                self.text.clear();
                if literal == CDATA_OPEN {
                    self.brackets = 0;
                    self.mode = Mode::CData;
                } else {
                    self.depth = 1;
                    self.dt_quote = None;
                    self.mode = Mode::Doctype;
                }
            }
        } else if literal == CDATA_OPEN {
            self.error_recover(ErrorKind::InvalidCData, "expected '<![CDATA['".into());
        } else {
            self.error_recover(ErrorKind::InvalidDeclaration, "expected '<!DOCTYPE'".into());
        }
    }

    fn cdata(&mut self, c: char) {
        match c {
            ']' => {
                if self.brackets < 2 {
                    self.brackets += 1;
                } else {
                    self.text.push(']');
                }
            }
            '>' if self.brackets >= 2 => {
                self.brackets = 0;
                let ev = Event::CData {
                    location: self.event_loc,
                    text: std::mem::take(&mut self.text),
                };
                self.pending.push_back(ev);
                self.mode = Mode::TopLevel;
            }
            _ => {
                for _ in 0..self.brackets {
                    self.text.push(']');
                }
                self.brackets = 0;
                self.text.push(c);
            }
        }
    }

    fn doctype(&mut self, c: char) {
        if let Some(q) = self.dt_quote {
            self.text.push(c);
            if c == q {
                self.dt_quote = None;
            }
            return;
        }
        match c {
            '"' | '\'' => {
                self.dt_quote = Some(c);
                self.text.push(c);
            }
            '<' => {
                self.depth += 1;
                self.text.push(c);
            }
            '>' => {
                self.depth -= 1;
                if self.depth == 0 {
                    let ev = Event::DocType {
                        location: self.event_loc,
                        text: std::mem::take(&mut self.text).trim().to_string(),
                    };
                    self.pending.push_back(ev);
                    self.mode = Mode::TopLevel;
                } else {
                    self.text.push('>');
                }
            }
            _ => self.text.push(c),
        }
    }

    fn pi_target(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {
                self.text.clear();
                if self.name == "xml" {
                    self.in_prolog = true;
                    self.attrs.clear();
                    self.mode = Mode::InTag;
                } else {
                    self.mode = Mode::PiSpace;
                }
            }
            '?' => {
                self.text.clear();
                if self.name == "xml" {
                    self.in_prolog = true;
                    self.attrs.clear();
                    self.mode = Mode::DeclQuestion;
                } else {
                    self.mode = Mode::PiQuestion;
                }
            }
            // Target validity (empty target, reserved `xml`) is the PI
            // validator's concern; collect liberally here.
            _ => self.name.push(c),
        }
    }

    fn pi_space(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {}
            '?' => self.mode = Mode::PiQuestion,
            _ => {
                self.text.push(c);
                self.mode = Mode::PiData;
            }
        }
    }

    fn pi_data(&mut self, c: char) {
        if c == '?' {
            self.mode = Mode::PiQuestion;
        } else {
            self.text.push(c);
        }
    }

    fn pi_question(&mut self, c: char) {
        match c {
            '>' => {
                let data = if self.text.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.text))
                };
                let ev = Event::ProcessingInstruction {
                    location: self.event_loc,
                    target: self.name.clone(),
                    data,
                };
                self.pending.push_back(ev);
                self.mode = Mode::TopLevel;
            }
            '?' => self.text.push('?'),
            _ => {
                self.text.push('?');
                self.text.push(c);
                self.mode = Mode::PiData;
            }
        }
    }

    fn decl_question(&mut self, c: char) {
        if c == '>' {
            let ev = Event::Prolog {
                location: self.event_loc,
                target: "xml".to_string(),
                attributes: std::mem::take(&mut self.attrs),
            };
            self.pending.push_back(ev);
            self.in_prolog = false;
            self.mode = Mode::TopLevel;
        } else {
            self.error_recover(ErrorKind::InvalidDeclaration, "expected '?>'".into());
        }
    }

    fn finish_start_tag(&mut self, self_closing: bool) {
        let name = std::mem::take(&mut self.name);
        let ev = Event::StartElement {
            location: self.event_loc,
            name: Name::new(name.clone()),
            attributes: std::mem::take(&mut self.attrs),
        };
        self.pending.push_back(ev);
        if self_closing {
            self.pending.push_back(Event::EndElement {
                location: self.event_loc,
                name: Name::new(name),
            });
        }
        self.mode = Mode::TopLevel;
    }

    fn tag_name(&mut self, c: char) {
        match c {
            _ if is_name_char(c, self.edition) => self.name.push(c),
            _ if is_whitespace_char(c) => self.mode = Mode::InTag,
            '>' => self.finish_start_tag(false),
            '/' => self.mode = Mode::SlashSeen,
            _ => self.error_recover(
                ErrorKind::InvalidName,
                format!("invalid character {:?} in element name", c),
            ),
        }
    }

    fn in_tag(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {}
            '>' if self.in_prolog => {
                self.error_recover(ErrorKind::InvalidDeclaration, "expected '?>'".into())
            }
            '>' => self.finish_start_tag(false),
            '/' if !self.in_prolog => self.mode = Mode::SlashSeen,
            '?' if self.in_prolog => self.mode = Mode::DeclQuestion,
            _ if is_name_start_char(c, self.edition) => {
                self.attr_name.clear();
                self.attr_name.push(c);
                self.mode = Mode::AttrName;
            }
            _ => self.error_recover(
                ErrorKind::InvalidName,
                format!("expected attribute name, found {:?}", c),
            ),
        }
    }

    fn attr_name(&mut self, c: char) {
        match c {
            _ if is_name_char(c, self.edition) => self.attr_name.push(c),
            '=' => self.mode = Mode::BeforeAttrValue,
            _ if is_whitespace_char(c) => self.mode = Mode::AfterAttrName,
            _ => self.error_recover(
                ErrorKind::InvalidName,
                format!("invalid character {:?} in attribute name", c),
            ),
        }
    }

    fn after_attr_name(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {}
            '=' => self.mode = Mode::BeforeAttrValue,
            _ => self.error_recover(
                ErrorKind::InvalidQuote,
                format!("expected '=' after attribute name, found {:?}", c),
            ),
        }
    }

    fn before_attr_value(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {}
            '"' | '\'' => {
                self.quote = c;
                self.attr_value.clear();
                self.mode = Mode::AttrValue;
            }
            _ => self.error_recover(
                ErrorKind::InvalidQuote,
                "attribute value must be quoted".into(),
            ),
        }
    }

    fn attr_value(&mut self, c: char) {
        if c == self.quote {
            let attr = Attribute {
                name: Name::new(std::mem::take(&mut self.attr_name)),
                value: std::mem::take(&mut self.attr_value),
            };
            self.attrs.push(attr);
            self.mode = Mode::InTag;
        } else {
            // `<` and `&` pass through; dedicated validators and the
            // entity resolver deal with them.
            self.attr_value.push(c);
        }
    }

    fn slash_seen(&mut self, c: char) {
        if c == '>' {
            self.finish_start_tag(true);
        } else {
            self.error_recover(
                ErrorKind::IllegalChar,
                format!("expected '>' after '/', found {:?}", c),
            );
        }
    }

    fn end_tag_name(&mut self, c: char) {
        if self.name.is_empty() {
            if is_name_start_char(c, self.edition) {
                self.name.push(c);
            } else {
                self.error_recover(
                    ErrorKind::InvalidName,
                    format!("expected element name after '</', found {:?}", c),
                );
            }
            return;
        }
        match c {
            _ if is_name_char(c, self.edition) => self.name.push(c),
            _ if is_whitespace_char(c) => self.mode = Mode::EndTagSpace,
            '>' => self.finish_end_tag(),
            _ => self.error_recover(
                ErrorKind::InvalidName,
                format!("invalid character {:?} in end tag", c),
            ),
        }
    }

    fn end_tag_space(&mut self, c: char) {
        match c {
            _ if is_whitespace_char(c) => {}
            '>' => self.finish_end_tag(),
            _ => self.error_recover(
                ErrorKind::InvalidName,
                "expected '>' to close end tag".into(),
            ),
        }
    }

    fn finish_end_tag(&mut self) {
        let ev = Event::EndElement {
            location: self.event_loc,
            name: Name::new(std::mem::take(&mut self.name)),
        };
        self.pending.push_back(ev);
        self.mode = Mode::TopLevel;
    }

    fn recover(&mut self, c: char) {
        if c == '<' {
            self.event_loc = self.loc;
            self.mode = Mode::TagOpen;
        }
    }
}

fn advance_over(mut loc: Location, s: &str) -> Location {
    for b in s.bytes() {
        if b == b'\n' {
            loc.newline();
        } else {
            loc.advance(1);
        }
    }
    loc
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(input: &str) -> Vec<Event> {
        let mut t = Tokenizer::new(Edition::Fifth, true);
        t.feed(input.as_bytes());
        t.finish();
        let mut out = Vec::new();
        while let Some(ev) = t.next_event() {
            out.push(ev);
        }
        out
    }

    fn loc(line: u64, line_start: usize, offset: usize) -> Location {
        Location { line, line_start, offset }
    }

    #[test]
    fn simple_document() {
        let events = collect(r#"<r><c id="1">x</c></r>"#);
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
    fn self_closing_produces_both_tags() {
        let events = collect("<a/>");
        assert_eq!(
            events,
            vec![
                Event::StartDocument,
                Event::StartElement {
                    location: loc(1, 0, 0),
                    name: Name::new("a"),
                    attributes: vec![],
                },
                Event::EndElement { location: loc(1, 0, 0), name: Name::new("a") },
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn chunk_invariance() {
        let input = r#"<root a="1"><b>text &amp; more</b><!--c--><![CDATA[x]]></root>"#;
        let whole = collect(input);
        let bytes = input.as_bytes();
        for chunk_size in 1..=bytes.len() {
            let mut t = Tokenizer::new(Edition::Fifth, true);
            for chunk in bytes.chunks(chunk_size) {
                t.feed(chunk);
            }
            t.finish();
            let mut events = Vec::new();
            while let Some(ev) = t.next_event() {
                events.push(ev);
            }
            assert_eq!(events, whole, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn multibyte_across_chunks() {
        let input = "<r>\u{1F600}</r>".as_bytes();
        for split in 1..input.len() {
            let mut t = Tokenizer::new(Edition::Fifth, true);
            t.feed(&input[..split]);
            t.feed(&input[split..]);
            t.finish();
            let mut texts = Vec::new();
            while let Some(ev) = t.next_event() {
                if let Event::Characters { text, .. } = ev {
                    texts.push(text);
                }
            }
            assert_eq!(texts, vec!["\u{1F600}".to_string()], "split at {}", split);
        }
    }

    #[test]
    fn whitespace_tracking() {
        let events = collect("<r>\n  <c/>\n</r>");
        let spaces: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Space { .. }))
            .collect();
        assert_eq!(spaces.len(), 2);

        let mut t = Tokenizer::new(Edition::Fifth, false);
        t.feed(b"<r> </r>");
        t.finish();
        let mut saw_characters = false;
        while let Some(ev) = t.next_event() {
            assert!(!matches!(ev, Event::Space { .. }));
            if matches!(ev, Event::Characters { .. }) {
                saw_characters = true;
            }
        }
        assert!(saw_characters);
    }

    #[test]
    fn location_tracks_lines() {
        // `x` sits on line 2, column 1; surrounding whitespace splits off
        // as Space events.
        let events = collect("<r>\n x\n</r>");
        let (chars_loc, chars_text) = events
            .iter()
            .find_map(|e| match e {
                Event::Characters { location, text } => Some((*location, text.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(chars_text, "x");
        assert_eq!(chars_loc.line, 2);
        assert_eq!(chars_loc.column(), 1);
    }

    #[test]
    fn prolog_attributes() {
        let events = collect("<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>");
        match &events[1] {
            Event::Prolog { target, attributes, .. } => {
                assert_eq!(target, "xml");
                assert_eq!(
                    attributes,
                    &vec![
                        Attribute::new("version", "1.0"),
                        Attribute::new("encoding", "UTF-8"),
                    ]
                );
            }
            other => panic!("expected Prolog, got {:?}", other),
        }
    }

    #[test]
    fn processing_instruction() {
        let events = collect("<?pi some data?><r/>");
        assert_eq!(
            events[1],
            Event::ProcessingInstruction {
                location: loc(1, 0, 0),
                target: "pi".into(),
                data: Some("some data".into()),
            }
        );
        let events = collect("<?pi?><r/>");
        assert_eq!(
            events[1],
            Event::ProcessingInstruction {
                location: loc(1, 0, 0),
                target: "pi".into(),
                data: None,
            }
        );
    }

    #[test]
    fn comment_with_inner_dashes() {
        let events = collect("<r><!--a - b--></r>");
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Comment { text, .. } if text == "a - b")));
    }

    #[test]
    fn cdata_with_brackets() {
        let events = collect("<r><![CDATA[a]] ]>b]]></r>");
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::CData { text, .. } if text == "a]] ]>b")));
    }

    #[test]
    fn doctype_with_internal_subset() {
        let events = collect("<!DOCTYPE r [<!ELEMENT r (#PCDATA)>]><r/>");
        match &events[1] {
            Event::DocType { text, .. } => {
                assert_eq!(text, "r [<!ELEMENT r (#PCDATA)>]");
            }
            other => panic!("expected DocType, got {:?}", other),
        }
    }

    #[test]
    fn error_and_resync() {
        let events = collect("<r><1bad></r>");
        let mut iter = events.iter();
        assert!(iter.any(|e| matches!(
            e,
            Event::Error { kind: ErrorKind::InvalidName, .. }
        )));
        // The parser resynchronized and still saw the closing tag.
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::EndElement { name, .. } if name == &"r")));
    }

    #[test]
    fn unclosed_token_reports_eof() {
        let events = collect("<r><!--never closed");
        let n = events.len();
        assert!(matches!(
            events[n - 2],
            Event::Error { kind: ErrorKind::UnexpectedEof, .. }
        ));
        assert_eq!(events[n - 1], Event::EndDocument);
    }

    #[test]
    fn lt_allowed_in_attribute_at_this_layer() {
        let events = collect("<r a=\"x<y\"/>");
        match &events[1] {
            Event::StartElement { attributes, .. } => {
                assert_eq!(attributes[0].value, "x<y");
            }
            other => panic!("expected StartElement, got {:?}", other),
        }
    }

    #[test]
    fn entity_refs_pass_through() {
        let events = collect("<r>&amp;&#60;</r>");
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Characters { text, .. } if text == "&amp;&#60;")));
    }
}
