//! XML character-class predicates.
//!
//! All predicates are pure functions over Unicode scalar values, backed by
//! `const` range tables. The Name productions exist in two variants: the
//! liberal Fifth Edition ranges (the default) and the table-based Fourth
//! Edition ranges used for conformance testing.

/// Which edition of the XML 1.0 Name productions to apply.
///
/// The Fifth Edition admits almost every non-ASCII scalar into names; the
/// Fourth Edition restricts names to the classic character tables.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Edition {
    /// XML 1.0 Fourth Edition name ranges.
    Fourth,
    /// XML 1.0 Fifth Edition name ranges (default).
    Fifth,
}

impl Default for Edition {
    fn default() -> Self {
        Edition::Fifth
    }
}

/// A function to check whether the byte is a whitespace (blank, new line,
/// carriage return or tab)
#[inline]
pub(crate) fn is_whitespace_byte(b: u8) -> bool {
    match b {
        b' ' | b'\r' | b'\n' | b'\t' => true,
        _ => false,
    }
}

/// Checks whether the character is an XML whitespace (`S` production).
#[inline]
pub fn is_whitespace_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Checks whether the character is allowed in an XML 1.0 document at all
/// (the `Char` production).
///
/// Everything outside these ranges is rejected by the character-legality
/// validator: C0 controls other than tab/LF/CR, surrogate code points
/// (unrepresentable in `char` anyway) and the two trailing noncharacters
/// of the BMP.
#[inline]
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Checks whether the character may start an XML name under the given
/// edition.
#[inline]
pub fn is_name_start_char(c: char, edition: Edition) -> bool {
    match edition {
        Edition::Fifth => is_name_start_5e(c),
        Edition::Fourth => is_name_start_4e(c),
    }
}

/// Checks whether the character may continue an XML name under the given
/// edition.
#[inline]
pub fn is_name_char(c: char, edition: Edition) -> bool {
    match edition {
        Edition::Fifth => is_name_start_5e(c) || is_name_extra_5e(c),
        Edition::Fourth => {
            is_name_start_4e(c)
                || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}')
                || in_table(c, &COMBINING_4E)
                || in_table(c, &EXTENDER_4E)
        }
    }
}

// NameStartChar, Fifth Edition.
#[inline]
fn is_name_start_5e(c: char) -> bool {
    matches!(c,
        ':' | '_'
        | 'A'..='Z' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

// The characters NameChar adds on top of NameStartChar, Fifth Edition.
#[inline]
fn is_name_extra_5e(c: char) -> bool {
    matches!(c,
        '-' | '.' | '0'..='9' | '\u{B7}'
        | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

// NameStartChar, Fourth Edition: Letter | '_' | ':'.
#[inline]
fn is_name_start_4e(c: char) -> bool {
    matches!(c, ':' | '_' | 'A'..='Z' | 'a'..='z') || in_table(c, &LETTER_4E)
}

#[inline]
fn in_table(c: char, table: &[(u32, u32)]) -> bool {
    let cp = c as u32;
    table
        .binary_search_by(|&(lo, hi)| {
            if cp < lo {
                core::cmp::Ordering::Greater
            } else if cp > hi {
                core::cmp::Ordering::Less
            } else {
                core::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

// Fourth Edition `Letter` (BaseChar | Ideographic), merged into sorted
// inclusive ranges. ASCII letters are handled before the table lookup.
const LETTER_4E: [(u32, u32); 68] = [
    (0x00C0, 0x00D6),
    (0x00D8, 0x00F6),
    (0x00F8, 0x0131),
    (0x0134, 0x013E),
    (0x0141, 0x0148),
    (0x014A, 0x017E),
    (0x0180, 0x01C3),
    (0x01CD, 0x01F0),
    (0x01F4, 0x01F5),
    (0x01FA, 0x0217),
    (0x0250, 0x02A8),
    (0x02BB, 0x02C1),
    (0x0386, 0x0386),
    (0x0388, 0x038A),
    (0x038C, 0x038C),
    (0x038E, 0x03A1),
    (0x03A3, 0x03CE),
    (0x03D0, 0x03D6),
    (0x03DA, 0x03DA),
    (0x03DC, 0x03DC),
    (0x03DE, 0x03DE),
    (0x03E0, 0x03E0),
    (0x03E2, 0x03F3),
    (0x0401, 0x040C),
    (0x040E, 0x044F),
    (0x0451, 0x045C),
    (0x045E, 0x0481),
    (0x0490, 0x04C4),
    (0x04C7, 0x04C8),
    (0x04CB, 0x04CC),
    (0x04D0, 0x04EB),
    (0x04EE, 0x04F5),
    (0x04F8, 0x04F9),
    (0x0531, 0x0556),
    (0x0559, 0x0559),
    (0x0561, 0x0586),
    (0x05D0, 0x05EA),
    (0x05F0, 0x05F2),
    (0x0621, 0x063A),
    (0x0641, 0x064A),
    (0x0671, 0x06B7),
    (0x06BA, 0x06BE),
    (0x06C0, 0x06CE),
    (0x06D0, 0x06D3),
    (0x06D5, 0x06D5),
    (0x06E5, 0x06E6),
    (0x0905, 0x0939),
    (0x093D, 0x093D),
    (0x0958, 0x0961),
    (0x0985, 0x098C),
    (0x098F, 0x0990),
    (0x0993, 0x09A8),
    (0x09AA, 0x09B0),
    (0x09B2, 0x09B2),
    (0x09B6, 0x09B9),
    (0x0E01, 0x0E2E),
    (0x0E30, 0x0E30),
    (0x0E32, 0x0E33),
    (0x0E40, 0x0E45),
    (0x10A0, 0x10C5),
    (0x10D0, 0x10F6),
    (0x1100, 0x1159),
    (0x1E00, 0x1E9B),
    (0x1EA0, 0x1EF9),
    (0x3041, 0x3094),
    (0x30A1, 0x30FA),
    (0x3105, 0x312C),
    (0x4E00, 0x9FA5),
];

// Fourth Edition `CombiningChar`, abridged to the contiguous blocks.
const COMBINING_4E: [(u32, u32); 6] = [
    (0x0300, 0x0345),
    (0x0360, 0x0361),
    (0x0483, 0x0486),
    (0x0591, 0x05A1),
    (0x05A3, 0x05B9),
    (0x20D0, 0x20DC),
];

// Fourth Edition `Extender`.
const EXTENDER_4E: [(u32, u32); 8] = [
    (0x00B7, 0x00B7),
    (0x02D0, 0x02D0),
    (0x02D1, 0x02D1),
    (0x0387, 0x0387),
    (0x0640, 0x0640),
    (0x0E46, 0x0E46),
    (0x3005, 0x3005),
    (0x30FC, 0x30FE),
];
