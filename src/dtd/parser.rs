//! The DOCTYPE text parser.
//!
//! Parameter entities are handled as a distinct textual pass over each
//! subset that runs before declaration parsing, so declarations assembled
//! from parameter entities parse exactly like literal ones. Declarations
//! from the internal subset shadow external ones for duplicate names.

use std::collections::HashMap;

use crate::chars::{is_name_char, Edition};
use crate::errors::{ErrorKind, ParseError};
use crate::events::Location;

use super::{
    AttrDecl, AttrDefault, AttrType, ContentItem, ContentModel, Dtd, EntityDef, ExternalId,
    Occurrence, Particle, Resolver,
};

pub(super) struct DtdError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DtdError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        DtdError { kind, message: message.into() }
    }

    pub(super) fn into_parse_error(self) -> ParseError {
        ParseError { kind: self.kind, location: Location::start(), message: self.message }
    }
}

/// Parse a DOCTYPE literal (the `DocType` event payload, `<!DOCTYPE` and
/// the final `>` already stripped).
pub(super) fn parse(literal: &str, resolver: Option<&mut Resolver>) -> (Dtd, Vec<DtdError>) {
    let mut errors = Vec::new();
    let mut dtd = Dtd::default();
    let mut scan = Scan::new(literal);

    scan.skip_ws();
    match scan.name() {
        Some(root) => dtd.root_element = root.to_string(),
        None => {
            errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, "DOCTYPE is missing a root element name"));
            return (dtd, errors);
        }
    }

    scan.skip_ws();
    if scan.eat_keyword("SYSTEM") {
        scan.skip_ws();
        match scan.quoted() {
            Ok(sys) => dtd.external_id = Some(ExternalId::System(sys.to_string())),
            Err(e) => errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, e)),
        }
    } else if scan.eat_keyword("PUBLIC") {
        scan.skip_ws();
        let public = scan.quoted();
        scan.skip_ws();
        let system = scan.quoted();
        match (public, system) {
            (Ok(p), Ok(s)) => {
                dtd.external_id = Some(ExternalId::Public(p.to_string(), s.to_string()));
            }
            (Err(e), _) | (_, Err(e)) => {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, e));
            }
        }
    }

    // Internal subset: between `[` and the last `]`.
    scan.skip_ws();
    if scan.eat("[") {
        let rest = scan.rest();
        let subset = match rest.rfind(']') {
            Some(end) => &rest[..end],
            None => {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, "unterminated internal subset"));
                rest
            }
        };
        parse_subset(subset, &mut dtd, &mut errors);
    }

    if let (Some(ext), Some(resolver)) = (dtd.external_id.clone(), resolver) {
        match resolver(ext.system_id(), ext.public_id()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(src) => parse_subset(&src, &mut dtd, &mut errors),
                Err(_) => errors.push(DtdError::new(
                    ErrorKind::ExternalDtdFailed,
                    "external DTD subset is not valid UTF-8",
                )),
            },
            Err(e) => {
                errors.push(DtdError::new(ErrorKind::ExternalDtdFailed, e.to_string()));
            }
        }
    }

    (dtd, errors)
}

/// Parse one subset. Existing declarations win over later ones, which
/// gives the internal subset priority because it is parsed first.
fn parse_subset(src: &str, dtd: &mut Dtd, errors: &mut Vec<DtdError>) {
    let pes = collect_parameter_entities(src);
    let expanded = expand_parameter_entities(src, &pes, errors);

    let mut scan = Scan::new(&expanded);
    loop {
        scan.skip_ws();
        if scan.done() {
            break;
        }
        if scan.eat("<!--") {
            if !scan.skip_past("-->") {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, "unterminated comment in DTD"));
                break;
            }
        } else if scan.eat("<?") {
            if !scan.skip_past("?>") {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, "unterminated processing instruction in DTD"));
                break;
            }
        } else if scan.eat("<!ELEMENT") {
            let decl = scan.until_decl_end();
            if let Err(e) = parse_element_decl(decl, dtd) {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, e));
            }
        } else if scan.eat("<!ATTLIST") {
            let decl = scan.until_decl_end();
            if let Err(e) = parse_attlist_decl(decl, dtd) {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, e));
            }
        } else if scan.eat("<!ENTITY") {
            let decl = scan.until_decl_end();
            if let Err(e) = parse_entity_decl(decl, dtd) {
                errors.push(DtdError::new(ErrorKind::InvalidDtdDecl, e));
            }
        } else if scan.eat("<!NOTATION") {
            scan.until_decl_end();
        } else {
            errors.push(DtdError::new(
                ErrorKind::InvalidDtdDecl,
                format!("unrecognized content in DTD subset near {:?}", scan.excerpt()),
            ));
            scan.until_decl_end();
        }
    }
}

// -- parameter entities ---------------------------------------------------

fn collect_parameter_entities(src: &str) -> HashMap<String, String> {
    let mut pes = HashMap::new();
    let mut scan = Scan::new(src);
    while scan.skip_past("<!ENTITY") {
        scan.skip_ws();
        if !scan.eat("%") {
            scan.until_decl_end();
            continue;
        }
        scan.skip_ws();
        let name = match scan.name() {
            Some(n) => n.to_string(),
            None => {
                scan.until_decl_end();
                continue;
            }
        };
        scan.skip_ws();
        if let Ok(value) = scan.quoted() {
            pes.entry(name).or_insert_with(|| value.to_string());
        }
        scan.until_decl_end();
    }
    pes
}

fn expand_parameter_entities(
    src: &str,
    pes: &HashMap<String, String>,
    errors: &mut Vec<DtdError>,
) -> String {
    let mut text = src.to_string();
    let mut reported: Vec<String> = Vec::new();
    for _round in 0..8 {
        let mut out = String::with_capacity(text.len());
        let mut replaced = false;
        let mut rest = text.as_str();
        while let Some(i) = rest.find('%') {
            out.push_str(&rest[..i]);
            let after = &rest[i + 1..];
            let name_len = name_byte_len(after);
            if name_len > 0 && after[name_len..].starts_with(';') {
                let name = &after[..name_len];
                match pes.get(name) {
                    Some(value) => {
                        out.push_str(value);
                        replaced = true;
                    }
                    None => {
                        if !reported.iter().any(|n| n == name) {
                            reported.push(name.to_string());
                            errors.push(DtdError::new(
                                ErrorKind::UndefinedParameterEntity,
                                format!("parameter entity '%{};' is not defined", name),
                            ));
                        }
                        out.push('%');
                        out.push_str(name);
                        out.push(';');
                    }
                }
                rest = &after[name_len + 1..];
            } else {
                out.push('%');
                rest = after;
            }
        }
        out.push_str(rest);
        text = out;
        if !replaced {
            break;
        }
    }
    text
}

fn name_byte_len(s: &str) -> usize {
    s.char_indices()
        .find(|&(_, c)| !is_name_char(c, Edition::Fifth))
        .map_or(s.len(), |(i, _)| i)
}

// -- declarations ---------------------------------------------------------

fn parse_element_decl(decl: &str, dtd: &mut Dtd) -> Result<(), String> {
    let mut scan = Scan::new(decl);
    scan.skip_ws();
    let name = scan.name().ok_or("ELEMENT declaration is missing a name")?.to_string();
    scan.skip_ws();
    let model = if scan.eat_keyword("EMPTY") {
        ContentModel::Empty
    } else if scan.eat_keyword("ANY") {
        ContentModel::Any
    } else if scan.peek() == Some('(') {
        parse_content_model(&mut scan)?
    } else {
        return Err(format!("invalid content model for element '{}'", name));
    };
    dtd.elements.entry(name).or_insert(model);
    Ok(())
}

fn parse_content_model(scan: &mut Scan<'_>) -> Result<ContentModel, String> {
    // caller guaranteed a '('
    scan.bump();
    scan.skip_ws();
    if scan.eat("#PCDATA") {
        let mut names = Vec::new();
        loop {
            scan.skip_ws();
            if scan.eat("|") {
                scan.skip_ws();
                names.push(
                    scan.name().ok_or("expected a name in mixed content model")?.to_string(),
                );
            } else {
                break;
            }
        }
        scan.skip_ws();
        if !scan.eat(")") {
            return Err("unbalanced parentheses in mixed content model".to_string());
        }
        let occurrence = parse_occurrence(scan);
        if names.is_empty() {
            return Ok(ContentModel::PcData);
        }
        let mut items = vec![ContentItem { particle: Particle::PcData, occurrence: Occurrence::One }];
        items.extend(names.into_iter().map(|n| ContentItem {
            particle: Particle::Element(n),
            occurrence: Occurrence::One,
        }));
        return Ok(ContentModel::Choice(items, occurrence));
    }

    let (items, is_choice) = parse_group_items(scan)?;
    let occurrence = parse_occurrence(scan);
    Ok(if is_choice {
        ContentModel::Choice(items, occurrence)
    } else {
        ContentModel::Sequence(items, occurrence)
    })
}

/// Parse the particles of a group whose `(` has been consumed, up to and
/// including the closing `)`. Returns the items and whether `|` separated
/// them.
fn parse_group_items(scan: &mut Scan<'_>) -> Result<(Vec<ContentItem>, bool), String> {
    let mut items = vec![parse_cp(scan)?];
    let mut separator: Option<char> = None;
    loop {
        scan.skip_ws();
        match scan.peek() {
            Some(')') => {
                scan.bump();
                break;
            }
            Some(c) if c == ',' || c == '|' => {
                match separator {
                    None => separator = Some(c),
                    Some(s) if s != c => {
                        return Err("mixed ',' and '|' separators in one group".to_string());
                    }
                    _ => {}
                }
                scan.bump();
                items.push(parse_cp(scan)?);
            }
            _ => return Err("unbalanced parentheses in content model".to_string()),
        }
    }
    Ok((items, separator == Some('|')))
}

/// One content particle: a name or a nested group, plus its occurrence.
/// Inner groups are parsed recursively, never treated as element names.
fn parse_cp(scan: &mut Scan<'_>) -> Result<ContentItem, String> {
    scan.skip_ws();
    let particle = if scan.peek() == Some('(') {
        scan.bump();
        let (items, is_choice) = parse_group_items(scan)?;
        if is_choice {
            Particle::Choice(items)
        } else {
            Particle::Sequence(items)
        }
    } else {
        Particle::Element(
            scan.name().ok_or("expected a name or group in content model")?.to_string(),
        )
    };
    Ok(ContentItem { particle, occurrence: parse_occurrence(scan) })
}

fn parse_occurrence(scan: &mut Scan<'_>) -> Occurrence {
    match scan.peek() {
        Some('?') => {
            scan.bump();
            Occurrence::Optional
        }
        Some('*') => {
            scan.bump();
            Occurrence::ZeroOrMore
        }
        Some('+') => {
            scan.bump();
            Occurrence::OneOrMore
        }
        _ => Occurrence::One,
    }
}

fn parse_attlist_decl(decl: &str, dtd: &mut Dtd) -> Result<(), String> {
    let mut scan = Scan::new(decl);
    scan.skip_ws();
    let element = scan.name().ok_or("ATTLIST declaration is missing an element name")?.to_string();
    let mut decls: Vec<AttrDecl> = Vec::new();
    loop {
        scan.skip_ws();
        if scan.done() {
            break;
        }
        let name = scan.name().ok_or("expected an attribute name in ATTLIST")?.to_string();
        scan.skip_ws();
        let ty = parse_attr_type(&mut scan)?;
        scan.skip_ws();
        let default = parse_attr_default(&mut scan)?;
        decls.push(AttrDecl { name, ty, default });
    }
    let existing = dtd.attributes.entry(element).or_insert_with(Vec::new);
    for decl in decls {
        if !existing.iter().any(|d| d.name == decl.name) {
            existing.push(decl);
        }
    }
    Ok(())
}

fn parse_attr_type(scan: &mut Scan<'_>) -> Result<AttrType, String> {
    if scan.eat_keyword("CDATA") {
        Ok(AttrType::CData)
    } else if scan.eat_keyword("IDREFS") {
        Ok(AttrType::IdRefs)
    } else if scan.eat_keyword("IDREF") {
        Ok(AttrType::IdRef)
    } else if scan.eat_keyword("ID") {
        Ok(AttrType::Id)
    } else if scan.eat_keyword("ENTITIES") {
        Ok(AttrType::Entities)
    } else if scan.eat_keyword("ENTITY") {
        Ok(AttrType::Entity)
    } else if scan.eat_keyword("NMTOKENS") {
        Ok(AttrType::NmTokens)
    } else if scan.eat_keyword("NMTOKEN") {
        Ok(AttrType::NmToken)
    } else if scan.eat_keyword("NOTATION") {
        scan.skip_ws();
        Ok(AttrType::Notation(parse_name_group(scan)?))
    } else if scan.peek() == Some('(') {
        Ok(AttrType::Enumerated(parse_name_group(scan)?))
    } else {
        Err(format!("invalid attribute type near {:?}", scan.excerpt()))
    }
}

fn parse_name_group(scan: &mut Scan<'_>) -> Result<Vec<String>, String> {
    if !scan.eat("(") {
        return Err("expected '(' to open an enumeration".to_string());
    }
    let mut names = Vec::new();
    loop {
        scan.skip_ws();
        names.push(scan.name().ok_or("expected a token in enumeration")?.to_string());
        scan.skip_ws();
        if scan.eat(")") {
            return Ok(names);
        }
        if !scan.eat("|") {
            return Err("expected '|' or ')' in enumeration".to_string());
        }
    }
}

fn parse_attr_default(scan: &mut Scan<'_>) -> Result<AttrDefault, String> {
    if scan.eat_keyword("#REQUIRED") {
        Ok(AttrDefault::Required)
    } else if scan.eat_keyword("#IMPLIED") {
        Ok(AttrDefault::Implied)
    } else if scan.eat_keyword("#FIXED") {
        scan.skip_ws();
        Ok(AttrDefault::Fixed(scan.quoted()?.to_string()))
    } else {
        Ok(AttrDefault::Value(scan.quoted()?.to_string()))
    }
}

fn parse_entity_decl(decl: &str, dtd: &mut Dtd) -> Result<(), String> {
    let mut scan = Scan::new(decl);
    scan.skip_ws();
    if scan.eat("%") {
        // Parameter entity; already collected by the expansion pass.
        return Ok(());
    }
    let name = scan.name().ok_or("ENTITY declaration is missing a name")?.to_string();
    scan.skip_ws();
    let def = if scan.eat_keyword("SYSTEM") {
        scan.skip_ws();
        EntityDef::External(ExternalId::System(scan.quoted()?.to_string()))
    } else if scan.eat_keyword("PUBLIC") {
        scan.skip_ws();
        let public = scan.quoted()?.to_string();
        scan.skip_ws();
        let system = scan.quoted()?.to_string();
        EntityDef::External(ExternalId::Public(public, system))
    } else {
        EntityDef::Internal(scan.quoted()?.to_string())
    };
    dtd.entities.entry(name).or_insert(def);
    Ok(())
}

// -- scanner --------------------------------------------------------------

struct Scan<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scan<'a> {
    fn new(src: &'a str) -> Self {
        Scan { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn done(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    /// Like `eat`, but refuses when the keyword continues as a name
    /// (`EMPTYx`).
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if !self.rest().starts_with(kw) {
            return false;
        }
        let after = self.rest()[kw.len()..].chars().next();
        match after {
            Some(c) if is_name_char(c, Edition::Fifth) => false,
            _ => {
                self.pos += kw.len();
                true
            }
        }
    }

    fn name(&mut self) -> Option<&'a str> {
        let len = name_byte_len(self.rest());
        if len == 0 {
            return None;
        }
        let name = &self.rest()[..len];
        self.pos += len;
        Some(name)
    }

    fn quoted(&mut self) -> Result<&'a str, String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err("expected a quoted literal".to_string()),
        };
        let body = &self.rest()[1..];
        match body.find(quote) {
            Some(end) => {
                let value = &body[..end];
                self.pos += 1 + end + 1;
                Ok(value)
            }
            None => Err("unterminated quoted literal".to_string()),
        }
    }

    /// Consume up to and including the next `>` outside quotes; returns
    /// the consumed text without the `>`.
    fn until_decl_end(&mut self) -> &'a str {
        let start = self.pos;
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '>' => {
                        let inner = &self.src[start..self.pos];
                        self.bump();
                        return inner;
                    }
                    _ => {}
                },
            }
            self.bump();
        }
        &self.src[start..]
    }

    /// Advance past the next occurrence of `lit`; false if absent.
    fn skip_past(&mut self, lit: &str) -> bool {
        match self.rest().find(lit) {
            Some(i) => {
                self.pos += i + lit.len();
                true
            }
            None => false,
        }
    }

    fn excerpt(&self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .take(12)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        &rest[..end]
    }
}
