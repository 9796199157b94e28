//! XML wire codec for LLSD values.
//!
//! The grammar is small and fixed (`<llsd>` wrapping one value; maps as
//! `<key>` / value pairs), so the parser is a hand-written recursive
//! descent over the element stream. Attributes are tolerated and ignored,
//! as are the XML declaration, comments and doctype.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{Map, Value, format_date};

/// Deepest container nesting the parser accepts.
const MAX_DEPTH: usize = 128;

/// Errors produced while decoding an LLSD XML document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is not valid UTF-8")]
    InvalidUtf8,
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("malformed tag")]
    MalformedTag,
    #[error("expected element <{expected}>, found <{found}>")]
    UnexpectedElement { expected: &'static str, found: String },
    #[error("unknown LLSD element <{0}>")]
    UnknownElement(String),
    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedClose { expected: String, found: String },
    #[error("expected <key> inside map, found <{0}>")]
    ExpectedKey(String),
    #[error("containers nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
    #[error("invalid {kind} value '{text}'")]
    InvalidScalar { kind: String, text: String },
    #[error("unknown entity reference '&{0};'")]
    UnknownEntity(String),
    #[error("unterminated entity reference")]
    UnterminatedEntity,
    #[error("invalid character reference")]
    BadCharRef,
    #[error("content after document end")]
    TrailingContent,
}

/// Encode a value as a complete `application/llsd+xml` document.
///
/// Output is compact (no indentation) and deterministic: map keys are
/// written in order.
pub fn to_xml(value: &Value) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version=\"1.0\" ?>");
    out.push_str("<llsd>");
    write_value(&mut out, value);
    out.push_str("</llsd>");
    out
}

/// Decode a complete LLSD XML document.
///
/// Containers nested deeper than 128 levels are rejected with
/// [`ParseError::TooDeep`].
pub fn from_xml(bytes: &[u8]) -> Result<Value, ParseError> {
    let src = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    let mut p = Parser { src, pos: 0 };

    p.skip_misc()?;
    let root = p.read_tag()?;
    if root.name != "llsd" || matches!(root.kind, TagKind::Close) {
        return Err(ParseError::UnexpectedElement {
            expected: "llsd",
            found: root.name.to_string(),
        });
    }
    if matches!(root.kind, TagKind::SelfClose) {
        return p.finish(Value::Undef);
    }

    p.skip_misc()?;
    let save = p.pos;
    if let Ok(tag) = p.read_tag()
        && matches!(tag.kind, TagKind::Close)
        && tag.name == "llsd"
    {
        // <llsd></llsd> carries no value
        return p.finish(Value::Undef);
    }
    p.pos = save;

    let value = p.parse_value(0)?;
    p.skip_misc()?;
    p.expect_close("llsd")?;
    p.finish(value)
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Undef => out.push_str("<undef/>"),
        Value::Boolean(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "true" } else { "false" });
            out.push_str("</boolean>");
        }
        Value::Integer(i) => {
            out.push_str("<integer>");
            out.push_str(&i.to_string());
            out.push_str("</integer>");
        }
        Value::Real(r) => {
            out.push_str("<real>");
            out.push_str(&r.to_string());
            out.push_str("</real>");
        }
        Value::Uuid(u) => {
            out.push_str("<uuid>");
            out.push_str(&u.to_string());
            out.push_str("</uuid>");
        }
        Value::String(s) => {
            out.push_str("<string>");
            push_escaped(out, s);
            out.push_str("</string>");
        }
        Value::Date(d) => {
            out.push_str("<date>");
            out.push_str(&format_date(d));
            out.push_str("</date>");
        }
        Value::Uri(u) => {
            out.push_str("<uri>");
            push_escaped(out, u);
            out.push_str("</uri>");
        }
        Value::Binary(b) => {
            out.push_str("<binary>");
            out.push_str(&STANDARD.encode(b));
            out.push_str("</binary>");
        }
        Value::Map(m) => {
            out.push_str("<map>");
            for (key, item) in m {
                out.push_str("<key>");
                push_escaped(out, key);
                out.push_str("</key>");
                write_value(out, item);
            }
            out.push_str("</map>");
        }
        Value::Array(a) => {
            out.push_str("<array>");
            for item in a {
                write_value(out, item);
            }
            out.push_str("</array>");
        }
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClose,
}

struct Tag<'a> {
    name: &'a str,
    kind: TagKind,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.src.as_bytes().get(self.pos) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Skip whitespace plus the XML constructs we tolerate but do not
    /// interpret: declarations, comments, doctype.
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if let Some(r) = rest.strip_prefix("<?") {
                let end = r.find("?>").ok_or(ParseError::UnexpectedEof)?;
                self.pos += 2 + end + 2;
            } else if let Some(r) = rest.strip_prefix("<!--") {
                let end = r.find("-->").ok_or(ParseError::UnexpectedEof)?;
                self.pos += 4 + end + 3;
            } else if let Some(r) = rest.strip_prefix("<!") {
                let end = r.find('>').ok_or(ParseError::UnexpectedEof)?;
                self.pos += 2 + end + 1;
            } else {
                return Ok(());
            }
        }
    }

    /// Consume trailing misc content and require end of input.
    fn finish(&mut self, value: Value) -> Result<Value, ParseError> {
        self.skip_misc()?;
        if self.at_end() {
            Ok(value)
        } else {
            Err(ParseError::TrailingContent)
        }
    }

    fn read_tag(&mut self) -> Result<Tag<'a>, ParseError> {
        if !self.rest().starts_with('<') {
            return Err(if self.at_end() {
                ParseError::UnexpectedEof
            } else {
                ParseError::MalformedTag
            });
        }
        self.pos += 1;
        let closing = self.rest().starts_with('/');
        if closing {
            self.pos += 1;
        }

        let start = self.pos;
        while let Some(&b) = self.src.as_bytes().get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = &self.src[start..self.pos];
        if name.is_empty() {
            return Err(ParseError::MalformedTag);
        }

        // Skip attributes up to the closing '>', honoring quoted values.
        loop {
            let bytes = self.src.as_bytes();
            match bytes.get(self.pos) {
                None => return Err(ParseError::UnexpectedEof),
                Some(b'>') => {
                    self.pos += 1;
                    let kind = if closing { TagKind::Close } else { TagKind::Open };
                    return Ok(Tag { name, kind });
                }
                Some(b'/') if bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    if closing {
                        return Err(ParseError::MalformedTag);
                    }
                    return Ok(Tag {
                        name,
                        kind: TagKind::SelfClose,
                    });
                }
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    self.pos += 1;
                    let end = self
                        .rest()
                        .find(quote as char)
                        .ok_or(ParseError::UnexpectedEof)?;
                    self.pos += end + 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn expect_close(&mut self, expected: &str) -> Result<(), ParseError> {
        let tag = self.read_tag()?;
        if matches!(tag.kind, TagKind::Close) && tag.name == expected {
            Ok(())
        } else {
            Err(ParseError::MismatchedClose {
                expected: expected.to_string(),
                found: tag.name.to_string(),
            })
        }
    }

    /// Read character data up to the next tag, resolving entity and
    /// character references.
    fn read_text(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(out);
            }
            match rest.find(|c| c == '<' || c == '&') {
                None => {
                    out.push_str(rest);
                    self.pos = self.src.len();
                    return Ok(out);
                }
                Some(idx) => {
                    out.push_str(&rest[..idx]);
                    self.pos += idx;
                    if self.src.as_bytes()[self.pos] == b'<' {
                        return Ok(out);
                    }
                    let after = &self.src[self.pos + 1..];
                    let Some(end) = after.find(';') else {
                        return Err(ParseError::UnterminatedEntity);
                    };
                    out.push(decode_entity(&after[..end])?);
                    self.pos += 1 + end + 1;
                }
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        self.skip_misc()?;
        let tag = self.read_tag()?;
        if matches!(tag.kind, TagKind::Close) {
            return Err(ParseError::UnexpectedClose(tag.name.to_string()));
        }
        let self_closing = matches!(tag.kind, TagKind::SelfClose);

        match tag.name {
            "undef" => {
                if !self_closing {
                    let text = self.read_text()?;
                    self.expect_close("undef")?;
                    if !text.trim().is_empty() {
                        return Err(ParseError::InvalidScalar {
                            kind: "undef".to_string(),
                            text,
                        });
                    }
                }
                Ok(Value::Undef)
            }
            "boolean" | "integer" | "real" | "uuid" | "string" | "date" | "uri" | "binary" => {
                let text = if self_closing {
                    String::new()
                } else {
                    let text = self.read_text()?;
                    self.expect_close(tag.name)?;
                    text
                };
                scalar_value(tag.name, text)
            }
            "map" => {
                let mut map = Map::new();
                if self_closing {
                    return Ok(Value::Map(map));
                }
                loop {
                    self.skip_misc()?;
                    let tag = self.read_tag()?;
                    match (tag.kind, tag.name) {
                        (TagKind::Close, "map") => break,
                        (TagKind::SelfClose, "key") => {
                            let value = self.parse_value(depth + 1)?;
                            map.insert(String::new(), value);
                        }
                        (TagKind::Open, "key") => {
                            let key = self.read_text()?;
                            self.expect_close("key")?;
                            let value = self.parse_value(depth + 1)?;
                            // duplicate keys: last one wins
                            map.insert(key, value);
                        }
                        (_, other) => return Err(ParseError::ExpectedKey(other.to_string())),
                    }
                }
                Ok(Value::Map(map))
            }
            "array" => {
                let mut items = Vec::new();
                if self_closing {
                    return Ok(Value::Array(items));
                }
                loop {
                    self.skip_misc()?;
                    let save = self.pos;
                    let tag = self.read_tag()?;
                    if matches!(tag.kind, TagKind::Close) {
                        if tag.name == "array" {
                            break;
                        }
                        return Err(ParseError::MismatchedClose {
                            expected: "array".to_string(),
                            found: tag.name.to_string(),
                        });
                    }
                    self.pos = save;
                    items.push(self.parse_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            other => Err(ParseError::UnknownElement(other.to_string())),
        }
    }
}

fn scalar_value(kind: &str, text: String) -> Result<Value, ParseError> {
    let invalid = |text: String| ParseError::InvalidScalar {
        kind: kind.to_string(),
        text,
    };
    let trimmed = text.trim();
    let value = match kind {
        // the loose historical reading: "true"/"1" and nothing else
        "boolean" => Value::Boolean(trimmed == "true" || trimmed == "1"),
        "integer" => {
            if trimmed.is_empty() {
                Value::Integer(0)
            } else {
                match trimmed.parse() {
                    Ok(i) => Value::Integer(i),
                    Err(_) => return Err(invalid(text)),
                }
            }
        }
        "real" => {
            if trimmed.is_empty() {
                Value::Real(0.0)
            } else {
                match trimmed.parse() {
                    Ok(r) => Value::Real(r),
                    Err(_) => return Err(invalid(text)),
                }
            }
        }
        "uuid" => {
            if trimmed.is_empty() {
                Value::Uuid(Uuid::nil())
            } else {
                match Uuid::parse_str(trimmed) {
                    Ok(u) => Value::Uuid(u),
                    Err(_) => return Err(invalid(text)),
                }
            }
        }
        "string" => Value::String(text),
        "date" => {
            if trimmed.is_empty() {
                Value::Date(DateTime::UNIX_EPOCH)
            } else {
                match DateTime::parse_from_rfc3339(trimmed) {
                    Ok(d) => Value::Date(d.with_timezone(&Utc)),
                    Err(_) => return Err(invalid(text)),
                }
            }
        }
        "uri" => Value::Uri(text),
        "binary" => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            match STANDARD.decode(compact.as_bytes()) {
                Ok(bytes) => Value::Binary(bytes),
                Err(_) => return Err(invalid(text)),
            }
        }
        _ => unreachable!("caller matched the element name"),
    };
    Ok(value)
}

fn decode_entity(name: &str) -> Result<char, ParseError> {
    match name {
        "amp" => Ok('&'),
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => {
            if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                let code = u32::from_str_radix(hex, 16).map_err(|_| ParseError::BadCharRef)?;
                char::from_u32(code).ok_or(ParseError::BadCharRef)
            } else if let Some(dec) = name.strip_prefix('#') {
                let code: u32 = dec.parse().map_err(|_| ParseError::BadCharRef)?;
                char::from_u32(code).ok_or(ParseError::BadCharRef)
            } else {
                Err(ParseError::UnknownEntity(name.to_string()))
            }
        }
    }
}
