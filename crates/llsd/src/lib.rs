//! LLSD value model and XML wire codec.
//!
//! LLSD is a schema-flexible interchange format: scalars, maps and arrays
//! with a registered XML encoding carried as `application/llsd+xml`. This
//! crate provides the in-memory [`Value`] tree, the wire codec
//! ([`to_xml`]/[`from_xml`]), and the standard LLSD type-conversion rules.

mod ser;
mod xml;

pub use xml::{ParseError, from_xml, to_xml};

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Registered media type of the XML wire encoding.
pub const MEDIA_TYPE: &str = "application/llsd+xml";

/// Map type used by [`Value::Map`].
///
/// Ordered so that encoding a map is deterministic.
pub type Map = BTreeMap<String, Value>;

/// An LLSD value.
///
/// All standard LLSD types are represented. `Undef` is the default and
/// doubles as the result of failed lookups, matching LLSD semantics where
/// any access on a missing slot yields undef rather than an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undef,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    Uuid(Uuid),
    String(String),
    Date(DateTime<Utc>),
    Uri(String),
    Binary(Vec<u8>),
    Map(Map),
    Array(Vec<Value>),
}

impl Value {
    /// The wire name of this value's type, as it appears in the XML encoding.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undef => "undef",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Uuid(_) => "uuid",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Uri(_) => "uri",
            Value::Binary(_) => "binary",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Borrow the map form, if this is a map.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the array form, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Map lookup. Missing keys and non-map values yield `Undef`.
    pub fn get(&self, key: &str) -> &Value {
        static UNDEF: Value = Value::Undef;
        match self {
            Value::Map(m) => m.get(key).unwrap_or(&UNDEF),
            _ => &UNDEF,
        }
    }

    /// LLSD boolean conversion: zero, empty and undef are false.
    pub fn as_boolean(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => false,
        }
    }

    /// LLSD integer conversion: reals truncate, strings parse, anything
    /// else (including unparsable strings) is 0.
    pub fn as_integer(&self) -> i32 {
        match self {
            Value::Boolean(b) => i32::from(*b),
            Value::Integer(i) => *i,
            Value::Real(r) => *r as i32,
            Value::String(s) => s
                .trim()
                .parse::<i32>()
                .or_else(|_| s.trim().parse::<f64>().map(|r| r as i32))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// LLSD real conversion.
    pub fn as_real(&self) -> f64 {
        match self {
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Integer(i) => f64::from(*i),
            Value::Real(r) => *r,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// LLSD string conversion. Maps, arrays and binary have no string form
    /// and convert to the empty string.
    pub fn as_string(&self) -> String {
        match self {
            Value::Undef => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Uuid(u) => u.to_string(),
            Value::String(s) | Value::Uri(s) => s.clone(),
            Value::Date(d) => format_date(d),
            Value::Binary(_) | Value::Map(_) | Value::Array(_) => String::new(),
        }
    }
}

/// Wire form of a date: RFC 3339 in UTC, `Z` suffix, fractional seconds
/// only when present.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}
