//! Serde support for LLSD values.
//!
//! Serialization only. It exists so values can be rendered through
//! `serde_json` for logging and diagnostics: undef becomes null, binary a
//! base64 string, dates their ISO 8601 text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::{Value, format_date};

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Undef => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i32(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Uuid(u) => serializer.collect_str(u),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::Uri(u) => serializer.serialize_str(u),
            Value::Binary(b) => serializer.serialize_str(&STANDARD.encode(b)),
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (key, item) in m {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for item in a {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Map, Value};

    #[test]
    fn renders_as_json() {
        let mut map = Map::new();
        map.insert("status".to_string(), Value::Integer(503));
        map.insert("reason".to_string(), Value::from("busy"));
        map.insert("nothing".to_string(), Value::Undef);
        map.insert("blob".to_string(), Value::Binary(vec![0x00, 0x01, 0xff]));
        let json = serde_json::to_string(&Value::Map(map)).unwrap();
        assert_eq!(
            json,
            r#"{"blob":"AAH/","nothing":null,"reason":"busy","status":503}"#
        );
    }

    #[test]
    fn renders_arrays_and_scalars() {
        let value = Value::Array(vec![
            Value::Boolean(true),
            Value::Real(0.5),
            Value::from("x"),
        ]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[true,0.5,"x"]"#);
    }
}
