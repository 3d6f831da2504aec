//! Message envelope: the structured mapping carried inside a frame.
//!
//! An envelope is a msgpack map with a mandatory integer `code` field and
//! free-form additional fields (primitives, binary blobs, nested
//! structures). It exists only for the duration of one dispatch step or one
//! outbound send; nothing here is persisted.
//!
//! A payload that is not a map, or whose `code` is absent or not an
//! integer, is a decode error — the dispatch loop logs it and skips the
//! frame, it never tears the connection down.

use std::collections::BTreeMap;

use rmpv::Value;

use crate::error::{Result, SidelinkError};
use crate::protocol::codes::MessageCode;

/// Key of the mandatory kind discriminator.
pub const CODE_FIELD: &str = "code";

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    code: i64,
    fields: BTreeMap<String, Value>,
}

impl Envelope {
    /// New envelope with the given kind and no extra fields.
    pub fn new(code: MessageCode) -> Self {
        Self::with_raw_code(code.code())
    }

    /// New envelope from a raw wire value.
    pub fn with_raw_code(code: i64) -> Self {
        Self {
            code,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Raw integer discriminator.
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Discriminator classified against the closed code set.
    pub fn message_code(&self) -> Option<MessageCode> {
        MessageCode::from_code(self.code)
    }

    /// All fields except `code`.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Look up one field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field as UTF-8 string, if present and a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Field as binary blob, if present and binary.
    pub fn get_bin(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).and_then(Value::as_slice)
    }

    /// Serialize to the msgpack payload the frame codec carries.
    ///
    /// Deterministic: `code` first, then fields in key order, so
    /// `deserialize(serialize(e)) == e` for any well-formed envelope.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<(Value, Value)> =
            Vec::with_capacity(1 + self.fields.len());
        entries.push((Value::from(CODE_FIELD), Value::from(self.code)));
        for (k, v) in &self.fields {
            entries.push((Value::from(k.as_str()), v.clone()));
        }

        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::Map(entries))
            .map_err(|e| SidelinkError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a frame payload.
    ///
    /// Errors with `Decode` when the bytes are not a msgpack map with
    /// string keys, and with `MissingCode` when `code` is absent or not an
    /// integer.
    pub fn deserialize(mut payload: &[u8]) -> Result<Self> {
        let value = rmpv::decode::read_value(&mut payload)
            .map_err(|e| SidelinkError::Decode(format!("invalid msgpack: {e}")))?;

        let Value::Map(entries) = value else {
            return Err(SidelinkError::Decode("envelope is not a map".into()));
        };

        let mut code = None;
        let mut fields = BTreeMap::new();
        for (k, v) in entries {
            let Value::String(key) = k else {
                return Err(SidelinkError::Decode("non-string envelope key".into()));
            };
            let Some(key) = key.into_str() else {
                return Err(SidelinkError::Decode("non-utf8 envelope key".into()));
            };
            if key == CODE_FIELD {
                // Wrong-typed code is the same protocol violation as a
                // missing one.
                code = Some(v.as_i64().ok_or(SidelinkError::MissingCode)?);
            } else {
                fields.insert(key, v);
            }
        }

        Ok(Self {
            code: code.ok_or(SidelinkError::MissingCode)?,
            fields,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mixed_fields() {
        let env = Envelope::new(MessageCode::ReqNet)
            .field("type", Value::from("echo"))
            .field("n", Value::from(42))
            .field("ratio", Value::from(0.5))
            .field("chunk", Value::from(&b"\x00\x01\xff"[..]))
            .field("flag", Value::from(true));

        let bytes = env.serialize().unwrap();
        let back = Envelope::deserialize(&bytes).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.message_code(), Some(MessageCode::ReqNet));
        assert_eq!(back.get_str("type"), Some("echo"));
        assert_eq!(back.get_bin("chunk"), Some(&b"\x00\x01\xff"[..]));
    }

    #[test]
    fn roundtrip_nested_map() {
        let nested = Value::Map(vec![(Value::from("k"), Value::from("v"))]);
        let env = Envelope::with_raw_code(4).field("meta", nested);
        let back = Envelope::deserialize(&env.serialize().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn missing_code_is_rejected() {
        let map = Value::Map(vec![(Value::from("type"), Value::from("echo"))]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &map).unwrap();

        let err = Envelope::deserialize(&buf).unwrap_err();
        assert!(matches!(err, SidelinkError::MissingCode));
        assert!(!err.is_fatal());
    }

    #[test]
    fn non_integer_code_is_rejected() {
        let map = Value::Map(vec![(Value::from("code"), Value::from("4"))]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &map).unwrap();

        let err = Envelope::deserialize(&buf).unwrap_err();
        assert!(matches!(err, SidelinkError::MissingCode));
    }

    #[test]
    fn non_map_payload_is_decode_error() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::from(17)).unwrap();
        assert!(matches!(
            Envelope::deserialize(&buf),
            Err(SidelinkError::Decode(_))
        ));
    }

    #[test]
    fn garbage_payload_is_decode_error() {
        // 0xc1 is the one reserved msgpack marker.
        assert!(matches!(
            Envelope::deserialize(&[0xc1, 0x00]),
            Err(SidelinkError::Decode(_))
        ));
    }

    #[test]
    fn unknown_wire_code_classifies_as_none() {
        let env = Envelope::with_raw_code(999);
        let back = Envelope::deserialize(&env.serialize().unwrap()).unwrap();
        assert_eq!(back.code(), 999);
        assert_eq!(back.message_code(), None);
    }
}
