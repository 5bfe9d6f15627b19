// ── Opaque structured payloads carried as raw bytes ──
//
// Adaptor parameters and template specs are schema-less. They travel
// through the system as bytes so they can be compared byte-for-byte and
// copied verbatim into annotations. Manifests supply them as any structured
// value, which is re-encoded compactly on the way in.

use std::borrow::Cow;
use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RawExtension {
    raw: Vec<u8>,
}

impl RawExtension {
    /// Wrap bytes as-is. Nothing is validated until the payload is decoded.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self { raw: raw.into() }
    }

    /// Encode a structured value compactly.
    pub fn from_value(value: &Value) -> Self {
        // Serializing a `Value` into memory cannot fail.
        Self {
            raw: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The payload as text, for places (annotations, logs) that need a string.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.raw)
    }

    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.raw)
    }
}

impl fmt::Debug for RawExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawExtension").field(&self.as_str_lossy()).finish()
    }
}

impl Serialize for RawExtension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value: Value = self.decode().map_err(S::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawExtension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_values_are_encoded_compactly() {
        let raw: RawExtension = serde_json::from_str(r#"{ "mac" : "aa:bb",  "timeout": 5 }"#).unwrap();
        assert_eq!(raw.as_bytes(), br#"{"mac":"aa:bb","timeout":5}"#);
    }

    #[test]
    fn yaml_values_round_into_the_same_bytes_as_json() {
        let from_yaml: RawExtension = serde_yaml::from_str("timeout: 5\nmac: aa:bb\n").unwrap();
        let from_json = RawExtension::from_value(&json!({"mac": "aa:bb", "timeout": 5}));
        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn invalid_bytes_fail_on_decode_not_on_construction() {
        let raw = RawExtension::from_bytes(&b"{not json"[..]);
        assert!(raw.decode::<Value>().is_err());
        assert_eq!(raw.as_str_lossy(), "{not json");
    }
}
