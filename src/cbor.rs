//! # CBOR Helpers
//!
//! Deterministic CBOR encode/decode over `ciborium`, plus the two wrappers
//! ISO 18013-5 leans on: tag 24 ("encoded CBOR data item") and tag 0
//! (`tdate`). [`Tag24`] keeps the exact encoded bytes it was built from or
//! parsed out of, so digests computed over those bytes survive round-trips.

use chrono::{DateTime, SecondsFormat, Utc};
use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;

use crate::{Error, Result};

/// Serialize a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the value cannot be encoded.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| Error::Parse(format!("issue encoding CBOR: {e}")))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the bytes are not valid CBOR for the target
/// type.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| Error::Parse(format!("issue decoding CBOR: {e}")))
}

/// An embedded CBOR data item: tag 24 wrapping the byte string of the inner
/// value's encoding.
///
/// The encoded bytes are held alongside the decoded value so that digests
/// over `bstr .cbor` content (mdoc issuer-signed items, the mobile security
/// object) are computed over exactly the bytes that were signed.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag24<T> {
    inner: T,
    encoded: Vec<u8>,
}

impl<T: Serialize> Tag24<T> {
    /// Wrap a value, fixing its encoded byte form now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the inner value cannot be encoded.
    pub fn new(inner: T) -> Result<Self> {
        let encoded = to_vec(&inner)?;
        Ok(Self { inner, encoded })
    }

    /// The full `#6.24(bstr)` encoding of this wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on encode failure.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        to_vec(self)
    }
}

impl<T> Tag24<T> {
    /// The wrapped value.
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// Consume the wrapper, returning the value.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// The encoded bytes of the inner value (the content of the byte
    /// string, without the tag).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.encoded
    }
}

impl<T: Serialize> Serialize for Tag24<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ciborium::tag::Required::<&serde_bytes::Bytes, 24>(serde_bytes::Bytes::new(&self.encoded))
            .serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tag24<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tagged = ciborium::tag::Required::<ByteBuf, 24>::deserialize(deserializer)?;
        let encoded = tagged.0.into_vec();
        let inner = from_slice(&encoded).map_err(serde::de::Error::custom)?;
        Ok(Self { inner, encoded })
    }
}

/// A CBOR `tdate`: tag 0 over an RFC 3339 text string, at seconds
/// resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TDate(pub DateTime<Utc>);

impl Serialize for TDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let text = self.0.to_rfc3339_opts(SecondsFormat::Secs, true);
        ciborium::tag::Required::<String, 0>(text).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tagged = ciborium::tag::Required::<String, 0>::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&tagged.0)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(Self(parsed))
    }
}

impl From<DateTime<Utc>> for TDate {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Serde bridge embedding a `coset::CoseSign1` inside a larger CBOR
/// structure (mdoc `issuerAuth`, `deviceSignature`).
pub mod cose_sign1 {
    use ciborium::Value;
    use coset::CborSerializable;
    use coset::CoseSign1;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize the COSE_Sign1 as its untagged CBOR array form.
    ///
    /// # Errors
    ///
    /// Fails if the structure cannot be re-encoded.
    pub fn serialize<S: Serializer>(
        sign1: &CoseSign1, serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let bytes = sign1.clone().to_vec().map_err(serde::ser::Error::custom)?;
        let value: Value =
            ciborium::from_reader(bytes.as_slice()).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }

    /// Deserialize a COSE_Sign1 from its embedded CBOR array form.
    ///
    /// # Errors
    ///
    /// Fails if the array is not a valid COSE_Sign1.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<CoseSign1, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).map_err(serde::de::Error::custom)?;
        CoseSign1::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A COSE_Sign1 embedded in a larger CBOR structure as its untagged array
/// form.
#[derive(Clone, Debug)]
pub struct EmbeddedCoseSign1(pub coset::CoseSign1);

impl Serialize for EmbeddedCoseSign1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        cose_sign1::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for EmbeddedCoseSign1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        cose_sign1::deserialize(deserializer).map(Self)
    }
}

/// Serde bridge embedding a `coset::CoseKey` (mdoc `deviceKey`).
pub mod cose_key {
    use ciborium::Value;
    use coset::CborSerializable;
    use coset::CoseKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize the COSE_Key map in place.
    ///
    /// # Errors
    ///
    /// Fails if the structure cannot be re-encoded.
    pub fn serialize<S: Serializer>(
        key: &CoseKey, serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let bytes = key.clone().to_vec().map_err(serde::ser::Error::custom)?;
        let value: Value =
            ciborium::from_reader(bytes.as_slice()).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }

    /// Deserialize a COSE_Key map in place.
    ///
    /// # Errors
    ///
    /// Fails if the map is not a valid COSE_Key.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<CoseKey, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).map_err(serde::de::Error::custom)?;
        CoseKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Convert a JSON value to a CBOR value, mapping objects to text-keyed maps.
///
/// # Errors
///
/// Returns [`Error::Parse`] for JSON numbers outside CBOR's integer range
/// that also fail float conversion.
pub fn from_json(json: &serde_json::Value) -> Result<Value> {
    let value = match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i.into())
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(Error::Parse(format!("unrepresentable number: {n}")));
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.iter().map(from_json).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| Ok((Value::Text(k.clone()), from_json(v)?)))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(value)
}

/// Convert a CBOR value back to JSON. Byte strings become base64url text;
/// tags are unwrapped to their content.
///
/// # Errors
///
/// Returns [`Error::Parse`] for map keys that are not text and other shapes
/// JSON cannot carry.
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    use base64ct::{Base64UrlUnpadded, Encoding};

    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => {
            let i: i128 = (*i).into();
            serde_json::Value::Number(
                i64::try_from(i)
                    .map_err(|_| Error::Parse("integer out of range".to_string()))?
                    .into(),
            )
        }
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::Parse("unrepresentable float".to_string()))?,
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Bytes(b) => serde_json::Value::String(Base64UrlUnpadded::encode_string(b)),
        Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(to_json).collect::<Result<_>>()?)
        }
        Value::Map(map) => {
            let mut object = serde_json::Map::new();
            for (k, v) in map {
                let Value::Text(key) = k else {
                    return Err(Error::Parse("non-text map key".to_string()));
                };
                object.insert(key.clone(), to_json(v)?);
            }
            serde_json::Value::Object(object)
        }
        Value::Tag(_, inner) => to_json(inner)?,
        _ => return Err(Error::Parse("unsupported CBOR value".to_string())),
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag24_round_trip() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Item {
            name: String,
            value: u32,
        }

        let wrapped = Tag24::new(Item { name: "a".to_string(), value: 7 }).expect("should wrap");
        let bytes = wrapped.to_vec().expect("should encode");

        // 0xd8 0x18 is the two-byte encoding of tag 24
        assert_eq!(&bytes[..2], &[0xd8, 0x18]);

        let parsed: Tag24<Item> = from_slice(&bytes).expect("should decode");
        assert_eq!(parsed, wrapped);
        assert_eq!(parsed.bytes(), wrapped.bytes());
    }

    #[test]
    fn tdate_round_trip() {
        let now = TDate(DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().into());
        let bytes = to_vec(&now).expect("should encode");
        let parsed: TDate = from_slice(&bytes).expect("should decode");
        assert_eq!(parsed, now);
    }

    #[test]
    fn json_cbor_conversion() {
        let json = serde_json::json!({"given_name": "Erika", "age_over_18": true, "n": 3});
        let cbor = from_json(&json).expect("should convert");
        let back = to_json(&cbor).expect("should convert back");
        assert_eq!(back, json);
    }
}
