//! # ISO/IEC 18013-5 mdoc
//!
//! CBOR/COSE mobile documents: `IssuerSigned` items committed to by a
//! signed `MobileSecurityObject`, presented as a `DeviceResponse` with a
//! device signature bound to the session transcript.
//!
//! Structures mirror ISO/IEC 18013-5 §8; `bstr .cbor` fields use the tag-24
//! wrapper from [`crate::cbor`] so digests survive round-trips byte-exact.

mod issue;
mod present;
mod transcript;
mod verify;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};

use crate::cbor::{EmbeddedCoseSign1, TDate, Tag24};
use crate::{Error, Result};

pub use self::issue::MdocBuilder;
pub use self::present::DeviceResponseBuilder;
pub use self::transcript::{DeviceBinding, SessionTranscript, device_authentication_bytes};
pub use self::verify::{VerifiedDocument, verify};

/// Structure version emitted by this engine.
pub const VERSION: &str = "1.0";

/// The digest algorithm named in issued mobile security objects.
pub const DIGEST_ALGORITHM: &str = "SHA-256";

/// The issuer-signed portion of a mobile document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    /// Issuer-signed items by namespace, each wrapped as
    /// `IssuerSignedItemBytes` (tag 24).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_spaces: Option<BTreeMap<String, Vec<Tag24<IssuerSignedItem>>>>,

    /// COSE_Sign1 whose payload is the `MobileSecurityObjectBytes`.
    pub issuer_auth: EmbeddedCoseSign1,
}

impl IssuerSigned {
    /// Decode the mobile security object from the `issuerAuth` payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] when the payload is absent,
    /// [`Error::Parse`] when it does not decode.
    pub fn mobile_security_object(&self) -> Result<MobileSecurityObject> {
        let Some(payload) = &self.issuer_auth.0.payload else {
            return Err(Error::InvalidStructure("issuerAuth payload is detached".to_string()));
        };
        let tagged: Tag24<MobileSecurityObject> = crate::cbor::from_slice(payload)?;
        Ok(tagged.into_inner())
    }
}

/// One issuer-signed data element.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// Digest index within the namespace.
    #[serde(rename = "digestID")]
    pub digest_id: u64,

    /// At least 16 random bytes, making digests unlinkable.
    pub random: ByteBuf,

    /// Data element identifier within the namespace.
    pub element_identifier: String,

    /// The element value, already in its CBOR representation.
    pub element_value: ciborium::Value,
}

impl Tag24<IssuerSignedItem> {
    /// The digest entered into `valueDigests`: SHA-256 over the full
    /// tag-24 encoding of the item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on encode failure.
    pub fn value_digest(&self) -> Result<Vec<u8>> {
        Ok(Sha256::digest(&self.to_vec()?).to_vec())
    }
}

/// The issuer's signed commitment to a document's data elements.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    /// Structure version.
    pub version: String,

    /// Digest algorithm used in `valueDigests`.
    pub digest_algorithm: String,

    /// Digests of every issuer-signed item: namespace → digestID → digest.
    pub value_digests: BTreeMap<String, BTreeMap<u64, ByteBuf>>,

    /// The device key the holder authenticates presentations with.
    pub device_key_info: DeviceKeyInfo,

    /// Document type, e.g. `org.iso.18013.5.1.mDL`.
    pub doc_type: String,

    /// Signing and validity instants.
    pub validity_info: ValidityInfo,
}

/// Device key information.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    /// The device public key as a COSE_Key.
    #[serde(with = "crate::cbor::cose_key")]
    pub device_key: coset::CoseKey,
}

/// Validity instants for the mobile security object.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    /// When the MSO was signed.
    pub signed: TDate,

    /// Start of validity.
    pub valid_from: TDate,

    /// End of validity.
    pub valid_until: TDate,
}

/// The device-signed portion of a presented document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    /// Self-asserted device namespaces (`DeviceNameSpacesBytes`, tag 24).
    /// Empty in this profile, but always present and always signed.
    pub name_spaces: Tag24<DeviceNameSpaces>,

    /// The device authentication.
    pub device_auth: DeviceAuth,
}

/// Data elements signed only by the device.
pub type DeviceNameSpaces = BTreeMap<String, BTreeMap<String, ciborium::Value>>;

/// Device authentication: a signature or (unsupported here) a MAC.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuth {
    /// ECDSA/EdDSA authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_signature: Option<EmbeddedCoseSign1>,

    /// ECDH-derived MAC authentication. Parsed but not verified by this
    /// engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_mac: Option<ciborium::Value>,
}

/// A presented document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Document type.
    pub doc_type: String,

    /// The issuer-signed items disclosed in this presentation.
    pub issuer_signed: IssuerSigned,

    /// The device authentication over the session transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_signed: Option<DeviceSigned>,
}

/// The wallet's response to a presentation request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    /// Structure version.
    pub version: String,

    /// The presented documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,

    /// Status code; 0 is success.
    pub status: u64,
}

impl DeviceResponse {
    /// Encode to the base64url form carried in a `vp_token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on encode failure.
    pub fn to_base64url(&self) -> Result<String> {
        use base64ct::{Base64UrlUnpadded, Encoding};
        Ok(Base64UrlUnpadded::encode_string(&crate::cbor::to_vec(self)?))
    }

    /// Decode from the base64url form carried in a `vp_token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on bad base64 or CBOR.
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        use base64ct::{Base64UrlUnpadded, Encoding};
        let bytes = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::Parse(format!("issue decoding device response: {e}")))?;
        crate::cbor::from_slice(&bytes)
    }
}

/// A codec for one data element type, converting between the JSON surface
/// and the CBOR representation carried in issuer-signed items.
pub trait ElementCodec: Send + Sync {
    /// JSON → CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] for values the codec cannot
    /// represent.
    fn encode(&self, value: &serde_json::Value) -> Result<ciborium::Value>;

    /// CBOR → JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] for values the codec cannot
    /// represent.
    fn decode(&self, value: &ciborium::Value) -> Result<serde_json::Value>;
}

/// Maps `(namespace, element identifier)` to the codec for that element's
/// values. Passed to the issue and verify paths explicitly; elements with
/// no registered codec use the generic JSON ↔ CBOR conversion.
///
/// Populate before the first (de)serialization of an `IssuerSigned`.
#[derive(Clone, Default)]
pub struct TypeCodecRegistry {
    codecs: HashMap<(String, String), Arc<dyn ElementCodec>>,
}

impl TypeCodecRegistry {
    /// An empty registry: every element uses the generic conversion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec for a data element.
    pub fn register(
        &mut self, namespace: impl Into<String>, element: impl Into<String>,
        codec: Arc<dyn ElementCodec>,
    ) {
        self.codecs.insert((namespace.into(), element.into()), codec);
    }

    /// Encode an element value for issuance.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn encode(
        &self, namespace: &str, element: &str, value: &serde_json::Value,
    ) -> Result<ciborium::Value> {
        match self.codecs.get(&(namespace.to_string(), element.to_string())) {
            Some(codec) => codec.encode(value),
            None => crate::cbor::from_json(value),
        }
    }

    /// Decode an element value after verification.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn decode(
        &self, namespace: &str, element: &str, value: &ciborium::Value,
    ) -> Result<serde_json::Value> {
        match self.codecs.get(&(namespace.to_string(), element.to_string())) {
            Some(codec) => codec.decode(value),
            None => crate::cbor::to_json(value),
        }
    }
}

impl std::fmt::Debug for TypeCodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCodecRegistry").field("codecs", &self.codecs.len()).finish()
    }
}

/// Codec for `full-date` elements (tag 1004 over `YYYY-MM-DD` text), used
/// by elements such as `birth_date`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullDateCodec;

impl ElementCodec for FullDateCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<ciborium::Value> {
        let serde_json::Value::String(date) = value else {
            return Err(Error::InvalidStructure("full-date value must be a string".to_string()));
        };
        chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| Error::InvalidStructure(format!("invalid full-date: {e}")))?;
        Ok(ciborium::Value::Tag(1004, Box::new(ciborium::Value::Text(date.clone()))))
    }

    fn decode(&self, value: &ciborium::Value) -> Result<serde_json::Value> {
        match value {
            ciborium::Value::Tag(1004, inner) => match inner.as_ref() {
                ciborium::Value::Text(date) => Ok(serde_json::Value::String(date.clone())),
                _ => Err(Error::InvalidStructure("full-date content must be text".to_string())),
            },
            ciborium::Value::Text(date) => Ok(serde_json::Value::String(date.clone())),
            _ => Err(Error::InvalidStructure("not a full-date".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_date_codec() {
        let registry = {
            let mut r = TypeCodecRegistry::new();
            r.register("org.iso.18013.5.1", "birth_date", Arc::new(FullDateCodec));
            r
        };

        let cbor = registry
            .encode("org.iso.18013.5.1", "birth_date", &serde_json::json!("1986-03-22"))
            .expect("should encode");
        assert!(matches!(cbor, ciborium::Value::Tag(1004, _)));

        let json = registry
            .decode("org.iso.18013.5.1", "birth_date", &cbor)
            .expect("should decode");
        assert_eq!(json, serde_json::json!("1986-03-22"));

        // unregistered elements pass through the generic conversion
        let plain = registry
            .encode("org.iso.18013.5.1", "given_name", &serde_json::json!("Erika"))
            .expect("should encode");
        assert_eq!(plain, ciborium::Value::Text("Erika".to_string()));
    }
}
