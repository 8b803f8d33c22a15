//! Session transcript and device authentication binding for OpenID4VP.
//!
//! For encrypted responses the handover binds the device signature to the
//! verifier's `client_id`, `response_uri`, request nonce, and the
//! wallet-generated nonce carried in the JWE `apu` header. The unencrypted
//! path falls back to a bare-challenge binding over the request nonce.

use ciborium::Value;
use sha2::{Digest, Sha256};

use crate::cbor::{self, Tag24};
use crate::format::mdoc::DeviceNameSpaces;
use crate::Result;

/// The transcript of the session, independently computed by wallet and
/// verifier. Both sides must arrive at the same bytes for device
/// authentication to verify.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTranscript(pub Value);

impl SessionTranscript {
    /// The OpenID4VP handover form:
    /// `[null, null, ["OID4VPHandover", clientIdHash, responseUriHash, nonce]]`
    /// with each hash computed over the CBOR array of the value and the
    /// wallet-generated nonce.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parse`] on encode failure.
    pub fn for_openid4vp(
        client_id: &str, response_uri: &str, nonce: &str, mdoc_nonce: &str,
    ) -> Result<Self> {
        let client_id_to_hash = cbor::to_vec(&(client_id, mdoc_nonce))?;
        let response_uri_to_hash = cbor::to_vec(&(response_uri, mdoc_nonce))?;

        let handover = Value::Array(vec![
            Value::Text("OID4VPHandover".to_string()),
            Value::Bytes(Sha256::digest(&client_id_to_hash).to_vec()),
            Value::Bytes(Sha256::digest(&response_uri_to_hash).to_vec()),
            Value::Text(nonce.to_string()),
        ]);

        Ok(Self(Value::Array(vec![Value::Null, Value::Null, handover])))
    }
}

/// How the device signature is bound to the exchange.
#[derive(Clone, Debug)]
pub enum DeviceBinding {
    /// Session-transcript binding: the device signs the detached
    /// `DeviceAuthenticationBytes`.
    Transcript(SessionTranscript),

    /// Legacy bare-challenge binding: the device signs the request nonce as
    /// an attached payload. Retained for unencrypted responses only; new
    /// deployments should encrypt and use the transcript.
    Challenge(String),
}

/// The detached COSE payload for device authentication:
/// `#6.24(bstr .cbor ["DeviceAuthentication", transcript, docType,
/// deviceNameSpacesBytes])`.
///
/// # Errors
///
/// Returns [`crate::Error::Parse`] on encode failure.
pub fn device_authentication_bytes(
    transcript: &SessionTranscript, doc_type: &str, device_namespaces: &Tag24<DeviceNameSpaces>,
) -> Result<Vec<u8>> {
    let namespaces_value =
        Value::Tag(24, Box::new(Value::Bytes(device_namespaces.bytes().to_vec())));

    let authentication = Value::Array(vec![
        Value::Text("DeviceAuthentication".to_string()),
        transcript.0.clone(),
        Value::Text(doc_type.to_string()),
        namespaces_value,
    ]);

    let inner = cbor::to_vec(&authentication)?;
    cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(inner))))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn transcript_is_deterministic() {
        let a = SessionTranscript::for_openid4vp(
            "https://verifier.example/rp2",
            "https://verifier.example/cb",
            "n3",
            "mgn3",
        )
        .expect("should build");
        let b = SessionTranscript::for_openid4vp(
            "https://verifier.example/rp2",
            "https://verifier.example/cb",
            "n3",
            "mgn3",
        )
        .expect("should build");
        assert_eq!(a, b);

        // a different wallet nonce changes the transcript
        let c = SessionTranscript::for_openid4vp(
            "https://verifier.example/rp2",
            "https://verifier.example/cb",
            "n3",
            "other",
        )
        .expect("should build");
        assert_ne!(a, c);
    }

    #[test]
    fn authentication_bytes_are_tagged() {
        let transcript =
            SessionTranscript::for_openid4vp("c", "r", "n", "m").expect("should build");
        let namespaces = Tag24::new(BTreeMap::new()).expect("should wrap");

        let bytes = device_authentication_bytes(&transcript, "org.iso.18013.5.1.mDL", &namespaces)
            .expect("should encode");
        assert_eq!(&bytes[..2], &[0xd8, 0x18]);
    }
}
