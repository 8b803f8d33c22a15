//! mdoc verification: issuer authentication, value digests, validity, and
//! device authentication.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::cose;
use crate::datetime::Leeway;
use crate::format::mdoc::{
    DeviceBinding, DeviceResponse, Document, MobileSecurityObject, TypeCodecRegistry,
    device_authentication_bytes,
};
use crate::jose::jwk::PublicKeyJwk;
use crate::{Error, Result};

/// A verified presented document.
#[derive(Clone, Debug)]
pub struct VerifiedDocument {
    /// The document type.
    pub doc_type: String,

    /// Presented data elements, decoded to JSON: namespace → identifier →
    /// value.
    pub namespaces: BTreeMap<String, Map<String, Value>>,

    /// The mobile security object that authenticated them.
    pub mso: MobileSecurityObject,
}

/// Verify a `DeviceResponse`.
///
/// For each document: verifies `issuerAuth` (against its `x5chain` leaf if
/// present, otherwise the supplied trust anchors), re-digests every
/// presented item against `valueDigests`, checks the validity window, and
/// verifies the device signature under the given binding against the MSO's
/// device key.
///
/// # Errors
///
/// Returns the taxonomy error for the first failing check.
pub fn verify(
    response: &DeviceResponse, trust_anchors: &[PublicKeyJwk], binding: &DeviceBinding,
    registry: &TypeCodecRegistry, leeway: Leeway, now: DateTime<Utc>,
) -> Result<Vec<VerifiedDocument>> {
    tracing::debug!("verify mdoc");

    let Some(documents) = &response.documents else {
        return Err(Error::InvalidStructure("device response has no documents".to_string()));
    };
    if documents.is_empty() {
        return Err(Error::InvalidStructure("device response has no documents".to_string()));
    }

    documents
        .iter()
        .map(|doc| verify_document(doc, trust_anchors, binding, registry, leeway, now))
        .collect()
}

fn verify_document(
    document: &Document, trust_anchors: &[PublicKeyJwk], binding: &DeviceBinding,
    registry: &TypeCodecRegistry, leeway: Leeway, now: DateTime<Utc>,
) -> Result<VerifiedDocument> {
    let issuer_auth = &document.issuer_signed.issuer_auth.0;

    // 1. issuer authentication
    let issuer_key = resolve_issuer_key(issuer_auth, trust_anchors)?;
    cose::verify(issuer_auth, &[], &issuer_key)?;

    let mso = document.issuer_signed.mobile_security_object()?;
    if mso.doc_type != document.doc_type {
        return Err(Error::InvalidStructure("docType does not match MSO".to_string()));
    }

    // 2. validity window
    leeway.check_window(Some(mso.validity_info.valid_from.0), Some(mso.validity_info.valid_until.0), now)?;

    // 3. every presented item must re-digest to its valueDigests entry
    let mut namespaces = BTreeMap::new();
    if let Some(presented) = &document.issuer_signed.name_spaces {
        for (namespace, items) in presented {
            let Some(digests) = mso.value_digests.get(namespace) else {
                return Err(Error::InvalidStructure(format!(
                    "namespace not in valueDigests: {namespace}"
                )));
            };

            let mut elements = Map::new();
            for item in items {
                let Some(expected) = digests.get(&item.inner().digest_id) else {
                    return Err(Error::InvalidStructure(format!(
                        "digestID not in valueDigests: {}",
                        item.inner().digest_id
                    )));
                };
                if item.value_digest()? != expected.to_vec() {
                    return Err(Error::InvalidSignature(format!(
                        "digest mismatch for {}",
                        item.inner().element_identifier
                    )));
                }
                elements.insert(
                    item.inner().element_identifier.clone(),
                    registry.decode(
                        namespace,
                        &item.inner().element_identifier,
                        &item.inner().element_value,
                    )?,
                );
            }
            namespaces.insert(namespace.clone(), elements);
        }
    }

    // 4. device authentication against the key committed in the MSO
    verify_device_auth(document, &mso, binding)?;

    Ok(VerifiedDocument { doc_type: document.doc_type.clone(), namespaces, mso })
}

fn resolve_issuer_key(
    issuer_auth: &coset::CoseSign1, trust_anchors: &[PublicKeyJwk],
) -> Result<PublicKeyJwk> {
    if let Some(der) = cose::sign1::x5chain_leaf(&issuer_auth.unprotected) {
        return crate::x509::public_key_jwk(&der);
    }

    // no chain: accept the first trust anchor whose key verifies
    for anchor in trust_anchors {
        if cose::verify(issuer_auth, &[], anchor).is_ok() {
            return Ok(anchor.clone());
        }
    }
    Err(Error::UnknownKey("no trust anchor verifies issuerAuth".to_string()))
}

fn verify_device_auth(
    document: &Document, mso: &MobileSecurityObject, binding: &DeviceBinding,
) -> Result<()> {
    let Some(device_signed) = &document.device_signed else {
        return Err(Error::InvalidStructure("missing deviceSigned".to_string()));
    };
    let device_key = cose::from_cose_key(&mso.device_key_info.device_key)?;

    let Some(signature) = &device_signed.device_auth.device_signature else {
        if device_signed.device_auth.device_mac.is_some() {
            return Err(Error::UnsupportedAlgorithm(
                "deviceMac authentication is not supported".to_string(),
            ));
        }
        return Err(Error::InvalidStructure("missing deviceSignature".to_string()));
    };

    match binding {
        DeviceBinding::Transcript(transcript) => {
            let payload = device_authentication_bytes(
                transcript,
                &document.doc_type,
                &device_signed.name_spaces,
            )?;
            cose::verify_detached(&signature.0, &payload, &[], &device_key)
        }
        DeviceBinding::Challenge(nonce) => {
            let Some(payload) = &signature.0.payload else {
                return Err(Error::InvalidStructure(
                    "bare-challenge binding requires an attached payload".to_string(),
                ));
            };
            if payload != nonce.as_bytes() {
                return Err(Error::InvalidStructure(
                    "device signature payload does not match nonce".to_string(),
                ));
            }
            cose::verify(&signature.0, &[], &device_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::format::mdoc::{DeviceResponseBuilder, MdocBuilder, SessionTranscript};
    use crate::key::{Curve, KeyMaterial};

    async fn issue(issuer_key: &KeyMaterial, device_key: &KeyMaterial) -> crate::format::mdoc::IssuerSigned {
        MdocBuilder::new()
            .doc_type("org.iso.18013.5.1.mDL")
            .namespace(
                "org.iso.18013.5.1",
                json!({"given_name": "Erika", "family_name": "Mustermann", "age_over_18": true})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .device_jwk(device_key.public_jwk())
            .signer(issuer_key)
            .build()
            .await
            .expect("should issue")
    }

    #[tokio::test]
    async fn transcript_bound_presentation() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let device_key = KeyMaterial::generate(Curve::P256);
        let issued = issue(&issuer_key, &device_key).await;

        let transcript = SessionTranscript::for_openid4vp(
            "https://verifier.example/rp2",
            "https://verifier.example/cb",
            "n3",
            "mgn3",
        )
        .expect("should build");

        let response = DeviceResponseBuilder::new()
            .issuer_signed(issued)
            .doc_type("org.iso.18013.5.1.mDL")
            .requested([( "org.iso.18013.5.1".to_string(), vec!["age_over_18".to_string()] )].into())
            .binding(DeviceBinding::Transcript(transcript.clone()))
            .signer(&device_key)
            .build()
            .await
            .expect("should present");

        // round-trip through the vp_token encoding
        let encoded = response.to_base64url().expect("should encode");
        let decoded = DeviceResponse::from_base64url(&encoded).expect("should decode");

        let verified = verify(
            &decoded,
            &[issuer_key.public_jwk()],
            &DeviceBinding::Transcript(transcript),
            &TypeCodecRegistry::new(),
            Leeway::default(),
            Utc::now(),
        )
        .expect("should verify");

        assert_eq!(verified.len(), 1);
        let elements = &verified[0].namespaces["org.iso.18013.5.1"];
        assert_eq!(elements["age_over_18"], json!(true));
        assert!(!elements.contains_key("given_name"));
    }

    #[tokio::test]
    async fn wrong_transcript_rejected() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let device_key = KeyMaterial::generate(Curve::P256);
        let issued = issue(&issuer_key, &device_key).await;

        let transcript =
            SessionTranscript::for_openid4vp("c", "r", "n3", "mgn3").expect("should build");
        let response = DeviceResponseBuilder::new()
            .issuer_signed(issued)
            .doc_type("org.iso.18013.5.1.mDL")
            .binding(DeviceBinding::Transcript(transcript))
            .signer(&device_key)
            .build()
            .await
            .expect("should present");

        // the verifier recomputes with a different wallet nonce
        let other = SessionTranscript::for_openid4vp("c", "r", "n3", "other").expect("should build");
        let result = verify(
            &response,
            &[issuer_key.public_jwk()],
            &DeviceBinding::Transcript(other),
            &TypeCodecRegistry::new(),
            Leeway::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn bare_challenge_binding() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let device_key = KeyMaterial::generate(Curve::P256);
        let issued = issue(&issuer_key, &device_key).await;

        let response = DeviceResponseBuilder::new()
            .issuer_signed(issued)
            .doc_type("org.iso.18013.5.1.mDL")
            .binding(DeviceBinding::Challenge("n7".to_string()))
            .signer(&device_key)
            .build()
            .await
            .expect("should present");

        verify(
            &response,
            &[issuer_key.public_jwk()],
            &DeviceBinding::Challenge("n7".to_string()),
            &TypeCodecRegistry::new(),
            Leeway::default(),
            Utc::now(),
        )
        .expect("should verify");
    }
}
