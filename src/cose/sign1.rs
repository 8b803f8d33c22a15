//! COSE_Sign1 construction and verification.
//!
//! The signature is computed over the canonical `Sig_structure`
//! `["Signature1", protected, external_aad, payload]`. Payloads may be
//! attached or detached; detached payloads are supplied again at
//! verification time.

use coset::{
    CborSerializable, CoseSign1, Header, HeaderBuilder, ProtectedHeader, SignatureContext, iana,
    sig_structure_data,
};

use crate::jose::jwa::Algorithm;
use crate::jose::jwk::PublicKeyJwk;
use crate::provider::Signer;
use crate::{Error, Result};

/// Unprotected header label for an X.509 certificate chain (RFC 9360).
pub const X5CHAIN_LABEL: i64 = 33;

fn cose_algorithm(alg: Algorithm) -> Result<iana::Algorithm> {
    match alg {
        Algorithm::ES256 => Ok(iana::Algorithm::ES256),
        Algorithm::ES384 => Ok(iana::Algorithm::ES384),
        Algorithm::ES512 => Ok(iana::Algorithm::ES512),
        Algorithm::EdDSA => Ok(iana::Algorithm::EdDSA),
        Algorithm::PS256 | Algorithm::RS256 => {
            Err(Error::UnsupportedAlgorithm("RSA algorithms are not supported for COSE".to_string()))
        }
    }
}

/// Sign a payload, attaching it to the resulting COSE_Sign1.
///
/// # Errors
///
/// Returns an error if signing fails.
pub async fn sign(payload: Vec<u8>, external_aad: &[u8], signer: &impl Signer) -> Result<CoseSign1> {
    let mut sign1 = build(&payload, external_aad, signer).await?;
    sign1.payload = Some(payload);
    Ok(sign1)
}

/// Sign a detached payload: the caller transports it out of band and
/// supplies it again to [`verify_detached`].
///
/// # Errors
///
/// Returns an error if signing fails.
pub async fn sign_detached(
    payload: &[u8], external_aad: &[u8], signer: &impl Signer,
) -> Result<CoseSign1> {
    build(payload, external_aad, signer).await
}

async fn build(payload: &[u8], external_aad: &[u8], signer: &impl Signer) -> Result<CoseSign1> {
    tracing::debug!("cose sign");

    let header = HeaderBuilder::new().algorithm(cose_algorithm(signer.algorithm())?).build();
    let protected = ProtectedHeader { original_data: None, header };
    let unprotected =
        HeaderBuilder::new().key_id(signer.verification_method().into_bytes()).build();

    let sig_data = sig_structure_data(
        SignatureContext::CoseSign1,
        protected.clone(),
        None,
        external_aad,
        payload,
    );
    let signature = signer
        .try_sign(&sig_data)
        .await
        .map_err(|e| Error::Signing(format!("issue signing COSE payload: {e}")))?;

    Ok(CoseSign1 { protected, unprotected, payload: None, signature })
}

/// Attach an X.509 chain to the unprotected header.
pub fn attach_x5chain(sign1: &mut CoseSign1, chain: &[Vec<u8>]) {
    let entries =
        chain.iter().map(|der| ciborium::Value::Bytes(der.clone())).collect::<Vec<_>>();
    let value = if entries.len() == 1 {
        entries.into_iter().next().unwrap_or(ciborium::Value::Null)
    } else {
        ciborium::Value::Array(entries)
    };
    sign1.unprotected.rest.push((coset::Label::Int(X5CHAIN_LABEL), value));
}

/// The DER bytes of the leaf certificate in an `x5chain` header, if present.
#[must_use]
pub fn x5chain_leaf(header: &Header) -> Option<Vec<u8>> {
    header.rest.iter().find_map(|(label, value)| {
        if label != &coset::Label::Int(X5CHAIN_LABEL) {
            return None;
        }
        match value {
            ciborium::Value::Bytes(der) => Some(der.clone()),
            ciborium::Value::Array(entries) => match entries.first() {
                Some(ciborium::Value::Bytes(der)) => Some(der.clone()),
                _ => None,
            },
            _ => None,
        }
    })
}

/// Verify a COSE_Sign1 with an attached payload.
///
/// # Errors
///
/// Returns [`Error::InvalidStructure`] when the payload is detached and
/// [`Error::InvalidSignature`] when the check fails.
pub fn verify(sign1: &CoseSign1, external_aad: &[u8], key: &PublicKeyJwk) -> Result<()> {
    let Some(payload) = &sign1.payload else {
        return Err(Error::InvalidStructure("expected an attached payload".to_string()));
    };
    verify_detached(sign1, payload, external_aad, key)
}

/// Verify a COSE_Sign1 against a caller-supplied (detached) payload.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] when the check fails.
pub fn verify_detached(
    sign1: &CoseSign1, payload: &[u8], external_aad: &[u8], key: &PublicKeyJwk,
) -> Result<()> {
    let sig_data = sig_structure_data(
        SignatureContext::CoseSign1,
        sign1.protected.clone(),
        None,
        external_aad,
        payload,
    );
    key.verify(&sig_data, &sign1.signature)
}

/// Serialize as tagged (tag 18) CBOR.
///
/// # Errors
///
/// Returns [`Error::Parse`] on encode failure.
pub fn to_tagged_vec(sign1: &CoseSign1) -> Result<Vec<u8>> {
    use coset::TaggedCborSerializable;
    sign1
        .clone()
        .to_tagged_vec()
        .map_err(|e| Error::Parse(format!("issue encoding COSE_Sign1: {e}")))
}

/// Parse from tagged or untagged CBOR bytes.
///
/// # Errors
///
/// Returns [`Error::Parse`] when neither form decodes.
pub fn from_slice(data: &[u8]) -> Result<CoseSign1> {
    use coset::TaggedCborSerializable;
    CoseSign1::from_tagged_slice(data)
        .or_else(|_| CoseSign1::from_slice(data))
        .map_err(|e| Error::Parse(format!("issue decoding COSE_Sign1: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn attached_round_trip() {
        let key = KeyMaterial::generate(Curve::P256);
        let sign1 = sign(b"payload".to_vec(), &[], &key).await.expect("should sign");

        let bytes = to_tagged_vec(&sign1).expect("should encode");
        let parsed = from_slice(&bytes).expect("should parse");

        verify(&parsed, &[], &key.public_jwk()).expect("should verify");
    }

    #[tokio::test]
    async fn detached_round_trip() {
        let key = KeyMaterial::generate(Curve::Ed25519);
        let sign1 = sign_detached(b"detached payload", b"aad", &key).await.expect("should sign");
        assert!(sign1.payload.is_none());

        verify_detached(&sign1, b"detached payload", b"aad", &key.public_jwk())
            .expect("should verify");
        assert!(
            verify_detached(&sign1, b"another payload", b"aad", &key.public_jwk()).is_err()
        );
    }
}
