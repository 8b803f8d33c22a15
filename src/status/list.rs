//! # Revocation List
//!
//! A bit-indexed revocation list: bit `i` set means the credential whose
//! `credentialStatus.statusListIndex == i` is revoked. The bit array is
//! zlib-compressed, base64url-encoded, and embedded as `encodedList` in a
//! Verifiable Credential the issuer signs.

use std::io::{Read, Write};

use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::prelude::*;
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use serde_json::json;

use crate::core::{Kind, OneMany};
use crate::datetime::Leeway;
use crate::format::w3c_vc::{CredentialSubject, VerifiableCredential, W3cVcClaims};
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::{Error, Result};

/// Default list length in bits.
pub const MAX_ENTRIES: usize = 131_072;

/// An in-memory revocation bit array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationList {
    bits: BitVec<u8, Msb0>,
}

impl Default for RevocationList {
    fn default() -> Self {
        Self::new(MAX_ENTRIES)
    }
}

impl RevocationList {
    /// A list of the given length with no bits set.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { bits: bitvec![u8, Msb0; 0; len] }
    }

    /// The list length in bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Mark an index revoked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when the index is out of range.
    pub fn revoke(&mut self, index: usize) -> Result<()> {
        if index >= self.bits.len() {
            return Err(Error::Usage(format!("status index out of range: {index}")));
        }
        self.bits.set(index, true);
        Ok(())
    }

    /// Test an index. Indexes beyond the list length read as not revoked.
    #[must_use]
    pub fn is_revoked(&self, index: usize) -> bool {
        self.bits.get(index).is_some_and(|bit| *bit)
    }

    /// Compress and encode the list: zlib then base64url.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on a compression failure.
    pub fn encode(&self) -> Result<String> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(self.bits.as_raw_slice())
            .map_err(|e| Error::Parse(format!("issue compressing list: {e}")))?;
        let compressed =
            encoder.finish().map_err(|e| Error::Parse(format!("issue compressing list: {e}")))?;
        Ok(Base64UrlUnpadded::encode_string(&compressed))
    }

    /// Decode an `encodedList` value. Accepts zlib (emitted here) and gzip
    /// streams.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on bad base64 or an undecodable stream.
    pub fn decode(encoded: &str) -> Result<Self> {
        let compressed = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::Parse(format!("issue decoding list: {e}")))?;

        let mut raw = Vec::new();
        // gzip magic: 0x1f 0x8b
        if compressed.starts_with(&[0x1f, 0x8b]) {
            GzDecoder::new(compressed.as_slice())
                .read_to_end(&mut raw)
                .map_err(|e| Error::Parse(format!("issue decompressing list: {e}")))?;
        } else {
            ZlibDecoder::new(compressed.as_slice())
                .read_to_end(&mut raw)
                .map_err(|e| Error::Parse(format!("issue decompressing list: {e}")))?;
        }

        Ok(Self { bits: BitVec::from_vec(raw) })
    }
}

/// Build a revocation list credential suitable for publishing at the status
/// list URL.
#[derive(Debug)]
pub struct StatusListCredentialBuilder<'a, S> {
    issuer: String,
    list_url: String,
    list: &'a RevocationList,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl<'a> StatusListCredentialBuilder<'a, NoSigner> {
    /// Create a builder for the given list.
    #[must_use]
    pub const fn new(list: &'a RevocationList) -> Self {
        Self { issuer: String::new(), list_url: String::new(), list, signer: NoSigner }
    }

    /// Set the credential Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> StatusListCredentialBuilder<'a, HasSigner<'_, S>> {
        StatusListCredentialBuilder {
            issuer: self.issuer,
            list_url: self.list_url,
            list: self.list,
            signer: HasSigner(signer),
        }
    }
}

impl<'a, S> StatusListCredentialBuilder<'a, S> {
    /// The issuer URI.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// The URL the credential will be published at.
    #[must_use]
    pub fn list_url(mut self, url: impl Into<String>) -> Self {
        self.list_url = url.into();
        self
    }
}

impl<S: Signer> StatusListCredentialBuilder<'_, HasSigner<'_, S>> {
    /// Build and sign the status list credential as a VC-JWT.
    ///
    /// # Errors
    ///
    /// Returns an error on encoding or signing failure.
    pub async fn build(self) -> Result<String> {
        let mut claims = serde_json::Map::new();
        claims.insert("type".to_string(), json!("RevocationList2021"));
        claims.insert("encodedList".to_string(), json!(self.list.encode()?));

        let vc = VerifiableCredential {
            id: Some(self.list_url.clone()),
            type_: OneMany::Many(vec![
                "VerifiableCredential".to_string(),
                "StatusList2021Credential".to_string(),
            ]),
            issuer: Kind::String(self.issuer.clone()),
            issuance_date: chrono::Utc::now(),
            credential_subject: OneMany::One(CredentialSubject {
                id: Some(format!("{}#list", self.list_url)),
                claims,
            }),
            ..VerifiableCredential::default()
        };

        jws::encode(JwsType::Jwt, &W3cVcClaims::new(vc, self.list_url.clone()), self.signer.0).await
    }
}

/// Verify a status list credential and test one index.
///
/// The credential's signature is verified against the issuer key, its
/// issuer must match the credential issuer being checked, and the bit at
/// `index` is read. An index beyond the list length reads as not revoked.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] / [`Error::InvalidStructure`] when
/// the list credential itself does not verify.
pub async fn check_revocation(
    status_credential: &str, issuer_key: &PublicKeyJwk, expected_issuer: &str, index: usize,
    leeway: Leeway, now: chrono::DateTime<chrono::Utc>,
) -> Result<bool> {
    let key = issuer_key.clone();
    let jwt = jws::decode::<W3cVcClaims, _, _>(status_credential, move |_| {
        let key = key.clone();
        async move { Ok(key) }
    })
    .await?;

    if jwt.claims.iss != expected_issuer {
        return Err(Error::InvalidStructure(
            "status list issuer does not match credential issuer".to_string(),
        ));
    }
    leeway.check_window(Some(jwt.claims.nbf), jwt.claims.exp, now)?;

    let OneMany::One(subject) = &jwt.claims.vc.credential_subject else {
        return Err(Error::InvalidStructure("status list has multiple subjects".to_string()));
    };
    let Some(encoded) = subject.claims.get("encodedList").and_then(|v| v.as_str()) else {
        return Err(Error::InvalidStructure("missing encodedList".to_string()));
    };

    Ok(RevocationList::decode(encoded)?.is_revoked(index))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[test]
    fn encode_decode_round_trip() {
        let mut list = RevocationList::new(1024);
        list.revoke(0).unwrap();
        list.revoke(42).unwrap();
        list.revoke(1023).unwrap();

        let decoded = RevocationList::decode(&list.encode().unwrap()).expect("should decode");
        assert!(decoded.is_revoked(0));
        assert!(decoded.is_revoked(42));
        assert!(decoded.is_revoked(1023));
        assert!(!decoded.is_revoked(41));

        // out-of-range reads as not revoked
        assert!(!decoded.is_revoked(1_000_000));
    }

    #[tokio::test]
    async fn signed_list_round_trip() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let mut list = RevocationList::default();
        list.revoke(42).unwrap();

        let credential = StatusListCredentialBuilder::new(&list)
            .issuer("https://issuer.example")
            .list_url("https://issuer.example/status/1")
            .signer(&issuer_key)
            .build()
            .await
            .expect("should sign");

        let revoked = check_revocation(
            &credential,
            &issuer_key.public_jwk(),
            "https://issuer.example",
            42,
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("should check");
        assert!(revoked);

        let clear = check_revocation(
            &credential,
            &issuer_key.public_jwk(),
            "https://issuer.example",
            41,
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("should check");
        assert!(!clear);
    }
}
