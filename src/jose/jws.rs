//! # JSON Web Signature (JWS)
//!
//! JWS ([RFC7515]) represents content secured with digital signatures using
//! JSON-based data structures. Cryptographic algorithms and identifiers for
//! use with this specification are described in the JWA ([RFC7518])
//! specification.
//!
//! [RFC7515]: https://www.rfc-editor.org/rfc/rfc7515
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use std::fmt::Display;
use std::str::FromStr;

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::jose::jwa::Algorithm;
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jwt::Jwt;
use crate::provider::Signer;
use crate::{Error, Result};

/// The JWS `typ` header parameter.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum JwsType {
    /// General purpose JWT type.
    #[default]
    #[serde(rename = "JWT")]
    Jwt,

    /// An SD-JWT verifiable credential.
    #[serde(rename = "dc+sd-jwt")]
    SdJwt,

    /// A Key Binding JWT accompanying an SD-JWT presentation.
    #[serde(rename = "kb+jwt")]
    KbJwt,

    /// JWT-secured authorization request (JAR).
    #[serde(rename = "oauth-authz-req+jwt")]
    OauthAuthzReqJwt,

    /// A Token Status List.
    #[serde(rename = "statuslist+jwt")]
    StatusListJwt,

    /// A Verifier Attestation.
    #[serde(rename = "verifier-attestation+jwt")]
    VerifierAttestationJwt,
}

impl Display for JwsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// JWS protected header. At most one of `jwk`/`kid`/`x5c` is set; the
/// verifier resolves them in that order.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Protected {
    /// Digital signature algorithm identifier.
    pub alg: Algorithm,

    /// Media type of the secured content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<JwsType>,

    /// The public key material itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<PublicKeyJwk>,

    /// A key ID resolvable by the verifier (JWK thumbprint URN, DID URL, or
    /// an entry in a JWKS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// A certificate chain; the leaf certifies the signing key. Entries are
    /// standard base64 (not base64url) DER, per RFC 7515 §4.1.6.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    /// A JWKS URL to resolve the signing key from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jku: Option<String>,

    /// A Verifier Attestation JWT carried alongside a signed authorization
    /// request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

impl Protected {
    /// Returns the `kid`, if present.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns the embedded JWK, if present.
    #[must_use]
    pub const fn jwk(&self) -> Option<&PublicKeyJwk> {
        self.jwk.as_ref()
    }

    /// Returns the DER bytes of the `x5c` leaf certificate, if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the leaf entry is not valid base64.
    pub fn x5c_leaf(&self) -> Result<Option<Vec<u8>>> {
        let Some(chain) = &self.x5c else {
            return Ok(None);
        };
        let Some(leaf) = chain.first() else {
            return Err(Error::InvalidStructure("empty x5c chain".to_string()));
        };
        let der = Base64::decode_vec(leaf)
            .map_err(|e| Error::Parse(format!("issue decoding x5c leaf: {e}")))?;
        Ok(Some(der))
    }
}

/// A compact JWS, retaining the received segments so verification operates
/// on exactly the bytes that were signed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Jws {
    /// The decoded protected header.
    pub header: Protected,

    protected_b64: String,
    payload_b64: String,
    signature_b64: String,
}

impl Jws {
    /// The signing input: `b64u(header) || "." || b64u(payload)`.
    #[must_use]
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.protected_b64, self.payload_b64)
    }

    /// The decoded payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on invalid base64.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        Base64UrlUnpadded::decode_vec(&self.payload_b64)
            .map_err(|e| Error::Parse(format!("issue decoding payload: {e}")))
    }

    /// The decoded payload, deserialized as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on invalid base64 or JSON.
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload_bytes()?)
            .map_err(|e| Error::Parse(format!("issue deserializing claims: {e}")))
    }

    /// The decoded signature bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on invalid base64.
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        Base64UrlUnpadded::decode_vec(&self.signature_b64)
            .map_err(|e| Error::Parse(format!("issue decoding signature: {e}")))
    }

    /// Verify the signature against a known public key, without resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] when the check fails.
    pub fn verify_with(&self, public_key: &PublicKeyJwk) -> Result<()> {
        public_key.verify(self.signing_input().as_bytes(), &self.signature_bytes()?)
    }
}

impl Display for Jws {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.protected_b64, self.payload_b64, self.signature_b64)
    }
}

impl FromStr for Jws {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s.split('.').collect::<Vec<&str>>();
        if parts.len() != 3 {
            return Err(Error::Parse("invalid compact JWS format".to_string()));
        }

        let decoded = Base64UrlUnpadded::decode_vec(parts[0])
            .map_err(|e| Error::Parse(format!("issue decoding header: {e}")))?;
        let header = serde_json::from_slice(&decoded)
            .map_err(|e| Error::Parse(format!("issue deserializing header: {e}")))?;

        Ok(Self {
            header,
            protected_b64: parts[0].to_string(),
            payload_b64: parts[1].to_string(),
            signature_b64: parts[2].to_string(),
        })
    }
}

/// Encode the provided header and claims payload and sign, returning a JWT
/// in compact JWS form. The key reference embedded is the signer's
/// verification method (`kid`).
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub async fn encode<T>(typ: JwsType, payload: &T, signer: &impl Signer) -> Result<String>
where
    T: Serialize + Send + Sync,
{
    tracing::debug!("encode");
    let header = Protected {
        alg: signer.algorithm(),
        typ: Some(typ),
        kid: Some(signer.verification_method()),
        ..Protected::default()
    };
    encode_with_header(&header, payload, signer).await
}

/// Encode with the holder's public key embedded as `jwk` rather than a key
/// ID, as key-binding and proof-of-possession JWTs require.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub async fn encode_jwk<T>(typ: JwsType, payload: &T, signer: &impl Signer) -> Result<String>
where
    T: Serialize + Send + Sync,
{
    let header = Protected {
        alg: signer.algorithm(),
        typ: Some(typ),
        jwk: Some(signer.public_jwk()),
        ..Protected::default()
    };
    encode_with_header(&header, payload, signer).await
}

/// Encode with a caller-built header. Used where the header carries an
/// `x5c` chain or an attestation `jwt`.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub async fn encode_with_header<T>(
    header: &Protected, payload: &T, signer: &impl Signer,
) -> Result<String>
where
    T: Serialize + Send + Sync,
{
    let header_b64 = Base64UrlUnpadded::encode_string(
        &serde_json::to_vec(header).map_err(|e| Error::Parse(format!("issue serializing header: {e}")))?,
    );
    let payload_b64 = Base64UrlUnpadded::encode_string(
        &serde_json::to_vec(payload).map_err(|e| Error::Parse(format!("issue serializing payload: {e}")))?,
    );
    let signing_input = format!("{header_b64}.{payload_b64}");

    let sig = signer
        .try_sign(signing_input.as_bytes())
        .await
        .map_err(|e| Error::Signing(format!("issue signing JWS: {e}")))?;

    Ok(format!("{signing_input}.{}", Base64UrlUnpadded::encode_string(&sig)))
}

/// Decode a compact JWS, resolve the signer's key, verify the signature,
/// and return the typed claims.
///
/// The verification key is resolved in priority order: an embedded `jwk`,
/// the `x5c` leaf certificate's public key, then the `kid` (or, failing
/// that, the `jku` URL) handed to the caller-supplied resolver.
///
/// # Errors
///
/// Returns [`Error::UnknownKey`] when no key reference resolves,
/// [`Error::InvalidSignature`] when the check fails, and [`Error::Parse`]
/// for malformed input.
pub async fn decode<T, F, Fut>(compact_jws: &str, resolver: F) -> Result<Jwt<T>>
where
    T: DeserializeOwned + Send,
    F: Fn(String) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<PublicKeyJwk>> + Send,
{
    tracing::debug!("decode");

    let jws: Jws = compact_jws.parse()?;
    let public_key = resolve_key(&jws.header, &resolver).await?;
    jws.verify_with(&public_key)?;

    Ok(Jwt { header: jws.header.clone(), claims: jws.claims()? })
}

/// Decode a compact JWS without verifying its signature. For inspecting
/// headers and claims before the verification key is known.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed input.
pub fn decode_unverified<T: DeserializeOwned>(compact_jws: &str) -> Result<Jwt<T>> {
    let jws: Jws = compact_jws.parse()?;
    Ok(Jwt { header: jws.header.clone(), claims: jws.claims()? })
}

async fn resolve_key<F, Fut>(header: &Protected, resolver: &F) -> Result<PublicKeyJwk>
where
    F: Fn(String) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<PublicKeyJwk>> + Send,
{
    if let Some(jwk) = header.jwk() {
        return Ok(jwk.clone());
    }
    if let Some(der) = header.x5c_leaf()? {
        return crate::x509::public_key_jwk(&der);
    }
    if let Some(kid) = header.kid() {
        return resolver(kid.to_owned())
            .await
            .map_err(|e| Error::UnknownKey(format!("issue resolving kid: {e}")));
    }
    if let Some(jku) = &header.jku {
        return resolver(jku.clone())
            .await
            .map_err(|e| Error::UnknownKey(format!("issue resolving jku: {e}")));
    }
    Err(Error::UnknownKey("no key reference in header".to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let key = KeyMaterial::generate(Curve::P256);
        let claims = json!({"iss": "https://issuer.example", "sub": "alice"});

        let token = encode_jwk(JwsType::Jwt, &claims, &key).await.expect("should encode");

        let jwt: Jwt<serde_json::Value> =
            decode(&token, |_| async { anyhow::bail!("no resolver") }).await.expect("should verify");
        assert_eq!(jwt.claims["sub"], "alice");
        assert_eq!(jwt.header.alg, Algorithm::ES256);
    }

    #[tokio::test]
    async fn tampered_payload_fails() {
        let key = KeyMaterial::generate(Curve::P256);
        let token =
            encode_jwk(JwsType::Jwt, &json!({"n": 1}), &key).await.expect("should encode");

        let mut parts: Vec<String> = token.split('.').map(ToString::to_string).collect();
        parts[1] = Base64UrlUnpadded::encode_string(br#"{"n":2}"#);
        let tampered = parts.join(".");

        let result =
            decode::<serde_json::Value, _, _>(&tampered, |_| async { anyhow::bail!("none") }).await;
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn kid_resolution() {
        let key = KeyMaterial::generate(Curve::Ed25519);
        let token = encode(JwsType::Jwt, &json!({"n": 1}), &key).await.expect("should encode");

        let jwk = Signer::public_jwk(&key);
        let jwt: Jwt<serde_json::Value> = decode(&token, move |_kid| {
            let jwk = jwk.clone();
            async move { Ok(jwk) }
        })
        .await
        .expect("should verify via kid");
        assert_eq!(jwt.claims["n"], 1);
    }
}
