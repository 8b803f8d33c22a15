//! JSON Web Key [RFC7517] public keys.
//!
//! [RFC7517]: https://www.rfc-editor.org/rfc/rfc7517

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::jose::jwa::Algorithm;
use crate::{Error, Result};

/// A public key in JWK format, restricted to the key types the engine signs
/// and verifies with.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PublicKeyJwk {
    /// Key type: `EC` or `OKP`.
    pub kty: String,

    /// Curve name: `P-256`, `P-384`, `P-521`, or `Ed25519`.
    pub crv: String,

    /// Base64url-encoded x-coordinate (EC) or public key bytes (OKP).
    pub x: String,

    /// Base64url-encoded y-coordinate. EC keys only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Intended use, e.g. `sig` or `enc`.
    #[serde(rename = "use")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl PublicKeyJwk {
    /// The signature algorithm implied by the key's curve.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAlgorithm`] for curves outside the
    /// supported set.
    pub fn algorithm(&self) -> Result<Algorithm> {
        match self.crv.as_str() {
            "P-256" => Ok(Algorithm::ES256),
            "P-384" => Ok(Algorithm::ES384),
            "P-521" => Ok(Algorithm::ES512),
            "Ed25519" => Ok(Algorithm::EdDSA),
            crv => Err(Error::UnsupportedAlgorithm(format!("unsupported curve: {crv}"))),
        }
    }

    /// The RFC 7638 JWK thumbprint: SHA-256 over the canonical form of the
    /// required members, base64url-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] if required members are missing.
    pub fn thumbprint(&self) -> Result<String> {
        // members in lexicographic order, no whitespace
        let canonical = match self.kty.as_str() {
            "EC" => {
                let Some(y) = &self.y else {
                    return Err(Error::InvalidStructure("EC key without 'y'".to_string()));
                };
                format!(r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{y}"}}"#, self.crv, self.x)
            }
            "OKP" => {
                format!(r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#, self.crv, self.x)
            }
            kty => return Err(Error::InvalidStructure(format!("unsupported key type: {kty}"))),
        };

        Ok(Base64UrlUnpadded::encode_string(Sha256::digest(canonical.as_bytes()).as_slice()))
    }

    /// A stable identifier for the key, suitable as a `kid` or a SIOPv2
    /// `sub` value.
    ///
    /// # Errors
    ///
    /// Propagates thumbprint failures.
    pub fn identifier(&self) -> Result<String> {
        Ok(format!("urn:ietf:params:oauth:jwk-thumbprint:sha-256:{}", self.thumbprint()?))
    }

    /// Verify the signature of the provided message using this key.
    ///
    /// EC signatures are the raw `r || s` form used by JWS and COSE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] on verification failure and
    /// [`Error::UnsupportedAlgorithm`] for keys the engine cannot verify
    /// with.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> Result<()> {
        match self.crv.as_str() {
            "P-256" => self.verify_es256(msg, sig),
            "P-384" => self.verify_es384(msg, sig),
            "P-521" => self.verify_es512(msg, sig),
            "Ed25519" => self.verify_eddsa(msg, sig),
            crv => Err(Error::UnsupportedAlgorithm(format!("unsupported curve: {crv}"))),
        }
    }

    fn verify_es256(&self, msg: &[u8], sig: &[u8]) -> Result<()> {
        use ecdsa::signature::Verifier as _;
        use p256::ecdsa::{Signature, VerifyingKey};

        let verifying_key = VerifyingKey::from_sec1_bytes(&self.to_sec1()?)
            .map_err(|e| Error::InvalidStructure(format!("invalid P-256 public key: {e}")))?;
        let signature = Signature::from_slice(sig)
            .map_err(|e| Error::Parse(format!("invalid ES256 signature: {e}")))?;
        verifying_key
            .verify(msg, &signature)
            .map_err(|e| Error::InvalidSignature(format!("ES256 check failed: {e}")))
    }

    fn verify_es384(&self, msg: &[u8], sig: &[u8]) -> Result<()> {
        use ecdsa::signature::Verifier as _;
        use p384::ecdsa::{Signature, VerifyingKey};

        let verifying_key = VerifyingKey::from_sec1_bytes(&self.to_sec1()?)
            .map_err(|e| Error::InvalidStructure(format!("invalid P-384 public key: {e}")))?;
        let signature = Signature::from_slice(sig)
            .map_err(|e| Error::Parse(format!("invalid ES384 signature: {e}")))?;
        verifying_key
            .verify(msg, &signature)
            .map_err(|e| Error::InvalidSignature(format!("ES384 check failed: {e}")))
    }

    fn verify_es512(&self, msg: &[u8], sig: &[u8]) -> Result<()> {
        use ecdsa::signature::Verifier as _;
        use p521::ecdsa::{Signature, VerifyingKey};

        let verifying_key = VerifyingKey::from_sec1_bytes(&self.to_sec1()?)
            .map_err(|e| Error::InvalidStructure(format!("invalid P-521 public key: {e}")))?;
        let signature = Signature::from_slice(sig)
            .map_err(|e| Error::Parse(format!("invalid ES512 signature: {e}")))?;
        verifying_key
            .verify(msg, &signature)
            .map_err(|e| Error::InvalidSignature(format!("ES512 check failed: {e}")))
    }

    fn verify_eddsa(&self, msg: &[u8], sig: &[u8]) -> Result<()> {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let x_bytes = Base64UrlUnpadded::decode_vec(&self.x)
            .map_err(|e| Error::Parse(format!("issue decoding JWK 'x': {e}")))?;
        let bytes: [u8; 32] = x_bytes
            .try_into()
            .map_err(|_| Error::InvalidStructure("invalid Ed25519 public key length".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::InvalidStructure(format!("invalid Ed25519 public key: {e}")))?;
        let signature = Signature::from_slice(sig)
            .map_err(|e| Error::Parse(format!("invalid Ed25519 signature: {e}")))?;

        verifying_key
            .verify(msg, &signature)
            .map_err(|e| Error::InvalidSignature(format!("Ed25519 signature check failed: {e}")))
    }

    /// Uncompressed SEC1 point bytes for an EC key.
    pub(crate) fn to_sec1(&self) -> Result<Vec<u8>> {
        let Some(y) = &self.y else {
            return Err(Error::InvalidStructure("EC key without 'y'".to_string()));
        };
        let mut sec1 = vec![0x04];
        sec1.extend(
            Base64UrlUnpadded::decode_vec(&self.x)
                .map_err(|e| Error::Parse(format!("issue decoding JWK 'x': {e}")))?,
        );
        sec1.extend(
            Base64UrlUnpadded::decode_vec(y)
                .map_err(|e| Error::Parse(format!("issue decoding JWK 'y': {e}")))?,
        );
        Ok(sec1)
    }

    /// Raw coordinate bytes `(x, y)`; `y` empty for OKP keys.
    pub(crate) fn coordinates(&self) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
        let x = Base64UrlUnpadded::decode_vec(&self.x)
            .map_err(|e| anyhow!("issue decoding JWK 'x': {e}"))?;
        let y = match &self.y {
            Some(y) => Base64UrlUnpadded::decode_vec(y)
                .map_err(|e| anyhow!("issue decoding JWK 'y': {e}"))?,
            None => vec![],
        };
        Ok((x, y))
    }
}

/// A set of JWKs, as served from a `jwks` metadata entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwks {
    /// Keys in the set.
    pub keys: Vec<PublicKeyJwk>,
}

impl Jwks {
    /// The first key usable for encryption, preferring those marked
    /// `use == enc`.
    #[must_use]
    pub fn encryption_key(&self) -> Option<&PublicKeyJwk> {
        self.keys
            .iter()
            .find(|k| k.use_.as_deref() == Some("enc"))
            .or_else(|| self.keys.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7638 §3.1 example (RSA omitted here; EC form checked for shape).
    #[test]
    fn thumbprint_is_stable() {
        let jwk = PublicKeyJwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: "x".to_string(),
            y: Some("y".to_string()),
            ..PublicKeyJwk::default()
        };
        assert_eq!(jwk.thumbprint().unwrap(), jwk.thumbprint().unwrap());
        assert!(jwk.identifier().unwrap().starts_with("urn:ietf:params:oauth:jwk-thumbprint:"));
    }

    #[test]
    fn okp_thumbprint_omits_y() {
        let jwk = PublicKeyJwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: "abc".to_string(),
            ..PublicKeyJwk::default()
        };
        jwk.thumbprint().expect("should hash");
    }
}
