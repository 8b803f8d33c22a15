//! # Key Material
//!
//! A [`KeyMaterial`] owns one signature private key and projects its public
//! form on demand: as a JWK, as a COSE_Key, as a stable thumbprint
//! identifier, and (optionally) as an attached X.509 certificate. Storing
//! only the raw form and projecting keeps the views from drifting apart.
//!
//! The same entity performs the raw cryptographic operations the engine
//! needs: ECDSA/EdDSA signing, ECDH key agreement, and secure randomness.
//! AEAD and KDF primitives live with the JWE layer that uses them.

use anyhow::{Result, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::jose::jwa::Algorithm;
use crate::jose::jwk::PublicKeyJwk;
use crate::provider::Signer;

/// Supported signature curves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Curve {
    /// NIST P-256 (ES256).
    #[default]
    P256,

    /// NIST P-384 (ES384).
    P384,

    /// NIST P-521 (ES512).
    P521,

    /// Ed25519 (EdDSA).
    Ed25519,
}

enum SecretKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// One identity key with four projected public views.
pub struct KeyMaterial {
    secret: SecretKey,
    certificate: Option<Vec<u8>>,
}

impl KeyMaterial {
    /// Generate fresh key material on the given curve.
    #[must_use]
    pub fn generate(curve: Curve) -> Self {
        let secret = match curve {
            Curve::P256 => SecretKey::P256(p256::SecretKey::random(&mut OsRng)),
            Curve::P384 => SecretKey::P384(p384::SecretKey::random(&mut OsRng)),
            Curve::P521 => SecretKey::P521(p521::SecretKey::random(&mut OsRng)),
            Curve::Ed25519 => {
                SecretKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
        };
        Self { secret, certificate: None }
    }

    /// Rebuild key material from raw secret bytes. Intended for tests and
    /// fixtures; production keys should be generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not form a valid scalar for the
    /// curve.
    pub fn from_secret_bytes(curve: Curve, bytes: &[u8]) -> Result<Self> {
        let secret = match curve {
            Curve::P256 => SecretKey::P256(
                p256::SecretKey::from_slice(bytes).map_err(|e| anyhow!("invalid P-256 key: {e}"))?,
            ),
            Curve::P384 => SecretKey::P384(
                p384::SecretKey::from_slice(bytes).map_err(|e| anyhow!("invalid P-384 key: {e}"))?,
            ),
            Curve::P521 => SecretKey::P521(
                p521::SecretKey::from_slice(bytes).map_err(|e| anyhow!("invalid P-521 key: {e}"))?,
            ),
            Curve::Ed25519 => {
                let bytes: [u8; 32] =
                    bytes.try_into().map_err(|_| anyhow!("invalid Ed25519 key length"))?;
                SecretKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&bytes))
            }
        };
        Ok(Self { secret, certificate: None })
    }

    /// Attach a DER-encoded X.509 certificate for this key, for use in `x5c`
    /// headers.
    #[must_use]
    pub fn with_certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(der);
        self
    }

    /// The attached certificate, if any.
    #[must_use]
    pub fn certificate(&self) -> Option<&[u8]> {
        self.certificate.as_deref()
    }

    /// The curve this key lives on.
    #[must_use]
    pub const fn curve(&self) -> Curve {
        match &self.secret {
            SecretKey::P256(_) => Curve::P256,
            SecretKey::P384(_) => Curve::P384,
            SecretKey::P521(_) => Curve::P521,
            SecretKey::Ed25519(_) => Curve::Ed25519,
        }
    }

    /// The public key as a JWK.
    #[must_use]
    pub fn public_jwk(&self) -> PublicKeyJwk {
        match &self.secret {
            SecretKey::P256(sk) => {
                let point = sk.public_key().to_encoded_point(false);
                ec_jwk("P-256", point.x().map_or(&[], |x| x), point.y().map_or(&[], |y| y))
            }
            SecretKey::P384(sk) => {
                let point = sk.public_key().to_encoded_point(false);
                ec_jwk("P-384", point.x().map_or(&[], |x| x), point.y().map_or(&[], |y| y))
            }
            SecretKey::P521(sk) => {
                let point = sk.public_key().to_encoded_point(false);
                ec_jwk("P-521", point.x().map_or(&[], |x| x), point.y().map_or(&[], |y| y))
            }
            SecretKey::Ed25519(sk) => PublicKeyJwk {
                kty: "OKP".to_string(),
                crv: "Ed25519".to_string(),
                x: Base64UrlUnpadded::encode_string(sk.verifying_key().as_bytes()),
                ..PublicKeyJwk::default()
            },
        }
    }

    /// The key's stable self-identifier (JWK thumbprint URN).
    ///
    /// # Errors
    ///
    /// Propagates thumbprint computation failures.
    pub fn key_id(&self) -> crate::Result<String> {
        self.public_jwk().identifier()
    }

    /// Sign a message, producing the raw `r || s` form for EC keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing operation fails.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        match &self.secret {
            SecretKey::P256(sk) => {
                use ecdsa::signature::Signer as _;
                let signing_key = p256::ecdsa::SigningKey::from(sk.clone());
                let signature: p256::ecdsa::Signature = signing_key.sign(msg);
                Ok(signature.to_bytes().to_vec())
            }
            SecretKey::P384(sk) => {
                use ecdsa::signature::Signer as _;
                let signing_key = p384::ecdsa::SigningKey::from(sk.clone());
                let signature: p384::ecdsa::Signature = signing_key.sign(msg);
                Ok(signature.to_bytes().to_vec())
            }
            SecretKey::P521(sk) => {
                use ecdsa::signature::Signer as _;
                let signing_key =
                    p521::ecdsa::SigningKey::from(ecdsa::SigningKey::<p521::NistP521>::from(
                        sk.clone(),
                    ));
                let signature: p521::ecdsa::Signature = signing_key.sign(msg);
                Ok(signature.to_bytes().to_vec())
            }
            SecretKey::Ed25519(sk) => {
                use ed25519_dalek::Signer as _;
                Ok(sk.sign(msg).to_bytes().to_vec())
            }
        }
    }

    /// ECDH key agreement against a peer public key. P-256 only — the sole
    /// key-agreement curve the encrypted response path uses.
    ///
    /// # Errors
    ///
    /// Returns an error for non-P-256 keys or an invalid peer key.
    pub fn ecdh(&self, peer: &PublicKeyJwk) -> Result<Vec<u8>> {
        let SecretKey::P256(sk) = &self.secret else {
            return Err(anyhow!("key agreement requires a P-256 key"));
        };
        let sec1 = peer.to_sec1().map_err(|e| anyhow!("invalid peer key: {e}"))?;
        let peer_pub = p256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|e| anyhow!("invalid peer key: {e}"))?;
        let shared =
            p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), peer_pub.as_affine());
        Ok(shared.raw_secret_bytes().to_vec())
    }
}

impl Signer for KeyMaterial {
    fn algorithm(&self) -> Algorithm {
        match self.curve() {
            Curve::P256 => Algorithm::ES256,
            Curve::P384 => Algorithm::ES384,
            Curve::P521 => Algorithm::ES512,
            Curve::Ed25519 => Algorithm::EdDSA,
        }
    }

    fn verification_method(&self) -> String {
        self.key_id().unwrap_or_default()
    }

    fn public_jwk(&self) -> PublicKeyJwk {
        Self::public_jwk(self)
    }

    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        self.sign(msg)
    }
}

fn ec_jwk(crv: &str, x: &[u8], y: &[u8]) -> PublicKeyJwk {
    PublicKeyJwk {
        kty: "EC".to_string(),
        crv: crv.to_string(),
        x: Base64UrlUnpadded::encode_string(x),
        y: Some(Base64UrlUnpadded::encode_string(y)),
        ..PublicKeyJwk::default()
    }
}

/// Digest algorithms for status lists, disclosures, and transcripts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,

    /// SHA-384.
    Sha384,

    /// SHA-512.
    Sha512,
}

/// Compute a digest over the given bytes.
#[must_use]
pub fn digest(alg: DigestAlgorithm, bytes: &[u8]) -> Vec<u8> {
    match alg {
        DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
        DigestAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        for curve in [Curve::P256, Curve::P384, Curve::Ed25519] {
            let key = KeyMaterial::generate(curve);
            let msg = b"the quick brown fox";
            let sig = key.sign(msg).expect("should sign");
            key.public_jwk().verify(msg, &sig).expect("should verify");

            // flip one byte, verification must fail
            let mut bad = sig.clone();
            bad[0] ^= 0x01;
            assert!(key.public_jwk().verify(msg, &bad).is_err());
        }
    }

    #[test]
    fn ecdh_agrees() {
        let a = KeyMaterial::generate(Curve::P256);
        let b = KeyMaterial::generate(Curve::P256);
        let z1 = a.ecdh(&b.public_jwk()).expect("should agree");
        let z2 = b.ecdh(&a.public_jwk()).expect("should agree");
        assert_eq!(z1, z2);
        assert_eq!(z1.len(), 32);
    }

    #[test]
    fn key_id_is_stable() {
        let key = KeyMaterial::generate(Curve::P256);
        assert_eq!(key.key_id().unwrap(), key.key_id().unwrap());
    }
}
