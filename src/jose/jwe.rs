//! # JSON Web Encryption (JWE)
//!
//! ECDH-ES direct key agreement ([RFC7518] §4.6) with the content-encryption
//! algorithms the OpenID4VP `direct_post.jwt` response mode uses. The CEK is
//! derived with the Concat KDF (SHA-256) and used directly; the compact
//! serialization therefore carries an empty `encrypted_key` segment.
//!
//! [RFC7516]: https://www.rfc-editor.org/rfc/rfc7516
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::AesGcm;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::core::generate;
use crate::jose::jwa::{ContentEncryption, KeyManagement};
use crate::jose::jwk::PublicKeyJwk;
use crate::key::KeyMaterial;
use crate::{Error, Result};

/// JWE protected header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct JweHeader {
    /// Key management algorithm.
    pub alg: KeyManagement,

    /// Content encryption algorithm.
    pub enc: ContentEncryption,

    /// The ephemeral public key contributed by the producer.
    pub epk: PublicKeyJwk,

    /// Agreement PartyUInfo — producer information. OpenID4VP mdoc responses
    /// carry the wallet-generated nonce here, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,

    /// Agreement PartyVInfo — recipient information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,
}

/// A parsed compact JWE, prior to decryption.
#[derive(Clone, Debug)]
pub struct Jwe {
    /// The decoded protected header.
    pub header: JweHeader,

    header_b64: String,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl Jwe {
    /// Parse a compact serialization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed serialization.
    pub fn from_compact(compact: &str) -> Result<Self> {
        let parts = compact.split('.').collect::<Vec<&str>>();
        if parts.len() != 5 {
            return Err(Error::Parse("invalid compact JWE format".to_string()));
        }
        if !parts[1].is_empty() {
            return Err(Error::Parse("unexpected encrypted_key for ECDH-ES".to_string()));
        }

        let header_bytes = Base64UrlUnpadded::decode_vec(parts[0])
            .map_err(|e| Error::Parse(format!("issue decoding header: {e}")))?;
        let header = serde_json::from_slice(&header_bytes)
            .map_err(|e| Error::Parse(format!("issue deserializing header: {e}")))?;

        let decode = |segment: &str, what: &str| {
            Base64UrlUnpadded::decode_vec(segment)
                .map_err(|e| Error::Parse(format!("issue decoding {what}: {e}")))
        };

        Ok(Self {
            header,
            header_b64: parts[0].to_string(),
            iv: decode(parts[2], "iv")?,
            ciphertext: decode(parts[3], "ciphertext")?,
            tag: decode(parts[4], "tag")?,
        })
    }

    /// The producer's `apu` (Agreement PartyUInfo), decoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for invalid base64.
    pub fn apu_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.header.apu.as_deref().map_or(Ok(None), |apu| {
            Base64UrlUnpadded::decode_vec(apu)
                .map(Some)
                .map_err(|e| Error::Parse(format!("issue decoding apu: {e}")))
        })
    }

    /// Decrypt with the recipient's static key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] when the authentication tag does
    /// not verify, [`Error::UnsupportedAlgorithm`] for unusable headers.
    pub fn decrypt(&self, recipient: &KeyMaterial) -> Result<Vec<u8>> {
        let z = recipient
            .ecdh(&self.header.epk)
            .map_err(|e| Error::InvalidStructure(format!("key agreement failed: {e}")))?;
        let cek = derive_cek(&z, &self.header)?;

        // AAD is the ASCII bytes of the received header segment
        let aad = self.header_b64.as_bytes();
        let enc = self.header.enc;

        if enc.is_cbc_hmac() {
            decrypt_cbc_hmac(enc, &cek, &self.iv, aad, &self.ciphertext, &self.tag)
        } else {
            decrypt_gcm(enc, &cek, &self.iv, aad, &self.ciphertext, &self.tag)
        }
    }
}

/// Encrypt a payload to the recipient's public key, returning the compact
/// serialization.
///
/// `apu`, when given, is carried base64url-encoded in the header and mixed
/// into the KDF as PartyUInfo.
///
/// # Errors
///
/// Returns an error when key agreement or encryption fails.
pub fn encrypt(
    payload: &[u8], recipient: &PublicKeyJwk, enc: ContentEncryption, apu: Option<&[u8]>,
    apv: Option<&[u8]>,
) -> Result<String> {
    tracing::debug!("encrypt");

    // fresh ephemeral key per message
    let ephemeral = p256::SecretKey::random(&mut OsRng);
    let point = ephemeral.public_key().to_encoded_point(false);
    let epk = PublicKeyJwk {
        kty: "EC".to_string(),
        crv: "P-256".to_string(),
        x: Base64UrlUnpadded::encode_string(point.x().map_or(&[], |x| x)),
        y: Some(Base64UrlUnpadded::encode_string(point.y().map_or(&[], |y| y))),
        ..PublicKeyJwk::default()
    };

    let header = JweHeader {
        alg: KeyManagement::EcdhEs,
        enc,
        epk,
        apu: apu.map(Base64UrlUnpadded::encode_string),
        apv: apv.map(Base64UrlUnpadded::encode_string),
    };
    let header_b64 = Base64UrlUnpadded::encode_string(
        &serde_json::to_vec(&header).map_err(|e| Error::Parse(format!("issue serializing header: {e}")))?,
    );

    let sec1 = recipient.to_sec1()?;
    let peer = p256::PublicKey::from_sec1_bytes(&sec1)
        .map_err(|e| Error::InvalidStructure(format!("invalid recipient key: {e}")))?;
    let z = p256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), peer.as_affine());
    let cek = derive_cek(z.raw_secret_bytes().as_slice(), &header)?;

    let mut iv = vec![0u8; enc.iv_len()];
    iv.copy_from_slice(&generate::random_bytes::<16>()[..enc.iv_len()]);

    let aad = header_b64.as_bytes();
    let (ciphertext, tag) = if enc.is_cbc_hmac() {
        encrypt_cbc_hmac(enc, &cek, &iv, aad, payload)?
    } else {
        encrypt_gcm(enc, &cek, &iv, aad, payload)?
    };

    Ok(format!(
        "{header_b64}..{}.{}.{}",
        Base64UrlUnpadded::encode_string(&iv),
        Base64UrlUnpadded::encode_string(&ciphertext),
        Base64UrlUnpadded::encode_string(&tag)
    ))
}

/// Concat KDF per RFC 7518 §4.6: SHA-256 over round counter, shared secret,
/// and OtherInfo, repeated until enough key material is produced.
fn derive_cek(z: &[u8], header: &JweHeader) -> Result<Vec<u8>> {
    let key_len = header.enc.key_len();
    let apu = header
        .apu
        .as_deref()
        .map(Base64UrlUnpadded::decode_vec)
        .transpose()
        .map_err(|e| Error::Parse(format!("issue decoding apu: {e}")))?
        .unwrap_or_default();
    let apv = header
        .apv
        .as_deref()
        .map(Base64UrlUnpadded::decode_vec)
        .transpose()
        .map_err(|e| Error::Parse(format!("issue decoding apv: {e}")))?
        .unwrap_or_default();

    let alg_id = header.enc.name().as_bytes();

    let mut other_info = Vec::new();
    let mut push_datum = |datum: &[u8], out: &mut Vec<u8>| {
        out.extend(u32::try_from(datum.len()).unwrap_or(0).to_be_bytes());
        out.extend(datum);
    };
    push_datum(alg_id, &mut other_info);
    push_datum(&apu, &mut other_info);
    push_datum(&apv, &mut other_info);
    other_info.extend(u32::try_from(key_len * 8).unwrap_or(0).to_be_bytes());

    let mut derived = Vec::with_capacity(key_len);
    let mut round: u32 = 1;
    while derived.len() < key_len {
        let mut hasher = Sha256::new();
        hasher.update(round.to_be_bytes());
        hasher.update(z);
        hasher.update(&other_info);
        derived.extend(hasher.finalize());
        round += 1;
    }
    derived.truncate(key_len);
    Ok(derived)
}

type A128 = AesGcm<aes::Aes128, U12>;
type A192 = AesGcm<aes::Aes192, U12>;
type A256 = AesGcm<aes::Aes256, U12>;

fn encrypt_gcm(
    enc: ContentEncryption, cek: &[u8], iv: &[u8], aad: &[u8], payload: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let nonce = aes_gcm::Nonce::from_slice(iv);
    let msg = Payload { msg: payload, aad };
    let sealed = match enc {
        ContentEncryption::A128GCM => A128::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .encrypt(nonce, msg),
        ContentEncryption::A192GCM => A192::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .encrypt(nonce, msg),
        ContentEncryption::A256GCM => A256::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .encrypt(nonce, msg),
        _ => return Err(Error::UnsupportedAlgorithm(format!("not a GCM algorithm: {enc}"))),
    }
    .map_err(|_| Error::InvalidStructure("encryption failed".to_string()))?;

    // the AEAD implementation appends the 16-byte tag
    let split = sealed.len() - 16;
    Ok((sealed[..split].to_vec(), sealed[split..].to_vec()))
}

fn decrypt_gcm(
    enc: ContentEncryption, cek: &[u8], iv: &[u8], aad: &[u8], ciphertext: &[u8], tag: &[u8],
) -> Result<Vec<u8>> {
    let mut sealed = ciphertext.to_vec();
    sealed.extend(tag);
    let nonce = aes_gcm::Nonce::from_slice(iv);
    let msg = Payload { msg: &sealed, aad };

    let opened = match enc {
        ContentEncryption::A128GCM => A128::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .decrypt(nonce, msg),
        ContentEncryption::A192GCM => A192::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .decrypt(nonce, msg),
        ContentEncryption::A256GCM => A256::new_from_slice(cek)
            .map_err(|e| Error::InvalidStructure(format!("bad key length: {e}")))?
            .decrypt(nonce, msg),
        _ => return Err(Error::UnsupportedAlgorithm(format!("not a GCM algorithm: {enc}"))),
    };

    opened.map_err(|_| Error::InvalidSignature("authentication tag mismatch".to_string()))
}

/// Composite key rule: the first half of the derived key is the HMAC key,
/// the second half the AES-CBC key. The tag is the leading half of the HMAC
/// over `AAD || IV || CT || bitlen(AAD)`.
fn encrypt_cbc_hmac(
    enc: ContentEncryption, cek: &[u8], iv: &[u8], aad: &[u8], payload: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let half = cek.len() / 2;
    let (mac_key, enc_key) = cek.split_at(half);

    let ciphertext = match enc {
        ContentEncryption::A128CbcHs256 => cbc::Encryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(payload),
        ContentEncryption::A192CbcHs384 => cbc::Encryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(payload),
        ContentEncryption::A256CbcHs512 => cbc::Encryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(payload),
        _ => return Err(Error::UnsupportedAlgorithm(format!("not a CBC-HS algorithm: {enc}"))),
    };

    let tag = cbc_hmac_tag(enc, mac_key, aad, iv, &ciphertext)?;
    Ok((ciphertext, tag))
}

fn decrypt_cbc_hmac(
    enc: ContentEncryption, cek: &[u8], iv: &[u8], aad: &[u8], ciphertext: &[u8], tag: &[u8],
) -> Result<Vec<u8>> {
    let half = cek.len() / 2;
    let (mac_key, enc_key) = cek.split_at(half);

    let expected = cbc_hmac_tag(enc, mac_key, aad, iv, ciphertext)?;
    // tag comparison must not short-circuit
    let mut diff = expected.len() ^ tag.len();
    for (a, b) in expected.iter().zip(tag.iter()) {
        diff |= usize::from(a ^ b);
    }
    if diff != 0 {
        return Err(Error::InvalidSignature("authentication tag mismatch".to_string()));
    }

    let opened = match enc {
        ContentEncryption::A128CbcHs256 => cbc::Decryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        ContentEncryption::A192CbcHs384 => cbc::Decryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        ContentEncryption::A256CbcHs512 => cbc::Decryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .map_err(|e| Error::InvalidStructure(format!("bad key/iv length: {e}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => return Err(Error::UnsupportedAlgorithm(format!("not a CBC-HS algorithm: {enc}"))),
    };

    opened.map_err(|_| Error::Parse("invalid padding".to_string()))
}

fn cbc_hmac_tag(
    enc: ContentEncryption, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let aad_bits = (u64::try_from(aad.len()).unwrap_or(0) * 8).to_be_bytes();

    macro_rules! hmac_tag {
        ($digest:ty) => {{
            let mut mac = <Hmac<$digest> as Mac>::new_from_slice(mac_key)
                .map_err(|e| Error::InvalidStructure(format!("bad mac key length: {e}")))?;
            mac.update(aad);
            mac.update(iv);
            mac.update(ciphertext);
            mac.update(&aad_bits);
            mac.finalize().into_bytes().to_vec()
        }};
    }

    let full = match enc {
        ContentEncryption::A128CbcHs256 => hmac_tag!(Sha256),
        ContentEncryption::A192CbcHs384 => hmac_tag!(Sha384),
        ContentEncryption::A256CbcHs512 => hmac_tag!(Sha512),
        _ => return Err(Error::UnsupportedAlgorithm(format!("not a CBC-HS algorithm: {enc}"))),
    };

    Ok(full[..enc.tag_len()].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Curve;

    #[test]
    fn gcm_round_trip() {
        let recipient = KeyMaterial::generate(Curve::P256);
        let payload = br#"{"vp_token": "eyJ..."}"#;

        let compact = encrypt(
            payload,
            &recipient.public_jwk(),
            ContentEncryption::A256GCM,
            Some(b"mdoc-nonce"),
            None,
        )
        .expect("should encrypt");

        let jwe = Jwe::from_compact(&compact).expect("should parse");
        assert_eq!(jwe.apu_bytes().unwrap().as_deref(), Some(b"mdoc-nonce".as_slice()));

        let opened = jwe.decrypt(&recipient).expect("should decrypt");
        assert_eq!(opened, payload);
    }

    #[test]
    fn cbc_hmac_round_trip() {
        for enc in [
            ContentEncryption::A128CbcHs256,
            ContentEncryption::A192CbcHs384,
            ContentEncryption::A256CbcHs512,
        ] {
            let recipient = KeyMaterial::generate(Curve::P256);
            let compact =
                encrypt(b"secret payload", &recipient.public_jwk(), enc, None, None)
                    .expect("should encrypt");
            let jwe = Jwe::from_compact(&compact).expect("should parse");
            assert_eq!(jwe.decrypt(&recipient).expect("should decrypt"), b"secret payload");
        }
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let recipient = KeyMaterial::generate(Curve::P256);
        let compact = encrypt(b"payload", &recipient.public_jwk(), ContentEncryption::A256GCM, None, None)
            .expect("should encrypt");

        let mut parts: Vec<String> = compact.split('.').map(ToString::to_string).collect();
        let mut ct = Base64UrlUnpadded::decode_vec(&parts[3]).unwrap();
        ct[0] ^= 0x01;
        parts[3] = Base64UrlUnpadded::encode_string(&ct);

        let jwe = Jwe::from_compact(&parts.join(".")).expect("should parse");
        assert!(matches!(jwe.decrypt(&recipient), Err(Error::InvalidSignature(_))));
    }
}
