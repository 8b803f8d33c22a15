//! JSON Web Algorithms [RFC7518] identifiers used across JWS and JWE.
//!
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Digital signature algorithms, as registered in the IANA "JSON Web
/// Signature and Encryption Algorithms" registry.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Algorithm {
    /// ECDSA using P-256 and SHA-256.
    #[default]
    ES256,

    /// ECDSA using P-384 and SHA-384.
    ES384,

    /// ECDSA using P-521 and SHA-512.
    ES512,

    /// EdDSA using Ed25519.
    EdDSA,

    /// RSASSA-PSS using SHA-256. Carried for wire compatibility; the
    /// in-memory key provider does not implement it.
    PS256,

    /// RSASSA-PKCS1-v1_5 using SHA-256 (legacy). Wire compatibility only.
    RS256,
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Key-management algorithms supported for JWE.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum KeyManagement {
    /// ECDH-ES with the derived key used directly as the CEK.
    #[default]
    #[serde(rename = "ECDH-ES")]
    EcdhEs,
}

/// Content-encryption algorithms supported for JWE.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ContentEncryption {
    /// AES GCM with a 128-bit key.
    A128GCM,

    /// AES GCM with a 192-bit key.
    A192GCM,

    /// AES GCM with a 256-bit key.
    #[default]
    A256GCM,

    /// AES CBC + HMAC SHA-256 composite.
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,

    /// AES CBC + HMAC SHA-384 composite.
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,

    /// AES CBC + HMAC SHA-512 composite.
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
}

impl ContentEncryption {
    /// The IANA name, which doubles as the Concat-KDF `AlgorithmID`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A128GCM => "A128GCM",
            Self::A192GCM => "A192GCM",
            Self::A256GCM => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// Content-encryption key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::A128GCM => 16,
            Self::A192GCM => 24,
            Self::A256GCM | Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
        }
    }

    /// Authentication tag length in bytes.
    #[must_use]
    pub const fn tag_len(self) -> usize {
        match self {
            Self::A128GCM | Self::A192GCM | Self::A256GCM | Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
        }
    }

    /// Initialization vector length in bytes.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        match self {
            Self::A128GCM | Self::A192GCM | Self::A256GCM => 12,
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => 16,
        }
    }

    /// Whether this is a CBC + HMAC composite algorithm.
    #[must_use]
    pub const fn is_cbc_hmac(self) -> bool {
        matches!(self, Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512)
    }
}

impl Display for ContentEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
