//! # IETF SD-JWT-based Credential Format
//!
//! Encompasses data formats as well as validation and processing rules to
//! express Verifiable Credentials with JSON payloads with and without
//! selective disclosure based on the SD-JWT [I-D.ietf-oauth-sd-jwt-vc]
//! format.
//!
//! [I-D.ietf-oauth-sd-jwt-vc]: https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-17.html

mod issue;
mod present;
mod verify;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::serde::{ts_seconds, ts_seconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::core::generate;
use crate::jose::jwk::PublicKeyJwk;
use crate::{Error, Result};

pub use self::issue::SdJwtBuilder;
pub use self::present::SdJwtPresentationBuilder;
pub use self::verify::{KeyBindingCheck, VerifiedSdJwt, verify};

/// Claims that can be included in the payload of SD-JWT VCs.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SdJwtClaims {
    /// Digests of selective disclosure claims. Each digest is a hash (using
    /// `_sd_alg` hashing algorithm) of the base64url-encoded Disclosure.
    #[serde(rename = "_sd")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sd: Vec<String>,

    /// Algorithm used to generate `_sd` digests. A default of `sha-256` is
    /// used when not set.
    #[serde(rename = "_sd_alg")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd_alg: Option<String>,

    /// The type of Verifiable Credential represented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,

    /// The Issuer (as a URI) of the Verifiable Credential.
    pub iss: String,

    /// The time of issuance of the Verifiable Credential.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<DateTime<Utc>>,

    /// The time before which the Verifiable Credential must not be accepted.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<DateTime<Utc>>,

    /// The expiry time of the Verifiable Credential.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,

    /// The identifier of the Subject of the Verifiable Credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Contains the public key the Key Binding JWT must be secured with,
    /// provided by the Wallet via proof-of-possession of key material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<KeyBinding>,

    /// The information on how to read the status of the Verifiable
    /// Credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    /// Claims not selectively disclosable, passed through in clear.
    #[serde(flatten)]
    pub claims: serde_json::Map<String, Value>,
}

/// The type of binding between the SD-JWT and the public key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyBinding {
    /// The public key is bound to the SD-JWT using a JWK.
    Jwk(PublicKeyJwk),
}

impl KeyBinding {
    /// The bound JWK.
    pub const fn jwk(&self) -> &PublicKeyJwk {
        match self {
            Self::Jwk(jwk) => jwk,
        }
    }
}

/// Key Binding JWT claims, used in SD-JWT presentations when requested by
/// the Verifier.
///
/// A Key Binding JWT is "tied to" an SD-JWT when its payload is signed using
/// the key included in the SD-JWT payload, and the KB-JWT contains a hash
/// of the SD-JWT in its `sd_hash` claim.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KbJwtClaims {
    /// The value of nonce from the Authorization Request.
    pub nonce: String,

    /// The Client Identifier of the Verifier.
    pub aud: String,

    /// The time of issuance of the Key Binding JWT.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// The base64url-encoded hash value over the Issuer-signed JWT and the
    /// selected Disclosures.
    pub sd_hash: String,
}

/// A claim disclosure: `[salt, claim name, claim value]`, or
/// `[salt, claim value]` for array elements.
#[derive(Clone, Debug)]
pub struct Disclosure {
    /// The claim name. Absent for array-element disclosures.
    pub name: Option<String>,

    /// The disclosed value.
    pub value: Value,

    salt: String,
}

impl Disclosure {
    /// Create a new object-property disclosure with a fresh salt.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: Some(name.into()), value, salt: generate::salt() }
    }

    /// Create a new array-element disclosure with a fresh salt.
    #[must_use]
    pub fn new_array_element(value: Value) -> Self {
        Self { name: None, value, salt: generate::salt() }
    }

    /// `Base64Url` encode the disclosure as a JSON array of the form
    /// `["<b64 Salt>","<Claim Name>","<Claim Value>"]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding fails.
    pub fn encoded(&self) -> Result<String> {
        let array = match &self.name {
            Some(name) => json!([self.salt, name, self.value]),
            None => json!([self.salt, self.value]),
        };
        let sd_json = serde_json::to_vec(&array)
            .map_err(|e| Error::Parse(format!("issue serializing disclosure: {e}")))?;
        Ok(Base64UrlUnpadded::encode_string(&sd_json))
    }

    /// Generate the disclosure digest: a base64url-encoded hash (using the
    /// `_sd_alg` hashing algorithm) of the encoded Disclosure.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding fails.
    pub fn hashed(&self) -> Result<String> {
        Ok(digest_b64(&self.encoded()?))
    }

    /// Parse an encoded disclosure string back to its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on bad base64 or JSON,
    /// [`Error::InvalidStructure`] on the wrong arity.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let bytes = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::Parse(format!("issue decoding disclosure: {e}")))?;
        let array: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("issue parsing disclosure: {e}")))?;

        match array.as_slice() {
            [Value::String(salt), Value::String(name), value] => {
                Ok(Self { name: Some(name.clone()), value: value.clone(), salt: salt.clone() })
            }
            [Value::String(salt), value] => {
                Ok(Self { name: None, value: value.clone(), salt: salt.clone() })
            }
            _ => Err(Error::InvalidStructure("disclosure is not a 2- or 3-array".to_string())),
        }
    }
}

/// The base64url-encoded SHA-256 digest of an encoded disclosure (or any
/// presentation prefix).
#[must_use]
pub fn digest_b64(ascii: &str) -> String {
    Base64UrlUnpadded::encode_string(Sha256::digest(ascii.as_bytes()).as_slice())
}

/// A parsed tilde-separated SD-JWT presentation:
/// `issuer_jwt ~ d1 ~ d2 ~ … ~ [kb_jwt]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdJwtParts {
    /// The issuer-signed JWT.
    pub issuer_jwt: String,

    /// Encoded disclosures, in presented order.
    pub disclosures: Vec<String>,

    /// The Key Binding JWT, when present.
    pub key_binding_jwt: Option<String>,
}

impl SdJwtParts {
    /// Split a tilde-separated serialization.
    ///
    /// A trailing `~` means no KB-JWT; a final non-empty segment is one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for an empty input.
    pub fn parse(serialized: &str) -> Result<Self> {
        let mut segments: Vec<&str> = serialized.split('~').collect();
        if segments.is_empty() || segments[0].is_empty() {
            return Err(Error::Parse("missing issuer-signed JWT".to_string()));
        }
        if segments.len() == 1 {
            return Err(Error::Parse("not a tilde-separated SD-JWT".to_string()));
        }

        let key_binding_jwt = match segments.last() {
            Some(last) if last.is_empty() => {
                segments.pop();
                None
            }
            Some(last) => {
                let kb = (*last).to_string();
                segments.pop();
                Some(kb)
            }
            None => None,
        };

        Ok(Self {
            issuer_jwt: segments[0].to_string(),
            disclosures: segments[1..].iter().map(ToString::to_string).collect(),
            key_binding_jwt,
        })
    }

    /// The presentation prefix the `sd_hash` commits to:
    /// `issuer_jwt ~ d1 ~ … ~` (trailing tilde included).
    #[must_use]
    pub fn sd_hash_input(&self) -> String {
        let mut input = format!("{}~", self.issuer_jwt);
        for disclosure in &self.disclosures {
            input.push_str(disclosure);
            input.push('~');
        }
        input
    }
}

impl std::fmt::Display for SdJwtParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sd_hash_input())?;
        if let Some(kb) = &self.key_binding_jwt {
            write!(f, "{kb}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disclosure_digest_matches_by_hand() {
        let disclosure = Disclosure::new("age-over-18", json!(true));
        let encoded = disclosure.encoded().expect("should encode");
        assert_eq!(disclosure.hashed().expect("should hash"), digest_b64(&encoded));

        let parsed = Disclosure::from_encoded(&encoded).expect("should parse");
        assert_eq!(parsed.name.as_deref(), Some("age-over-18"));
        assert_eq!(parsed.value, json!(true));
    }

    #[test]
    fn parts_round_trip() {
        let with_kb = SdJwtParts::parse("a.b.c~d1~d2~kb.jwt.sig").expect("should parse");
        assert_eq!(with_kb.disclosures.len(), 2);
        assert_eq!(with_kb.key_binding_jwt.as_deref(), Some("kb.jwt.sig"));
        assert_eq!(with_kb.to_string(), "a.b.c~d1~d2~kb.jwt.sig");

        let without_kb = SdJwtParts::parse("a.b.c~d1~").expect("should parse");
        assert_eq!(without_kb.disclosures.len(), 1);
        assert!(without_kb.key_binding_jwt.is_none());
        assert_eq!(without_kb.to_string(), "a.b.c~d1~");
    }

    #[test]
    fn empty_disclosure_set() {
        let bare = SdJwtParts::parse("a.b.c~").expect("should parse");
        assert!(bare.disclosures.is_empty());
        assert_eq!(bare.sd_hash_input(), "a.b.c~");
    }
}
