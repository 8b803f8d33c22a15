//! # W3C Verifiable Credentials
//!
//! The W3C [Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model)
//! secured as a compact JWT ("VC-JWT"). The JWT registered claims mirror
//! fields of the embedded `vc` object; both directions of that mirroring are
//! enforced.

mod issue;
mod present;
mod verify;

use chrono::serde::{ts_seconds, ts_seconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};
use crate::{Error, Result};

pub use self::issue::W3cVcBuilder;
pub use self::present::W3cVpBuilder;
pub use self::verify::{VerifiedVc, VerifiedVp, verify, verify_presentation};

/// A W3C Verifiable Credential.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    /// The JSON-LD contexts the credential conforms to.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// URI uniquely identifying the credential. Mirrored by the JWT `jti`
    /// claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Credential types; `VerifiableCredential` plus the specific type.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// The issuer identifier. Mirrored by the JWT `iss` claim.
    pub issuer: Kind<CredentialIssuer>,

    /// When the credential becomes valid. Mirrored by the JWT `nbf` claim.
    #[serde(with = "ts_seconds")]
    pub issuance_date: DateTime<Utc>,

    /// When the credential ceases to be valid. Mirrored by the JWT `exp`
    /// claim when present.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,

    /// The entity (or entities) the claims are about.
    pub credential_subject: OneMany<CredentialSubject>,

    /// How to determine the credential's revocation status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,
}

impl Default for VerifiableCredential {
    fn default() -> Self {
        Self {
            context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
            id: None,
            type_: OneMany::One("VerifiableCredential".to_string()),
            issuer: Kind::String(String::new()),
            issuance_date: DateTime::UNIX_EPOCH,
            expiration_date: None,
            credential_subject: OneMany::One(CredentialSubject::default()),
            credential_status: None,
        }
    }
}

/// An issuer expressed as an object rather than a bare URI.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialIssuer {
    /// The issuer URI.
    pub id: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Claims about a credential subject.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialSubject {
    /// The subject identifier — here, the holder's key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The claims themselves.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// A pointer into a status list for revocation checking.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    /// Identifier for this status entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Status mechanism type.
    #[serde(rename = "type")]
    pub type_: String,

    /// URL of the status list credential.
    pub status_list_credential: String,

    /// This credential's position in the list.
    pub status_list_index: String,
}

impl CredentialStatus {
    /// A revocation-list entry at the given index.
    #[must_use]
    pub fn new(list_url: impl Into<String>, index: usize) -> Self {
        Self {
            id: None,
            type_: "RevocationList2021Status".to_string(),
            status_list_credential: list_url.into(),
            status_list_index: index.to_string(),
        }
    }

    /// The numeric list index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] when the index is not a number.
    pub fn index(&self) -> Result<usize> {
        self.status_list_index
            .parse()
            .map_err(|e| Error::InvalidStructure(format!("invalid status list index: {e}")))
    }
}

/// The JWT claims set of a VC-JWT.
///
/// Registered claims mirror the `vc` content: `jti == vc.id`,
/// `iss == vc.issuer`, `nbf == vc.issuanceDate`, `exp == vc.expirationDate`
/// (when present), and `sub` names the holder's key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct W3cVcClaims {
    /// The credential issuer.
    pub iss: String,

    /// The holder's key identifier.
    pub sub: String,

    /// Not valid before.
    #[serde(with = "ts_seconds")]
    pub nbf: DateTime<Utc>,

    /// Expiry.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub exp: Option<DateTime<Utc>>,

    /// The credential identifier.
    pub jti: String,

    /// The credential itself.
    pub vc: VerifiableCredential,
}

impl W3cVcClaims {
    /// Lift a credential into its JWT claims form for the given holder.
    #[must_use]
    pub fn new(vc: VerifiableCredential, holder_id: impl Into<String>) -> Self {
        Self {
            iss: match &vc.issuer {
                Kind::String(iss) => iss.clone(),
                Kind::Object(issuer) => issuer.id.clone(),
            },
            sub: holder_id.into(),
            nbf: vc.issuance_date,
            exp: vc.expiration_date,
            jti: vc.id.clone().unwrap_or_default(),
            vc,
        }
    }

    /// Check the registered claims agree with the embedded `vc` object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] naming the first mismatching
    /// claim.
    pub fn check_consistency(&self) -> Result<()> {
        let vc_issuer = match &self.vc.issuer {
            Kind::String(iss) => iss.as_str(),
            Kind::Object(issuer) => issuer.id.as_str(),
        };
        if self.iss != vc_issuer {
            return Err(Error::InvalidStructure("iss != vc.issuer".to_string()));
        }
        if self.jti != self.vc.id.clone().unwrap_or_default() {
            return Err(Error::InvalidStructure("jti != vc.id".to_string()));
        }
        if self.nbf != self.vc.issuance_date {
            return Err(Error::InvalidStructure("nbf != vc.issuanceDate".to_string()));
        }
        if let Some(exp) = self.vc.expiration_date {
            if self.exp != Some(exp) {
                return Err(Error::InvalidStructure("exp != vc.expirationDate".to_string()));
            }
        }
        Ok(())
    }
}

/// A W3C Verifiable Presentation wrapping one or more VC-JWTs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiablePresentation {
    /// The JSON-LD contexts the presentation conforms to.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Presentation types.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// The presented credentials, each a compact VC-JWT.
    pub verifiable_credential: Vec<String>,
}

impl Default for VerifiablePresentation {
    fn default() -> Self {
        Self {
            context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
            type_: OneMany::One("VerifiablePresentation".to_string()),
            verifiable_credential: vec![],
        }
    }
}

/// The JWT claims set of a `jwt_vp` presentation. The holder signs these
/// with the key the presented credentials are bound to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct W3cVpClaims {
    /// The holder.
    pub iss: String,

    /// The verifier's client identifier.
    pub aud: String,

    /// The verifier's challenge, binding presentation to request.
    pub nonce: String,

    /// Issuance instant of the presentation.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// Presentation identifier.
    pub jti: String,

    /// The presentation itself.
    pub vp: VerifiablePresentation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_mirror_vc() {
        let vc = VerifiableCredential {
            id: Some("https://issuer.example/credentials/1".to_string()),
            issuer: Kind::String("https://issuer.example".to_string()),
            issuance_date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            ..VerifiableCredential::default()
        };

        let claims = W3cVcClaims::new(vc, "holder-key-id");
        claims.check_consistency().expect("claims mirror vc");
        assert_eq!(claims.jti, "https://issuer.example/credentials/1");
        assert_eq!(claims.sub, "holder-key-id");
    }

    #[test]
    fn mismatch_detected() {
        let vc = VerifiableCredential {
            id: Some("urn:a".to_string()),
            issuer: Kind::String("https://issuer.example".to_string()),
            ..VerifiableCredential::default()
        };
        let mut claims = W3cVcClaims::new(vc, "holder");
        claims.jti = "urn:b".to_string();

        let err = claims.check_consistency().expect_err("jti mismatch");
        assert!(err.to_string().contains("jti"));
    }
}
