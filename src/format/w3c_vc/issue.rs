//! VC-JWT issuance.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};
use crate::format::w3c_vc::{
    CredentialStatus, CredentialSubject, VerifiableCredential, W3cVcClaims,
};
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::{Error, Result};

/// Generate a `jwt_vc_json` format credential.
#[derive(Debug)]
pub struct W3cVcBuilder<S> {
    vc: VerifiableCredential,
    holder_id: Option<String>,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for W3cVcBuilder<NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl W3cVcBuilder<NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vc: VerifiableCredential { issuance_date: Utc::now(), ..VerifiableCredential::default() },
            holder_id: None,
            signer: NoSigner,
        }
    }

    /// Set the credential Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> W3cVcBuilder<HasSigner<'_, S>> {
        W3cVcBuilder { vc: self.vc, holder_id: self.holder_id, signer: HasSigner(signer) }
    }
}

impl<S> W3cVcBuilder<S> {
    /// Sets the `id` property.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.vc.id = Some(id.into());
        self
    }

    /// Adds a credential type alongside `VerifiableCredential`.
    #[must_use]
    pub fn add_type(mut self, type_: impl Into<String>) -> Self {
        self.vc.type_.add(type_.into());
        self
    }

    /// Sets the `issuer` property.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.vc.issuer = Kind::String(issuer.into());
        self
    }

    /// The holder's key identifier: becomes both `credentialSubject.id` and
    /// the JWT `sub`.
    #[must_use]
    pub fn holder(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = Some(holder_id.into());
        self
    }

    /// Sets the subject claims.
    #[must_use]
    pub fn claims(mut self, claims: Map<String, Value>) -> Self {
        self.vc.credential_subject = OneMany::One(CredentialSubject { id: None, claims });
        self
    }

    /// Sets the issuance date (defaults to now).
    #[must_use]
    pub const fn issuance_date(mut self, date: DateTime<Utc>) -> Self {
        self.vc.issuance_date = date;
        self
    }

    /// Sets the expiration date.
    #[must_use]
    pub const fn expiration_date(mut self, date: DateTime<Utc>) -> Self {
        self.vc.expiration_date = Some(date);
        self
    }

    /// Sets the `credentialStatus` property.
    #[must_use]
    pub fn status(mut self, status: CredentialStatus) -> Self {
        self.vc.credential_status = Some(status);
        self
    }
}

impl<S: Signer> W3cVcBuilder<HasSigner<'_, S>> {
    /// Build the credential, returning a compact VC-JWT.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or signing fails.
    pub async fn build(self) -> Result<String> {
        let Some(holder_id) = self.holder_id else {
            return Err(Error::Usage("holder is required".to_string()));
        };
        let mut vc = self.vc;
        if vc.id.is_none() {
            vc.id = Some(format!("urn:uuid:{}", uuid::Uuid::new_v4()));
        }
        if let OneMany::One(subject) = &mut vc.credential_subject {
            subject.id = Some(holder_id.clone());
        }

        let claims = W3cVcClaims::new(vc, holder_id);
        jws::encode(JwsType::Jwt, &claims, self.signer.0).await
    }
}
