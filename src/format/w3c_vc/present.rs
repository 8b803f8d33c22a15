//! `jwt_vp` presentation building.

use chrono::Utc;

use crate::format::w3c_vc::{VerifiablePresentation, W3cVpClaims};
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::{Error, Result};

/// Build a `jwt_vp` presentation wrapping VC-JWTs.
#[derive(Debug)]
pub struct W3cVpBuilder<S> {
    credentials: Vec<String>,
    verifier: Option<String>,
    nonce: Option<String>,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for W3cVpBuilder<NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl W3cVpBuilder<NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self { credentials: vec![], verifier: None, nonce: None, signer: NoSigner }
    }

    /// Set the holder's Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> W3cVpBuilder<HasSigner<'_, S>> {
        W3cVpBuilder {
            credentials: self.credentials,
            verifier: self.verifier,
            nonce: self.nonce,
            signer: HasSigner(signer),
        }
    }
}

impl<S> W3cVpBuilder<S> {
    /// Add a credential to present.
    #[must_use]
    pub fn add_credential(mut self, vc_jwt: impl Into<String>) -> Self {
        self.credentials.push(vc_jwt.into());
        self
    }

    /// The verifier's client identifier (`aud`).
    #[must_use]
    pub fn verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = Some(verifier.into());
        self
    }

    /// The verifier's challenge nonce.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

impl<S: Signer> W3cVpBuilder<HasSigner<'_, S>> {
    /// Build the presentation, returning a compact JWT with the holder's
    /// public key embedded for verification.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or signing fails.
    pub async fn build(self) -> Result<String> {
        let Some(verifier) = self.verifier else {
            return Err(Error::Usage("verifier is required".to_string()));
        };
        if self.credentials.is_empty() {
            return Err(Error::Usage("at least one credential is required".to_string()));
        }

        let claims = W3cVpClaims {
            iss: self.signer.0.verification_method(),
            aud: verifier,
            nonce: self.nonce.unwrap_or_default(),
            iat: Utc::now(),
            jti: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            vp: VerifiablePresentation {
                verifiable_credential: self.credentials,
                ..VerifiablePresentation::default()
            },
        };

        jws::encode_jwk(JwsType::Jwt, &claims, self.signer.0).await
    }
}
