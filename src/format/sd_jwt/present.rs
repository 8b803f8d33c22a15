//! SD-JWT presentation: selecting disclosures and producing the Key Binding
//! JWT.

use chrono::Utc;

use crate::format::sd_jwt::{Disclosure, KbJwtClaims, SdJwtParts, digest_b64};
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::{Error, Result};

/// Build an SD-JWT presentation: the issued credential with a chosen subset
/// of disclosures and a Key Binding JWT.
#[derive(Debug)]
pub struct SdJwtPresentationBuilder<C, V, S> {
    credential: C,
    verifier: V,
    disclose: Vec<String>,
    nonce: Option<String>,
    signer: S,
}

/// Builder has no credential.
#[doc(hidden)]
pub struct NoCredential;
/// Builder has a credential.
#[doc(hidden)]
pub struct HasCredential(SdJwtParts);

/// Builder has no verifier.
#[doc(hidden)]
pub struct NoVerifier;
/// Builder has a verifier.
#[doc(hidden)]
pub struct HasVerifier(String);

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for SdJwtPresentationBuilder<NoCredential, NoVerifier, NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl SdJwtPresentationBuilder<NoCredential, NoVerifier, NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            credential: NoCredential,
            verifier: NoVerifier,
            disclose: vec![],
            nonce: None,
            signer: NoSigner,
        }
    }
}

impl<V, S> SdJwtPresentationBuilder<NoCredential, V, S> {
    /// The issued SD-JWT (tilde-separated, with its full disclosure set).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the serialization cannot be split.
    pub fn credential(
        self, serialized: &str,
    ) -> Result<SdJwtPresentationBuilder<HasCredential, V, S>> {
        Ok(SdJwtPresentationBuilder {
            credential: HasCredential(SdJwtParts::parse(serialized)?),
            verifier: self.verifier,
            disclose: self.disclose,
            nonce: self.nonce,
            signer: self.signer,
        })
    }
}

impl<C, S> SdJwtPresentationBuilder<C, NoVerifier, S> {
    /// The verifier's client identifier — the KB-JWT audience.
    pub fn verifier(self, verifier: impl Into<String>) -> SdJwtPresentationBuilder<C, HasVerifier, S> {
        SdJwtPresentationBuilder {
            credential: self.credential,
            verifier: HasVerifier(verifier.into()),
            disclose: self.disclose,
            nonce: self.nonce,
            signer: self.signer,
        }
    }
}

impl<C, V, S> SdJwtPresentationBuilder<C, V, S> {
    /// Select a claim to disclose, by name. Claims not selected stay
    /// withheld.
    #[must_use]
    pub fn disclose(mut self, claim_name: impl Into<String>) -> Self {
        self.disclose.push(claim_name.into());
        self
    }

    /// The verifier's challenge nonce.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

impl<C, V> SdJwtPresentationBuilder<C, V, NoSigner> {
    /// Set the holder's Signer — the key named by the credential's `cnf`.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> SdJwtPresentationBuilder<C, V, HasSigner<'_, S>> {
        SdJwtPresentationBuilder {
            credential: self.credential,
            verifier: self.verifier,
            disclose: self.disclose,
            nonce: self.nonce,
            signer: HasSigner(signer),
        }
    }
}

impl<S: Signer> SdJwtPresentationBuilder<HasCredential, HasVerifier, HasSigner<'_, S>> {
    /// Build the presentation:
    /// `<Issuer-signed JWT>~<Disclosure i1>~…~<KB-JWT>`.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected claim has no matching disclosure or
    /// signing fails.
    pub async fn build(self) -> Result<String> {
        let issued = self.credential.0;

        // 1. choose the disclosure subset
        let mut chosen = vec![];
        for name in &self.disclose {
            let found = issued.disclosures.iter().find(|encoded| {
                Disclosure::from_encoded(encoded)
                    .is_ok_and(|d| d.name.as_deref() == Some(name.as_str()))
            });
            let Some(encoded) = found else {
                return Err(Error::Usage(format!("no disclosure for claim: {name}")));
            };
            chosen.push(encoded.clone());
        }

        let presented = SdJwtParts {
            issuer_jwt: issued.issuer_jwt,
            disclosures: chosen,
            key_binding_jwt: None,
        };

        // 2. key binding JWT over the exact presentation prefix
        let claims = KbJwtClaims {
            nonce: self.nonce.unwrap_or_default(),
            aud: self.verifier.0,
            iat: Utc::now(),
            sd_hash: digest_b64(&presented.sd_hash_input()),
        };
        let kb_jwt = jws::encode_jwk(JwsType::KbJwt, &claims, self.signer.0).await?;

        // 3. assemble
        Ok(format!("{}{kb_jwt}", presented.sd_hash_input()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::format::sd_jwt::SdJwtBuilder;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn subset_presented() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let holder_key = KeyMaterial::generate(Curve::P256);

        let issued = SdJwtBuilder::new()
            .issuer("https://issuer.example")
            .claims(
                json!({"given-name": "Erika", "family-name": "Mustermann", "age-over-18": true})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .disclosable("given-name")
            .disclosable("family-name")
            .disclosable("age-over-18")
            .holder_jwk(holder_key.public_jwk())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let presentation = SdJwtPresentationBuilder::new()
            .credential(&issued)
            .expect("should parse")
            .verifier("https://verifier.example/rp1")
            .disclose("age-over-18")
            .nonce("n2")
            .signer(&holder_key)
            .build()
            .await
            .expect("should present");

        let parts = SdJwtParts::parse(&presentation).expect("should parse");
        assert_eq!(parts.disclosures.len(), 1);
        assert!(parts.key_binding_jwt.is_some());

        // sd_hash commits to the prefix including the trailing tilde
        let kb = crate::jose::jws::decode_unverified::<KbJwtClaims>(
            parts.key_binding_jwt.as_ref().unwrap(),
        )
        .expect("should decode");
        assert_eq!(kb.claims.sd_hash, digest_b64(&parts.sd_hash_input()));
        assert_eq!(kb.claims.aud, "https://verifier.example/rp1");
    }
}
