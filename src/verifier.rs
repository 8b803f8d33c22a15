//! # Validator
//!
//! Standalone verification of the three presentation formats plus status
//! evaluation, outside the OpenID4VP protocol flow. The protocol engine
//! ([`crate::Openid4VpVerifier`]) drives these same checks per descriptor;
//! this entry point serves callers that already hold a presentation.

use chrono::{DateTime, Utc};

use crate::datetime::Leeway;
use crate::format::mdoc::{
    DeviceBinding, DeviceResponse, TypeCodecRegistry, VerifiedDocument,
};
use crate::format::sd_jwt::{self, KeyBindingCheck, VerifiedSdJwt};
use crate::format::w3c_vc::{self, VerifiedVc, VerifiedVp};
use crate::jose::jwk::PublicKeyJwk;
use crate::provider::Fetcher;
use crate::status::list::check_revocation;
use crate::{Error, Result};

/// A validator configured with issuer trust anchors.
pub struct Validator {
    trust_anchors: Vec<PublicKeyJwk>,
    registry: TypeCodecRegistry,
    leeway: Leeway,
}

impl Validator {
    /// A validator trusting the given issuer keys.
    #[must_use]
    pub fn new(trust_anchors: Vec<PublicKeyJwk>) -> Self {
        Self { trust_anchors, registry: TypeCodecRegistry::new(), leeway: Leeway::default() }
    }

    /// The element codec registry for mdoc verification.
    #[must_use]
    pub fn with_registry(mut self, registry: TypeCodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the default leeway.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Leeway) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verify a W3C `jwt_vp` presentation.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the first failing check.
    pub async fn verify_jwt_vp(
        &self, vp_jwt: &str, nonce: &str, audience: &str, now: DateTime<Utc>,
    ) -> Result<VerifiedVp> {
        w3c_vc::verify_presentation(vp_jwt, self.resolver(), nonce, audience, self.leeway, now)
            .await
    }

    /// Verify a bare VC-JWT.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the first failing check.
    pub async fn verify_jwt_vc(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedVc> {
        w3c_vc::verify(token, self.resolver(), None, self.leeway, now).await
    }

    /// Verify an SD-JWT presentation with key binding.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the first failing check.
    pub async fn verify_sd_jwt(
        &self, presentation: &str, nonce: &str, audience: &str, now: DateTime<Utc>,
    ) -> Result<VerifiedSdJwt> {
        let check =
            KeyBindingCheck { nonce: nonce.to_string(), audience: audience.to_string() };
        sd_jwt::verify(presentation, self.resolver(), Some(&check), self.leeway, now).await
    }

    /// Verify an mdoc device response under the given binding.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the first failing check.
    pub fn verify_mdoc(
        &self, encoded: &str, binding: &DeviceBinding, now: DateTime<Utc>,
    ) -> Result<Vec<VerifiedDocument>> {
        let response = DeviceResponse::from_base64url(encoded)?;
        crate::format::mdoc::verify(
            &response,
            &self.trust_anchors,
            binding,
            &self.registry,
            self.leeway,
            now,
        )
    }

    /// Evaluate a verified credential's revocation status, fetching the
    /// status list it references.
    ///
    /// Status is orthogonal to cryptographic validity: callers decide what
    /// a revoked-but-valid presentation means for them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] when the list cannot be retrieved and
    /// the list credential's own verification errors.
    pub async fn check_status(
        &self, credential: &VerifiedVc, fetcher: &impl Fetcher, now: DateTime<Utc>,
    ) -> Result<Option<bool>> {
        let Some(status) = &credential.claims.vc.credential_status else {
            return Ok(None);
        };

        let bytes = fetcher
            .fetch(&status.status_list_credential)
            .await
            .map_err(|e| Error::Fetch(format!("issue fetching status list: {e}")))?;
        let list_jwt = String::from_utf8(bytes)
            .map_err(|e| Error::Parse(format!("status list is not UTF-8: {e}")))?;

        // resolve the anchor the list's own header names
        let list_jws: crate::jose::jws::Jws = list_jwt.parse()?;
        let issuer_key = self.resolve_anchor(list_jws.header.kid())?;
        let revoked = check_revocation(
            &list_jwt,
            &issuer_key,
            &credential.claims.iss,
            status.index()?,
            self.leeway,
            now,
        )
        .await?;
        Ok(Some(revoked))
    }

    /// The trust anchor a `kid` names: exact thumbprint-URN match wins, a
    /// sole configured anchor is assumed otherwise.
    fn resolve_anchor(&self, kid: Option<&str>) -> Result<PublicKeyJwk> {
        if let Some(kid) = kid {
            for anchor in &self.trust_anchors {
                if anchor.identifier().is_ok_and(|id| id == kid) {
                    return Ok(anchor.clone());
                }
            }
        }
        match self.trust_anchors.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(Error::UnknownKey("no trust anchors configured".to_string())),
            _ => Err(Error::UnknownKey(format!(
                "no trust anchor matches kid {}",
                kid.unwrap_or("<none>")
            ))),
        }
    }

    fn resolver(
        &self,
    ) -> impl Fn(String) -> std::pin::Pin<
        Box<dyn Future<Output = anyhow::Result<PublicKeyJwk>> + Send>,
    > + Clone {
        let anchors = self.trust_anchors.clone();
        move |kid: String| {
            let anchors = anchors.clone();
            Box::pin(async move {
                for anchor in &anchors {
                    if anchor.identifier().is_ok_and(|id| id == kid) {
                        return Ok(anchor.clone());
                    }
                }
                match anchors.as_slice() {
                    [only] => Ok(only.clone()),
                    _ => anyhow::bail!("no trust anchor matches kid {kid}"),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::format::sd_jwt::SdJwtPresentationBuilder;
    use crate::key::{Curve, KeyMaterial};

    #[test]
    fn anchors_resolve_by_kid() {
        let first = KeyMaterial::generate(Curve::P256);
        let second = KeyMaterial::generate(Curve::P256);
        let validator = Validator::new(vec![first.public_jwk(), second.public_jwk()]);

        // the named anchor wins regardless of position
        let kid = second.public_jwk().identifier().expect("identifier");
        let resolved = validator.resolve_anchor(Some(&kid)).expect("should resolve");
        assert_eq!(resolved, second.public_jwk());

        // an unknown kid among several anchors is not guessed at
        let result = validator.resolve_anchor(Some("urn:unknown"));
        assert!(matches!(result, Err(Error::UnknownKey(_))));
    }

    #[tokio::test]
    async fn standalone_sd_jwt_verification() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let holder_key = KeyMaterial::generate(Curve::P256);

        let issued = crate::format::sd_jwt::SdJwtBuilder::new()
            .issuer("https://issuer.example")
            .claims(json!({"age-over-18": true}).as_object().unwrap().clone())
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
            .nonce("n9")
            .signer(&holder_key)
            .build()
            .await
            .expect("should present");

        let validator = Validator::new(vec![issuer_key.public_jwk()]);
        let verified = validator
            .verify_sd_jwt(&presentation, "n9", "https://verifier.example/rp1", Utc::now())
            .await
            .expect("should verify");
        assert_eq!(verified.disclosures.len(), 1);

        // verification is pure: a second run yields the same result
        let again = validator
            .verify_sd_jwt(&presentation, "n9", "https://verifier.example/rp1", Utc::now())
            .await
            .expect("should verify again");
        assert_eq!(again.disclosures.len(), 1);
    }

    #[tokio::test]
    async fn standalone_mdoc_verification() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let device_key = KeyMaterial::generate(Curve::P256);

        let issued = crate::format::mdoc::MdocBuilder::new()
            .doc_type("org.iso.18013.5.1.mDL")
            .namespace(
                "org.iso.18013.5.1",
                json!({"age_over_18": true}).as_object().unwrap().clone(),
            )
            .device_jwk(device_key.public_jwk())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let response = crate::format::mdoc::DeviceResponseBuilder::new()
            .issuer_signed(issued)
            .doc_type("org.iso.18013.5.1.mDL")
            .binding(DeviceBinding::Challenge("n10".to_string()))
            .signer(&device_key)
            .build()
            .await
            .expect("should present");

        let validator = Validator::new(vec![issuer_key.public_jwk()]);
        let documents = validator
            .verify_mdoc(
                &response.to_base64url().expect("should encode"),
                &DeviceBinding::Challenge("n10".to_string()),
                Utc::now(),
            )
            .expect("should verify");
        assert_eq!(documents[0].namespaces["org.iso.18013.5.1"]["age_over_18"], json!(true));
    }
}
