//! VC-JWT verification.

use chrono::{DateTime, Utc};

use crate::core::OneMany;
use crate::datetime::Leeway;
use crate::format::w3c_vc::W3cVcClaims;
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jws;
use crate::{Error, Result};

/// A verified VC-JWT: signature checked, claims consistent, validity window
/// honoured.
#[derive(Clone, Debug)]
pub struct VerifiedVc {
    /// The verified claims set.
    pub claims: W3cVcClaims,

    /// The compact serialization that was verified.
    pub raw: String,
}

/// Verify a compact VC-JWT.
///
/// Checks, in order: the JWS signature (key resolved via the supplied
/// resolver), the mirroring between registered claims and the embedded `vc`,
/// the expected holder binding (`sub`), and the validity window under
/// leeway.
///
/// # Errors
///
/// Returns the taxonomy error for the first failing check.
pub async fn verify<F, Fut>(
    token: &str, resolver: F, expected_holder: Option<&str>, leeway: Leeway, now: DateTime<Utc>,
) -> Result<VerifiedVc>
where
    F: Fn(String) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<PublicKeyJwk>> + Send,
{
    tracing::debug!("verify vc-jwt");

    let jwt = jws::decode::<W3cVcClaims, _, _>(token, resolver).await?;
    let claims = jwt.claims;

    claims.check_consistency()?;

    if let Some(holder) = expected_holder {
        if claims.sub != holder {
            return Err(Error::InvalidStructure("sub does not match holder key".to_string()));
        }
    }
    if let OneMany::One(subject) = &claims.vc.credential_subject {
        if let Some(id) = &subject.id {
            if id != &claims.sub {
                return Err(Error::InvalidStructure(
                    "credentialSubject.id does not match sub".to_string(),
                ));
            }
        }
    }

    leeway.check_window(Some(claims.nbf), claims.exp, now)?;

    Ok(VerifiedVc { claims, raw: token.to_string() })
}

/// A verified `jwt_vp` presentation and the credentials inside it.
#[derive(Clone, Debug)]
pub struct VerifiedVp {
    /// The presentation claims.
    pub claims: crate::format::w3c_vc::W3cVpClaims,

    /// Each embedded credential, verified in turn.
    pub credentials: Vec<VerifiedVc>,
}

/// Verify a `jwt_vp` presentation: the holder's signature (embedded `jwk`),
/// the challenge nonce and audience, then every embedded VC-JWT.
///
/// The holder binding closes the loop: each credential's `sub` must equal
/// the key identifier of the key that signed the presentation.
///
/// # Errors
///
/// Returns the taxonomy error for the first failing check.
pub async fn verify_presentation<F, Fut>(
    vp_jwt: &str, issuer_resolver: F, expected_nonce: &str, expected_audience: &str,
    leeway: Leeway, now: DateTime<Utc>,
) -> Result<VerifiedVp>
where
    F: Fn(String) -> Fut + Send + Clone,
    Fut: Future<Output = anyhow::Result<PublicKeyJwk>> + Send,
{
    use crate::format::w3c_vc::W3cVpClaims;
    use crate::jose::jws::Jws;

    tracing::debug!("verify jwt_vp");

    // the holder's key travels in the presentation header
    let vp_jws: Jws = vp_jwt.parse()?;
    let Some(holder_jwk) = vp_jws.header.jwk() else {
        return Err(Error::UnknownKey("presentation header has no jwk".to_string()));
    };
    vp_jws.verify_with(holder_jwk)?;
    let claims: W3cVpClaims = vp_jws.claims()?;

    if claims.nonce != expected_nonce {
        return Err(Error::InvalidStructure("nonce mismatch".to_string()));
    }
    if claims.aud != expected_audience {
        return Err(Error::InvalidStructure("aud mismatch".to_string()));
    }
    leeway.check_issued_at(claims.iat, now)?;

    let holder_id = holder_jwk.identifier()?;
    let mut credentials = vec![];
    for vc_jwt in &claims.vp.verifiable_credential {
        credentials
            .push(verify(vc_jwt, issuer_resolver.clone(), Some(&holder_id), leeway, now).await?);
    }

    Ok(VerifiedVp { claims, credentials })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::format::w3c_vc::W3cVcBuilder;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn issue_then_verify() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let holder_id = "urn:ietf:params:oauth:jwk-thumbprint:sha-256:abc".to_string();

        let token = W3cVcBuilder::new()
            .issuer("https://issuer.example")
            .add_type("AtomicAttribute2023")
            .holder(&holder_id)
            .claims(json!({"given-name": "Erika"}).as_object().unwrap().clone())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let jwk = issuer_key.public_jwk();
        let verified = verify(
            &token,
            move |_| {
                let jwk = jwk.clone();
                async move { Ok(jwk) }
            },
            Some(&holder_id),
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("should verify");

        assert_eq!(
            verified.claims.vc.credential_subject.as_one().unwrap().claims["given-name"],
            "Erika"
        );
    }

    #[tokio::test]
    async fn expired_rejected() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let token = W3cVcBuilder::new()
            .issuer("https://issuer.example")
            .holder("holder")
            .issuance_date(Utc::now() - Duration::days(2))
            .expiration_date(Utc::now() - Duration::days(1))
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let jwk = issuer_key.public_jwk();
        let result = verify(
            &token,
            move |_| {
                let jwk = jwk.clone();
                async move { Ok(jwk) }
            },
            None,
            Leeway::default(),
            Utc::now(),
        )
        .await;

        assert!(matches!(result, Err(Error::ExpiredOrNotYetValid(_))));
    }
}
