//! SD-JWT verification: issuer signature, disclosure digests, cleartext
//! reconstruction, and key binding.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::datetime::Leeway;
use crate::format::sd_jwt::{
    Disclosure, KbJwtClaims, SdJwtClaims, SdJwtParts, digest_b64,
};
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jws::{self, Jws};
use crate::{Error, Result};

/// Expected key-binding parameters, when the verifier requires holder
/// binding.
#[derive(Clone, Debug)]
pub struct KeyBindingCheck {
    /// The challenge nonce issued with the authorization request.
    pub nonce: String,

    /// The verifier's client identifier (`aud`).
    pub audience: String,
}

/// A disclosed claim, surfaced after verification.
#[derive(Clone, Debug, PartialEq)]
pub struct DisclosedClaim {
    /// The claim name.
    pub name: String,

    /// The claim value.
    pub value: Value,
}

/// A verified SD-JWT presentation.
#[derive(Clone, Debug)]
pub struct VerifiedSdJwt {
    /// The issuer JWT claims, digests and all.
    pub claims: SdJwtClaims,

    /// The cleartext projection: issuer payload with presented disclosures
    /// substituted back in and digest bookkeeping removed.
    pub reconstructed: Value,

    /// The claims the holder chose to disclose.
    pub disclosures: Vec<DisclosedClaim>,
}

/// Verify a tilde-separated SD-JWT presentation.
///
/// Checks the issuer JWS, recomputes every presented disclosure digest and
/// requires set membership in the payload's `_sd` arrays (any nesting
/// level, exactly once), reconstructs the cleartext projection, and — when
/// `key_binding` is expected — validates the KB-JWT against the `cnf` key,
/// nonce, audience, issuance time, and `sd_hash`.
///
/// # Errors
///
/// Returns the taxonomy error for the first failing check.
pub async fn verify<F, Fut>(
    presentation: &str, resolver: F, key_binding: Option<&KeyBindingCheck>, leeway: Leeway,
    now: DateTime<Utc>,
) -> Result<VerifiedSdJwt>
where
    F: Fn(String) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<PublicKeyJwk>> + Send,
{
    tracing::debug!("verify sd-jwt");

    let parts = SdJwtParts::parse(presentation)?;

    // 1. issuer signature
    let issuer_jws: Jws = parts.issuer_jwt.parse()?;
    let jwt = jws::decode::<SdJwtClaims, _, _>(&parts.issuer_jwt, resolver).await?;
    let claims = jwt.claims;
    let payload: Value = issuer_jws.claims()?;

    leeway.check_window(claims.nbf, claims.exp, now)?;
    if let Some(iat) = claims.iat {
        leeway.check_issued_at(iat, now)?;
    }

    // 2. disclosure digests: each presented exactly once across all levels
    let mut presented = vec![];
    for encoded in &parts.disclosures {
        let digest = digest_b64(encoded);
        if presented.iter().any(|(d, _)| d == &digest) {
            return Err(Error::InvalidStructure(format!("duplicate disclosure: {digest}")));
        }
        presented.push((digest, Disclosure::from_encoded(encoded)?));
    }

    for (digest, _) in &presented {
        match count_digest(&payload, digest) {
            0 => {
                return Err(Error::InvalidStructure(format!(
                    "disclosure digest not referenced: {digest}"
                )));
            }
            1 => {}
            _ => {
                return Err(Error::InvalidStructure(format!(
                    "disclosure digest referenced more than once: {digest}"
                )));
            }
        }
    }

    // 3. reconstruct the cleartext projection
    let reconstructed = reconstruct(&payload, &presented)?;

    // 4. key binding
    if let Some(expected) = key_binding {
        let Some(kb_jwt) = &parts.key_binding_jwt else {
            return Err(Error::InvalidStructure("missing key binding JWT".to_string()));
        };
        let Some(cnf) = &claims.cnf else {
            return Err(Error::InvalidStructure("credential has no cnf key".to_string()));
        };

        let kb_jws: Jws = kb_jwt.parse()?;
        kb_jws.verify_with(cnf.jwk())?;
        let kb_claims: KbJwtClaims = kb_jws.claims()?;

        if kb_claims.nonce != expected.nonce {
            return Err(Error::InvalidStructure("nonce mismatch".to_string()));
        }
        if kb_claims.aud != expected.audience {
            return Err(Error::InvalidStructure("aud mismatch".to_string()));
        }
        leeway.check_issued_at(kb_claims.iat, now)?;

        // order-sensitive hash over the exact presented prefix
        if kb_claims.sd_hash != digest_b64(&parts.sd_hash_input()) {
            return Err(Error::InvalidStructure("sd_hash mismatch".to_string()));
        }
    }

    let disclosures = presented
        .into_iter()
        .map(|(_, d)| DisclosedClaim {
            name: d.name.unwrap_or_default(),
            value: d.value,
        })
        .collect();

    Ok(VerifiedSdJwt { claims, reconstructed, disclosures })
}

/// Count occurrences of a digest across every `_sd` array and array-element
/// placeholder in the payload.
fn count_digest(value: &Value, digest: &str) -> usize {
    match value {
        Value::Object(map) => {
            let mut count = 0;
            for (key, entry) in map {
                if key == "_sd" {
                    if let Value::Array(digests) = entry {
                        count +=
                            digests.iter().filter(|d| d.as_str() == Some(digest)).count();
                    }
                } else {
                    count += count_digest(entry, digest);
                }
            }
            count
        }
        Value::Array(entries) => entries
            .iter()
            .map(|entry| {
                // {"...": "<digest>"} marks a concealed array element
                if let Value::Object(map) = entry {
                    if map.len() == 1 {
                        if let Some(Value::String(d)) = map.get("...") {
                            return usize::from(d == digest);
                        }
                    }
                }
                count_digest(entry, digest)
            })
            .sum(),
        _ => 0,
    }
}

/// Rebuild the cleartext object: substitute presented disclosures for their
/// digests, drop unmatched placeholders, and strip digest bookkeeping.
fn reconstruct(value: &Value, presented: &[(String, Disclosure)]) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, entry) in map {
                if key == "_sd" {
                    let Value::Array(digests) = entry else {
                        return Err(Error::InvalidStructure("_sd is not an array".to_string()));
                    };
                    for digest in digests {
                        let Some(found) = presented
                            .iter()
                            .find(|(d, _)| Some(d.as_str()) == digest.as_str())
                        else {
                            // unknown digests are silently ignored
                            continue;
                        };
                        let Some(name) = &found.1.name else {
                            return Err(Error::InvalidStructure(
                                "array disclosure referenced from _sd".to_string(),
                            ));
                        };
                        out.insert(name.clone(), reconstruct(&found.1.value, presented)?);
                    }
                } else if key != "_sd_alg" {
                    out.insert(key.clone(), reconstruct(entry, presented)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(entries) => {
            let mut out = vec![];
            for entry in entries {
                if let Value::Object(map) = entry {
                    if map.len() == 1 {
                        if let Some(Value::String(digest)) = map.get("...") {
                            if let Some(found) =
                                presented.iter().find(|(d, _)| d == digest)
                            {
                                out.push(reconstruct(&found.1.value, presented)?);
                            }
                            // unmatched placeholders stay hidden
                            continue;
                        }
                    }
                }
                out.push(reconstruct(entry, presented)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::format::sd_jwt::{SdJwtBuilder, SdJwtPresentationBuilder};
    use crate::key::{Curve, KeyMaterial};

    async fn issue_and_present(disclose: &[&str], nonce: &str) -> (String, PublicKeyJwk) {
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

        let mut builder = SdJwtPresentationBuilder::new()
            .credential(&issued)
            .expect("should parse")
            .verifier("https://verifier.example/rp1")
            .nonce(nonce);
        for name in disclose {
            builder = builder.disclose(*name);
        }
        let presentation =
            builder.signer(&holder_key).build().await.expect("should present");

        (presentation, issuer_key.public_jwk())
    }

    fn check(nonce: &str) -> KeyBindingCheck {
        KeyBindingCheck {
            nonce: nonce.to_string(),
            audience: "https://verifier.example/rp1".to_string(),
        }
    }

    #[tokio::test]
    async fn selective_disclosure() {
        let (presentation, issuer_jwk) = issue_and_present(&["age-over-18"], "n2").await;

        let verified = verify(
            &presentation,
            move |_| {
                let jwk = issuer_jwk.clone();
                async move { Ok(jwk) }
            },
            Some(&check("n2")),
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("should verify");

        assert_eq!(verified.disclosures.len(), 1);
        assert_eq!(verified.disclosures[0].name, "age-over-18");
        assert_eq!(verified.disclosures[0].value, json!(true));

        // withheld claims are absent from the reconstruction
        let object = verified.reconstructed.as_object().unwrap();
        assert!(object.contains_key("age-over-18"));
        assert!(!object.contains_key("given-name"));
        assert!(!object.contains_key("family-name"));
        assert!(!object.contains_key("_sd"));
    }

    #[tokio::test]
    async fn wrong_nonce_rejected() {
        let (presentation, issuer_jwk) = issue_and_present(&["age-over-18"], "4n").await;

        let result = verify(
            &presentation,
            move |_| {
                let jwk = issuer_jwk.clone();
                async move { Ok(jwk) }
            },
            Some(&check("n4")),
            Leeway::default(),
            Utc::now(),
        )
        .await;

        assert!(matches!(result, Err(Error::InvalidStructure(_))));
    }

    #[tokio::test]
    async fn empty_disclosure_set_is_valid() {
        let (presentation, issuer_jwk) = issue_and_present(&[], "n5").await;

        let verified = verify(
            &presentation,
            move |_| {
                let jwk = issuer_jwk.clone();
                async move { Ok(jwk) }
            },
            Some(&check("n5")),
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("all claims withheld is still a valid presentation");

        assert!(verified.disclosures.is_empty());
        assert!(!verified.reconstructed.as_object().unwrap().contains_key("_sd"));
    }

    #[tokio::test]
    async fn duplicate_disclosure_rejected() {
        let (presentation, issuer_jwk) = issue_and_present(&["age-over-18"], "n6").await;

        // replay the disclosure segment
        let parts = SdJwtParts::parse(&presentation).unwrap();
        let doubled = format!(
            "{}~{}~{}~{}",
            parts.issuer_jwt,
            parts.disclosures[0],
            parts.disclosures[0],
            parts.key_binding_jwt.unwrap()
        );

        let result = verify(
            &doubled,
            move |_| {
                let jwk = issuer_jwk.clone();
                async move { Ok(jwk) }
            },
            None,
            Leeway::default(),
            Utc::now(),
        )
        .await;

        assert!(matches!(result, Err(Error::InvalidStructure(_))));
    }
}
