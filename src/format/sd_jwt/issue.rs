//! SD-JWT issuance: marking claims selectively disclosable and signing the
//! issuer JWT.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::format::sd_jwt::{Disclosure, KeyBinding, SdJwtClaims};
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::{Error, Result};

/// Generate an IETF `dc+sd-jwt` format credential.
#[derive(Debug)]
pub struct SdJwtBuilder<S> {
    vct: Option<String>,
    issuer: Option<String>,
    claims: Map<String, Value>,
    disclosable: Vec<String>,
    holder_jwk: Option<PublicKeyJwk>,
    status: Option<Value>,
    expires_at: Option<DateTime<Utc>>,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for SdJwtBuilder<NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl SdJwtBuilder<NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vct: None,
            issuer: None,
            claims: Map::new(),
            disclosable: vec![],
            holder_jwk: None,
            status: None,
            expires_at: None,
            signer: NoSigner,
        }
    }

    /// Set the credential Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> SdJwtBuilder<HasSigner<'_, S>> {
        SdJwtBuilder {
            vct: self.vct,
            issuer: self.issuer,
            claims: self.claims,
            disclosable: self.disclosable,
            holder_jwk: self.holder_jwk,
            status: self.status,
            expires_at: self.expires_at,
            signer: HasSigner(signer),
        }
    }
}

impl<S> SdJwtBuilder<S> {
    /// The credential type URI (`vct`).
    #[must_use]
    pub fn vct(mut self, vct: impl Into<String>) -> Self {
        self.vct = Some(vct.into());
        self
    }

    /// The issuer URI.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// The cleartext claims.
    #[must_use]
    pub fn claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims = claims;
        self
    }

    /// Mark a claim selectively disclosable. Nested claims use a
    /// `/`-separated path (`address/street`).
    #[must_use]
    pub fn disclosable(mut self, path: impl Into<String>) -> Self {
        self.disclosable.push(path.into());
        self
    }

    /// The holder's public key, carried in `cnf.jwk` for key binding.
    #[must_use]
    pub fn holder_jwk(mut self, jwk: PublicKeyJwk) -> Self {
        self.holder_jwk = Some(jwk);
        self
    }

    /// The credential's status reference.
    #[must_use]
    pub fn status(mut self, status: Value) -> Self {
        self.status = Some(status);
        self
    }

    /// The expiry time.
    #[must_use]
    pub const fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

impl<S: Signer> SdJwtBuilder<HasSigner<'_, S>> {
    /// Build the SD-JWT credential, returning the tilde-separated
    /// serialization `<Issuer-signed JWT>~<Disclosure 1>~…~` with every
    /// disclosure attached.
    ///
    /// # Errors
    ///
    /// Returns an error if a disclosable path does not resolve or signing
    /// fails.
    pub async fn build(self) -> Result<String> {
        let Some(issuer) = self.issuer else {
            return Err(Error::Usage("issuer is required".to_string()));
        };

        let mut tree = self.claims;
        let mut disclosures = vec![];
        for path in &self.disclosable {
            conceal(&mut tree, path, &mut disclosures)?;
        }

        // the top-level _sd digests live on the claims struct itself
        let sd = match tree.remove("_sd") {
            Some(Value::Array(digests)) => digests
                .into_iter()
                .map(|d| match d {
                    Value::String(s) => Ok(s),
                    _ => Err(Error::InvalidStructure("non-string digest".to_string())),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => vec![],
        };

        let claims = SdJwtClaims {
            sd,
            sd_alg: Some("sha-256".to_string()),
            vct: self.vct,
            iss: issuer,
            iat: Some(Utc::now()),
            exp: self.expires_at,
            cnf: self.holder_jwk.map(KeyBinding::Jwk),
            status: self.status,
            claims: tree,
            ..SdJwtClaims::default()
        };

        let jwt = jws::encode(JwsType::SdJwt, &claims, self.signer.0).await?;

        let mut serialized = format!("{jwt}~");
        for disclosure in &disclosures {
            serialized.push_str(&disclosure.encoded()?);
            serialized.push('~');
        }
        Ok(serialized)
    }
}

/// Replace the claim at `path` with its digest in the `_sd` array at the
/// same nesting level, recording the disclosure.
fn conceal(
    tree: &mut Map<String, Value>, path: &str, disclosures: &mut Vec<Disclosure>,
) -> Result<()> {
    match path.split_once('/') {
        None => {
            let Some(value) = tree.remove(path) else {
                return Err(Error::Usage(format!("no claim at path: {path}")));
            };
            let disclosure = Disclosure::new(path, value);
            let digest = disclosure.hashed()?;
            disclosures.push(disclosure);

            match tree.entry("_sd".to_string()).or_insert_with(|| Value::Array(vec![])) {
                Value::Array(digests) => digests.push(Value::String(digest)),
                _ => return Err(Error::InvalidStructure("_sd is not an array".to_string())),
            }
            Ok(())
        }
        Some((head, tail)) => {
            let Some(Value::Object(nested)) = tree.get_mut(head) else {
                return Err(Error::Usage(format!("no object at path segment: {head}")));
            };
            conceal(nested, tail, disclosures)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::format::sd_jwt::SdJwtParts;
    use crate::jose::jws::decode_unverified;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn digests_replace_claims() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let holder_key = KeyMaterial::generate(Curve::P256);

        let serialized = SdJwtBuilder::new()
            .issuer("https://issuer.example")
            .vct("https://credentials.example/identity")
            .claims(
                json!({
                    "given-name": "Erika",
                    "address": {"street": "Heidestrasse 17", "locality": "Koln"}
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .disclosable("given-name")
            .disclosable("address/street")
            .holder_jwk(holder_key.public_jwk())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let parts = SdJwtParts::parse(&serialized).expect("should parse");
        assert_eq!(parts.disclosures.len(), 2);
        assert!(parts.key_binding_jwt.is_none());

        let jwt = decode_unverified::<SdJwtClaims>(&parts.issuer_jwt).expect("should decode");
        // the disclosed claim is gone from the payload, its digest present
        assert_eq!(jwt.claims.sd.len(), 1);
        assert!(!jwt.claims.claims.contains_key("given-name"));

        // nested _sd at the address level
        let address = jwt.claims.claims["address"].as_object().unwrap();
        assert!(address.contains_key("_sd"));
        assert!(!address.contains_key("street"));
        assert_eq!(address["locality"], "Koln");

        // every disclosure digest appears in some _sd array
        for encoded in &parts.disclosures {
            let digest = crate::format::sd_jwt::digest_b64(encoded);
            let in_top = jwt.claims.sd.contains(&digest);
            let in_nested = address["_sd"]
                .as_array()
                .unwrap()
                .iter()
                .any(|d| d.as_str() == Some(digest.as_str()));
            assert!(in_top || in_nested);
        }
    }
}
