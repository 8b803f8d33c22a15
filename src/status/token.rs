//! # Token Status List
//!
//! The [Token Status List](https://datatracker.ietf.org/doc/draft-ietf-oauth-status-list/)
//! alternative: a signed JWT whose `status_list` claim carries the
//! compressed bit array (`lst`) and the number of bits per entry (`bits`).

use chrono::serde::{ts_seconds, ts_seconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::Leeway;
use crate::jose::jwk::PublicKeyJwk;
use crate::jose::jws::{self, JwsType};
use crate::provider::Signer;
use crate::status::list::RevocationList;
use crate::{Error, Result};

/// The `status_list` claim.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusList {
    /// Bits per status entry (1, 2, 4, or 8).
    pub bits: u8,

    /// The compressed, base64url-encoded status array.
    pub lst: String,
}

/// Claims of a status list token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatusListToken {
    /// The issuer — must match the issuer of the referenced credentials.
    pub iss: String,

    /// The status list URI this token is served from.
    pub sub: String,

    /// Issuance time; must be in the past.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// Expiry.
    #[serde(with = "ts_seconds_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub exp: Option<DateTime<Utc>>,

    /// Maximum time, in seconds, a consumer may cache the list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// The list itself.
    pub status_list: StatusList,
}

impl StatusListToken {
    /// Read the status value at `index`. Out-of-range reads as 0 (valid).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] for an unsupported `bits` value
    /// or [`Error::Parse`] for an undecodable list.
    pub fn status(&self, index: usize) -> Result<u8> {
        if !matches!(self.status_list.bits, 1 | 2 | 4 | 8) {
            return Err(Error::InvalidStructure(format!(
                "unsupported bits value: {}",
                self.status_list.bits
            )));
        }

        let list = RevocationList::decode(&self.status_list.lst)?;
        let bits = usize::from(self.status_list.bits);

        let mut value = 0u8;
        for offset in 0..bits {
            value = (value << 1) | u8::from(list.is_revoked(index * bits + offset));
        }
        Ok(value)
    }
}

/// Build and sign a status list token.
#[derive(Debug)]
pub struct StatusListTokenBuilder<'a, S> {
    issuer: String,
    uri: String,
    ttl: Option<u64>,
    list: &'a RevocationList,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl<'a> StatusListTokenBuilder<'a, NoSigner> {
    /// Create a builder over the given list (one bit per entry).
    #[must_use]
    pub const fn new(list: &'a RevocationList) -> Self {
        Self { issuer: String::new(), uri: String::new(), ttl: None, list, signer: NoSigner }
    }

    /// Set the token Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> StatusListTokenBuilder<'a, HasSigner<'_, S>> {
        StatusListTokenBuilder {
            issuer: self.issuer,
            uri: self.uri,
            ttl: self.ttl,
            list: self.list,
            signer: HasSigner(signer),
        }
    }
}

impl<'a, S> StatusListTokenBuilder<'a, S> {
    /// The issuer URI.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// The status list URI (`sub`).
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Cache bound in seconds.
    #[must_use]
    pub const fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl<S: Signer> StatusListTokenBuilder<'_, HasSigner<'_, S>> {
    /// Sign the token as a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error on encoding or signing failure.
    pub async fn build(self) -> Result<String> {
        let claims = StatusListToken {
            iss: self.issuer,
            sub: self.uri,
            iat: Utc::now(),
            exp: None,
            ttl: self.ttl,
            status_list: StatusList { bits: 1, lst: self.list.encode()? },
        };
        jws::encode(JwsType::StatusListJwt, &claims, self.signer.0).await
    }
}

/// Verify a status list token and return its claims.
///
/// Checks the signature, that `iss` matches the credential issuer, that
/// `sub` matches the status URI the token was fetched from, and that `iat`
/// is in the past (under leeway).
///
/// # Errors
///
/// Returns the taxonomy error for the first failing check.
pub async fn verify(
    token: &str, issuer_key: &PublicKeyJwk, expected_issuer: &str, status_uri: &str,
    leeway: Leeway, now: DateTime<Utc>,
) -> Result<StatusListToken> {
    let key = issuer_key.clone();
    let jwt = jws::decode::<StatusListToken, _, _>(token, move |_| {
        let key = key.clone();
        async move { Ok(key) }
    })
    .await?;
    let claims = jwt.claims;

    if claims.iss != expected_issuer {
        return Err(Error::InvalidStructure(
            "token issuer does not match credential issuer".to_string(),
        ));
    }
    if claims.sub != status_uri {
        return Err(Error::InvalidStructure("token sub does not match status URI".to_string()));
    }
    leeway.check_issued_at(claims.iat, now)?;
    leeway.check_window(None, claims.exp, now)?;

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn token_round_trip() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let mut list = RevocationList::new(1024);
        list.revoke(7).unwrap();

        let token = StatusListTokenBuilder::new(&list)
            .issuer("https://issuer.example")
            .uri("https://issuer.example/status/tsl")
            .ttl(300)
            .signer(&issuer_key)
            .build()
            .await
            .expect("should sign");

        let claims = verify(
            &token,
            &issuer_key.public_jwk(),
            "https://issuer.example",
            "https://issuer.example/status/tsl",
            Leeway::default(),
            Utc::now(),
        )
        .await
        .expect("should verify");

        assert_eq!(claims.status(7).unwrap(), 1);
        assert_eq!(claims.status(8).unwrap(), 0);
        assert_eq!(claims.ttl, Some(300));
    }

    #[tokio::test]
    async fn wrong_subject_rejected() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let list = RevocationList::new(64);

        let token = StatusListTokenBuilder::new(&list)
            .issuer("https://issuer.example")
            .uri("https://issuer.example/status/tsl")
            .signer(&issuer_key)
            .build()
            .await
            .expect("should sign");

        let result = verify(
            &token,
            &issuer_key.public_jwk(),
            "https://issuer.example",
            "https://other.example/status",
            Leeway::default(),
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidStructure(_))));
    }
}
