//! # Providers
//!
//! Traits the agents depend on for key access, state persistence, external
//! fetches, and time. Implementations are injected by the application; the
//! crate ships in-memory references in [`crate::store`] and a raw-key signer
//! in [`crate::key`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::jose::jwa::Algorithm;
use crate::jose::jwk::PublicKeyJwk;

/// Signer is used by implementers to provide signing functionality for
/// Verifiable Credential issuance and Verifiable Presentation submissions.
///
/// Signing is one of the suspension points of a protocol run: the key may
/// live behind an HSM or a remote service, so the operation is async.
pub trait Signer: Send + Sync {
    /// Algorithm returns the algorithm used by the signer.
    fn algorithm(&self) -> Algorithm;

    /// The verification method the verifier should use to verify the signer's
    /// signature. For this engine, the key's JWK thumbprint URN.
    fn verification_method(&self) -> String;

    /// The public form of the signing key.
    fn public_jwk(&self) -> PublicKeyJwk;

    /// Sign is a convenience method for infallible signing.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// `StateStore` is used to store and retrieve server state between protocol
/// steps.
pub trait StateStore: Send + Sync {
    /// Store state using the provided key. The expiry parameter indicates
    /// when the state can be safely evicted.
    fn put(
        &self, key: &str, state: impl Serialize + Send, expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Retrieve data using the provided key. Expired entries behave as
    /// absent.
    fn get<T: DeserializeOwned>(&self, key: &str) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Remove data using the key provided.
    fn purge(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Fetcher retrieves external resources: request objects served by
/// reference, client metadata, status list credentials.
pub trait Fetcher: Send + Sync {
    /// Fetch the resource at the given URI, returning its raw bytes.
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// A source of "now", injectable so validity-window tests need not sleep.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
