//! # Errors
//!
//! The failure taxonomy shared by every public API in the crate. Protocol
//! endpoints that must not leak errors (the OpenID4VP response validator)
//! convert these into structured outcomes instead of returning them.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy carried on all error paths.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller combined options that cannot go together, or supplied an
    /// argument outside the supported envelope.
    #[error("usage error: {0}")]
    Usage(String),

    /// A wire format could not be decoded: bad base64, malformed JSON,
    /// truncated CBOR, a compact serialization with the wrong number of
    /// segments.
    #[error("parse error: {0}")]
    Parse(String),

    /// The artifact decoded cleanly but its fields contradict one another or
    /// the profile it claims to follow.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// A cryptographic signature or authentication tag failed to verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// No trust anchor matches the signer: an unresolvable `kid`, an `x5c`
    /// that chains to nothing we recognise.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// The algorithm is recognised on the wire but not supported here.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A time predicate failed outside the configured leeway.
    #[error("expired or not yet valid: {0}")]
    ExpiredOrNotYetValid(String),

    /// The credential's status list marks it revoked.
    #[error("revoked: {0}")]
    Revoked(String),

    /// An external resource (request object, status list) could not be
    /// retrieved.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// Signing failed inside the key provider.
    #[error("signing error: {0}")]
    Signing(String),
}

impl Error {
    /// The field or artifact a validation failure refers to, for surfacing in
    /// structured protocol outcomes.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        let err = Error::InvalidStructure("jti != vc.id".to_string());
        assert_eq!(err.to_string(), "invalid structure: jti != vc.id");
    }
}
