//! Generators for protocol-visible identifiers and randomness.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{Rng, rng};
use uuid::Uuid;

/// Generate a fresh nonce suitable for binding a presentation to a request.
#[must_use]
pub fn nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an opaque token for `state` parameters and `request_uri` paths.
#[must_use]
pub fn uri_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Cryptographically secure random bytes.
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    rng().random::<[u8; N]>()
}

/// A base64url-encoded 16-byte salt, as used by selective disclosures and
/// mdoc issuer-signed items.
#[must_use]
pub fn salt() -> String {
    Base64UrlUnpadded::encode_string(&random_bytes::<16>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        assert_ne!(nonce(), nonce());
        assert_ne!(uri_token(), uri_token());
        assert!(!uri_token().contains('-'));
    }
}
