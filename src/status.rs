//! # Credential Status
//!
//! Two status mechanisms, both backed by a compressed bit array the issuer
//! signs:
//!
//! * [`list`] — a revocation list carried in a Verifiable Credential whose
//!   subject embeds the `encodedList`.
//! * [`token`] — a Token Status List conveyed as a signed JWT (or
//!   COSE_Sign1) with a `status_list` claim.
//!
//! Status is orthogonal to cryptographic validity: a presentation can
//! verify perfectly and still be revoked.

pub mod list;
pub mod token;

pub use list::{RevocationList, StatusListCredentialBuilder, check_revocation};
pub use token::{StatusListToken, StatusListTokenBuilder};
