//! # CBOR Object Signing and Encryption (COSE)
//!
//! COSE_Sign1 ([RFC9052]) construction and verification, with attached or
//! detached payloads, plus COSE_Key ↔ JWK conversion. mdoc issuer and device
//! authentication both ride on these.
//!
//! [RFC9052]: https://www.rfc-editor.org/rfc/rfc9052

pub mod key;
pub mod sign1;

pub use key::{from_cose_key, to_cose_key};
pub use sign1::{sign, sign_detached, verify, verify_detached};
