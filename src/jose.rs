//! # JSON Object Signing and Encryption (JOSE)
//!
//! JOSE proofs are enveloping proofs based on JWT [RFC7519], JWS [RFC7515],
//! and JWK [RFC7517], with JWE [RFC7516] carrying encrypted authorization
//! responses.
//!
//! [RFC7515]: https://www.rfc-editor.org/rfc/rfc7515
//! [RFC7516]: https://www.rfc-editor.org/rfc/rfc7516
//! [RFC7517]: https://www.rfc-editor.org/rfc/rfc7517
//! [RFC7519]: https://www.rfc-editor.org/rfc/rfc7519

pub mod jwa;
pub mod jwe;
pub mod jwk;
pub mod jws;
pub mod jwt;

pub use jwa::{Algorithm, ContentEncryption};
pub use jwk::PublicKeyJwk;
pub use jws::Jws;
pub use jwt::Jwt;
