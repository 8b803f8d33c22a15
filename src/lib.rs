//! An engine for the issuance, holding, and verification of Verifiable
//! Credentials across three interoperable representations — W3C VC-JWT,
//! IETF SD-JWT VC, and ISO/IEC 18013-5 mdoc — together with the
//! [OpenID for Verifiable Presentations](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html)
//! request/response protocol spoken between a Verifier and a Wallet.
//!
//! The crate is organised around three agent roles:
//!
//! * [`Issuer`] — signs credentials in any of the three representations.
//! * [`Holder`] — stores credentials and builds presentations (selective
//!   disclosure and holder binding included).
//! * [`Openid4VpVerifier`] — drives the request/response protocol and
//!   validates what comes back.
//!
//! Lower layers (JOSE, COSE, CBOR, status lists) are public so they can be
//! used on their own.

pub mod cbor;
pub mod core;
pub mod cose;
pub mod datetime;
pub mod dif_exch;
mod error;
pub mod format;
pub mod holder;
pub mod issuer;
pub mod jose;
pub mod key;
pub mod oid4vp;
pub mod provider;
pub mod rqes;
pub mod status;
pub mod store;
pub mod verifier;
mod x509;

pub use crate::core::{Kind, OneMany};
pub use crate::error::{Error, Result};
pub use crate::holder::Holder;
pub use crate::issuer::Issuer;
pub use crate::key::KeyMaterial;
pub use crate::oid4vp::Openid4VpVerifier;
