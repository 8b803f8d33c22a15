//! # Credential Formats
//!
//! The three interoperable credential representations the engine speaks:
//!
//! * [`w3c_vc`] — W3C Verifiable Credentials secured as compact JWTs.
//! * [`sd_jwt`] — IETF SD-JWT VCs with selective disclosure.
//! * [`mdoc`] — ISO/IEC 18013-5 mobile documents (CBOR/COSE).

pub mod mdoc;
pub mod sd_jwt;
pub mod w3c_vc;

use serde::{Deserialize, Serialize};

/// Claim format designations used in presentation definitions and
/// submissions.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum ClaimFormat {
    /// W3C VC secured as a compact JWT.
    #[default]
    #[serde(rename = "jwt_vc")]
    JwtVc,

    /// Alias used by newer profiles for the same representation.
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,

    /// W3C Verifiable Presentation secured as a compact JWT.
    #[serde(rename = "jwt_vp")]
    JwtVp,

    /// SD-JWT credential (legacy designation).
    #[serde(rename = "jwt_sd")]
    JwtSd,

    /// SD-JWT verifiable credential.
    #[serde(rename = "vc+sd-jwt")]
    VcSdJwt,

    /// SD-JWT verifiable credential (digital credentials profile).
    #[serde(rename = "dc+sd-jwt")]
    DcSdJwt,

    /// ISO mdoc.
    #[serde(rename = "mso_mdoc")]
    MsoMdoc,
}

impl ClaimFormat {
    /// Whether the format is one of the SD-JWT designations.
    #[must_use]
    pub const fn is_sd_jwt(&self) -> bool {
        matches!(self, Self::JwtSd | Self::VcSdJwt | Self::DcSdJwt)
    }

    /// Whether the format is one of the W3C JWT designations.
    #[must_use]
    pub const fn is_w3c_jwt(&self) -> bool {
        matches!(self, Self::JwtVc | Self::JwtVcJson | Self::JwtVp)
    }
}
