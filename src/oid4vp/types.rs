//! Request and response types for the OpenID4VP exchange.

use std::collections::HashMap;

use chrono::serde::ts_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dif_exch::{FormatProfile, PresentationDefinition, PresentationSubmission};
use crate::format::ClaimFormat;
use crate::format::mdoc::VerifiedDocument;
use crate::format::sd_jwt::VerifiedSdJwt;
use crate::format::w3c_vc::VerifiedVc;
use crate::jose::jwk::{Jwks, PublicKeyJwk};
use crate::{Error, Result};

/// How the Verifier identifies itself to the Wallet. Chosen at
/// construction; several schemes constrain how requests may be sent.
#[derive(Clone, Debug)]
pub enum ClientIdScheme {
    /// The Wallet knows the Verifier's metadata out of band.
    PreRegistered {
        /// The pre-registered client identifier.
        client_id: String,
    },

    /// The client identifier is the redirect URI itself; nothing else is
    /// known about the Verifier.
    RedirectUri {
        /// The redirection endpoint.
        redirect_uri: String,
    },

    /// The Verifier authenticates with an X.509 certificate whose SAN
    /// dNSName equals the client identifier. Requests MUST be signed and
    /// `redirect_uri` response modes are not permitted.
    CertificateSanDns {
        /// The DNS-name client identifier.
        client_id: String,

        /// The certificate chain, leaf first, DER-encoded.
        chain: Vec<Vec<u8>>,
    },

    /// The Verifier carries an attestation JWT issued by a trusted
    /// attester; the client identifier equals the attestation's `sub`.
    /// Requests MUST be signed.
    VerifierAttestation {
        /// The attested client identifier.
        client_id: String,

        /// The attestation JWT, carried in the JWS `jwt` header.
        attestation_jwt: String,
    },
}

impl ClientIdScheme {
    /// The `client_id` in its emitted (scheme-embedded) form.
    #[must_use]
    pub fn client_id(&self) -> String {
        match self {
            Self::PreRegistered { client_id } => client_id.clone(),
            Self::RedirectUri { redirect_uri } => format!("redirect_uri:{redirect_uri}"),
            Self::CertificateSanDns { client_id, .. } => format!("x509_san_dns:{client_id}"),
            Self::VerifierAttestation { client_id, .. } => {
                format!("verifier_attestation:{client_id}")
            }
        }
    }

    /// The bare identifier, without the scheme prefix. This is the value
    /// presentations are audience-bound to.
    #[must_use]
    pub fn bare_client_id(&self) -> &str {
        match self {
            Self::PreRegistered { client_id } | Self::CertificateSanDns { client_id, .. } |
            Self::VerifierAttestation { client_id, .. } => client_id,
            Self::RedirectUri { redirect_uri } => redirect_uri,
        }
    }

    /// Whether authorization requests under this scheme must be signed.
    #[must_use]
    pub const fn requires_signed_request(&self) -> bool {
        matches!(self, Self::CertificateSanDns { .. } | Self::VerifierAttestation { .. })
    }
}

/// Split a received `client_id` into `(scheme, bare id)`, accepting both
/// the embedded form and the legacy top-level `client_id_scheme`
/// parameter.
#[must_use]
pub fn split_client_id<'a>(
    client_id: &'a str, legacy_scheme: Option<&'a str>,
) -> (&'a str, &'a str) {
    for scheme in ["redirect_uri", "x509_san_dns", "verifier_attestation", "pre-registered"] {
        if let Some(bare) = client_id.strip_prefix(&format!("{scheme}:")) {
            return (scheme, bare);
        }
    }
    (legacy_scheme.unwrap_or("pre-registered"), client_id)
}

/// The type of response expected from the Wallet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ResponseType {
    /// A VP Token is returned in the Authorization Response.
    #[default]
    #[serde(rename = "vp_token")]
    VpToken,

    /// A Self-Issued ID Token is returned (SIOPv2).
    #[serde(rename = "id_token")]
    IdToken,

    /// Both a VP Token and a Self-Issued ID Token are returned.
    #[serde(rename = "vp_token id_token")]
    VpTokenIdToken,
}

impl ResponseType {
    /// Whether a `vp_token` is expected.
    #[must_use]
    pub const fn wants_vp_token(&self) -> bool {
        matches!(self, Self::VpToken | Self::VpTokenIdToken)
    }

    /// Whether an `id_token` is expected.
    #[must_use]
    pub const fn wants_id_token(&self) -> bool {
        matches!(self, Self::IdToken | Self::VpTokenIdToken)
    }
}

/// Inform the Wallet of the mechanism to use when returning an
/// Authorization Response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "response_mode")]
pub enum ResponseMode {
    /// Parameters returned in the fragment of the redirect URI.
    #[serde(rename = "fragment")]
    Fragment {
        /// The Verifier's redirection endpoint.
        redirect_uri: String,
    },

    /// Parameters returned in the query of the redirect URI.
    #[serde(rename = "query")]
    Query {
        /// The Verifier's redirection endpoint.
        redirect_uri: String,
    },

    /// The Wallet POSTs the response to an endpoint controlled by the
    /// Verifier.
    #[serde(rename = "direct_post")]
    DirectPost {
        /// The URI to which the Wallet sends the Authorization Response.
        response_uri: String,
    },

    /// As `direct_post`, except the parameters travel inside a signed or
    /// encrypted JWT in the `response` form field.
    #[serde(rename = "direct_post.jwt")]
    DirectPostJwt {
        /// The URI to which the Wallet sends the Authorization Response.
        response_uri: String,
    },
}

impl Default for ResponseMode {
    fn default() -> Self {
        Self::Fragment { redirect_uri: String::new() }
    }
}

impl ResponseMode {
    /// The `redirect_uri`, for the redirect-based modes.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        match self {
            Self::Fragment { redirect_uri } | Self::Query { redirect_uri } => Some(redirect_uri),
            _ => None,
        }
    }

    /// The `response_uri`, for the POST-based modes.
    #[must_use]
    pub fn response_uri(&self) -> Option<&str> {
        match self {
            Self::DirectPost { response_uri } | Self::DirectPostJwt { response_uri } => {
                Some(response_uri)
            }
            _ => None,
        }
    }
}

/// The query used to request Verifiable Presentations: a Presentation
/// Definition by value or by reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Query {
    /// A Presentation Definition object embedded in the request.
    #[serde(rename = "presentation_definition")]
    Definition(PresentationDefinition),

    /// A URI the definition can be retrieved from.
    #[serde(rename = "presentation_definition_uri")]
    DefinitionUri(String),
}

impl Default for Query {
    fn default() -> Self {
        Self::Definition(PresentationDefinition::default())
    }
}

/// Client metadata, inline or by reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ClientMetadata {
    /// Metadata values embedded in the request.
    #[serde(rename = "client_metadata")]
    Inline(VerifierMetadata),

    /// A URI serving the metadata as JSON.
    #[serde(rename = "client_metadata_uri")]
    Uri(String),
}

/// Verifier (Relying Party) metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VerifierMetadata {
    /// Human-friendly client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Keys the Wallet may encrypt the Authorization Response to, and any
    /// ephemeral keys for this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Jwks>,

    /// Formats and algorithms of Verifiable Presentations the Verifier
    /// supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_formats: Option<HashMap<ClaimFormat, FormatProfile>>,

    /// JARM: algorithm the response JWT must be signed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_alg: Option<String>,

    /// JARM: key-management algorithm for an encrypted response. The
    /// `…AlgString` spelling from older drafts is accepted on parse.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(alias = "authorizationEncryptedResponseAlgString")]
    pub authorization_encrypted_response_alg: Option<String>,

    /// JARM: content-encryption algorithm for an encrypted response.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(alias = "authorizationEncryptedResponseEncString")]
    pub authorization_encrypted_response_enc: Option<String>,

    /// Registered redirection endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,
}

/// The Authorization Request parameters, sent by value, by reference, or
/// as claims of a signed JAR.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestObject {
    /// The type of response expected from the Wallet.
    pub response_type: ResponseType,

    /// The Verifier's client identifier, scheme embedded.
    pub client_id: String,

    /// Legacy top-level scheme parameter (older drafts). Accepted on parse;
    /// never emitted — the scheme is embedded in `client_id` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<String>,

    /// Binds the presentation to this transaction. Fresh per request and
    /// single-use.
    pub nonce: String,

    /// Opaque state maintained between request and response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// The response mechanism and its endpoint.
    #[serde(flatten)]
    pub response_mode: ResponseMode,

    /// The presentation query.
    #[serde(flatten)]
    pub query: Query,

    /// Verifier metadata embedded in the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<VerifierMetadata>,

    /// A URI serving the Verifier metadata as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata_uri: Option<String>,

    /// Scope shorthand for a pre-defined presentation request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl RequestObject {
    /// The embedded presentation definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] when the definition is only
    /// available by reference.
    pub fn presentation_definition(&self) -> Result<&PresentationDefinition> {
        match &self.query {
            Query::Definition(definition) => Ok(definition),
            Query::DefinitionUri(_) => Err(Error::InvalidStructure(
                "presentation definition is by reference".to_string(),
            )),
        }
    }

    /// Serialize to URL query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on serialization failure.
    pub fn to_querystring(&self) -> Result<String> {
        crate::core::urlencode::to_string(self)
    }
}

/// Claims of a signed JAR (JWT-secured authorization request).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct JarClaims {
    /// The request issuer — the Verifier's client identifier.
    pub iss: String,

    /// The intended audience of the request.
    pub aud: String,

    /// The request parameters.
    #[serde(flatten)]
    pub request: RequestObject,
}

/// The audience value wallets expect on signed requests.
pub const WALLET_AUDIENCE: &str = "https://self-issued.me/v2";

/// The Authorization Response parameters returned by the Wallet.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthorizationResponse {
    /// The VP token: a presentation string, or an array of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<Value>,

    /// Locates each presentation within the VP token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,

    /// The Self-Issued ID Token, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// The request's `state`, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Self-Issued ID Token claims (SIOPv2).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IdTokenClaims {
    /// The self-issuer: equal to `sub`.
    pub iss: String,

    /// The thumbprint identifier of `sub_jwk`.
    pub sub: String,

    /// The Verifier's client identifier.
    pub aud: String,

    /// The request nonce.
    pub nonce: String,

    /// Issued at.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// Expiry.
    #[serde(with = "ts_seconds")]
    pub exp: DateTime<Utc>,

    /// The key the token is self-signed with.
    pub sub_jwk: PublicKeyJwk,
}

/// The outcome of validating one presentation-submission descriptor.
#[derive(Clone, Debug)]
pub enum PresentationOutcome {
    /// A verified `jwt_vp`/`jwt_vc` presentation.
    JwtVc {
        /// The matched descriptor.
        descriptor_id: String,

        /// The verified credentials (one per VC in the presentation).
        credentials: Vec<VerifiedVc>,

        /// Revocation status, when a status check was performed.
        revoked: Option<bool>,
    },

    /// A verified SD-JWT presentation.
    SdJwt {
        /// The matched descriptor.
        descriptor_id: String,

        /// The verified presentation.
        presentation: VerifiedSdJwt,
    },

    /// A verified mdoc device response.
    Mdoc {
        /// The matched descriptor.
        descriptor_id: String,

        /// The verified documents.
        documents: Vec<VerifiedDocument>,
    },

    /// This descriptor failed validation; others are unaffected.
    Invalid {
        /// The failed descriptor.
        descriptor_id: String,

        /// The field or check that failed.
        field: String,
    },
}

/// The structured outcome of response validation. No error escapes
/// [`crate::Openid4VpVerifier::validate_response`]; failures are variants
/// here.
#[derive(Clone, Debug)]
pub enum AuthResponseOutcome {
    /// The response validated; per-descriptor results enclosed.
    Success {
        /// The request state this response answers.
        state: String,

        /// One outcome per submitted descriptor.
        presentations: Vec<PresentationOutcome>,

        /// The validated ID token, when one was requested.
        id_token: Option<IdTokenClaims>,
    },

    /// The response could not be processed at all.
    Error {
        /// What went wrong.
        reason: String,

        /// The state, when it could be recovered.
        state: Option<String>,
    },

    /// A specific field failed validation.
    ValidationError {
        /// The offending field.
        field: String,

        /// The state, when it could be recovered.
        state: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_object_serde() {
        let request = RequestObject {
            response_type: ResponseType::VpToken,
            client_id: "redirect_uri:https://verifier.example/cb".to_string(),
            nonce: "n1".to_string(),
            state: Some("s1".to_string()),
            response_mode: ResponseMode::Fragment {
                redirect_uri: "https://verifier.example/cb".to_string(),
            },
            ..RequestObject::default()
        };

        let value = serde_json::to_value(&request).expect("should serialize");
        assert_eq!(value["response_mode"], "fragment");
        assert_eq!(value["response_type"], "vp_token");
        // the legacy scheme parameter is not emitted
        assert!(value.get("client_id_scheme").is_none());

        let parsed: RequestObject = serde_json::from_value(value).expect("should deserialize");
        assert_eq!(parsed, request);
    }

    #[test]
    fn legacy_scheme_accepted() {
        let parsed: RequestObject = serde_json::from_value(json!({
            "response_type": "vp_token",
            "client_id": "https://verifier.example/rp1",
            "client_id_scheme": "pre-registered",
            "nonce": "n",
            "response_mode": "direct_post",
            "response_uri": "https://verifier.example/cb",
            "presentation_definition": {"id": "d", "input_descriptors": []}
        }))
        .expect("should deserialize");

        let (scheme, bare) =
            split_client_id(&parsed.client_id, parsed.client_id_scheme.as_deref());
        assert_eq!(scheme, "pre-registered");
        assert_eq!(bare, "https://verifier.example/rp1");
    }

    #[test]
    fn embedded_scheme_split() {
        let (scheme, bare) = split_client_id("x509_san_dns:verifier.example", None);
        assert_eq!(scheme, "x509_san_dns");
        assert_eq!(bare, "verifier.example");
    }

    #[test]
    fn metadata_alias_accepted() {
        let metadata: VerifierMetadata = serde_json::from_value(json!({
            "authorizationEncryptedResponseAlgString": "ECDH-ES",
            "authorization_encrypted_response_enc": "A256GCM"
        }))
        .expect("should deserialize");
        assert_eq!(metadata.authorization_encrypted_response_alg.as_deref(), Some("ECDH-ES"));
        assert_eq!(metadata.authorization_encrypted_response_enc.as_deref(), Some("A256GCM"));
    }
}
