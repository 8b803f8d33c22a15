//! Authorization request construction.
//!
//! Four delivery modes: plain parameters on the URL, a `request_uri`
//! serving plain parameters, a signed JAR by value, and a `request_uri`
//! serving a signed JAR. Schemes that authenticate the Verifier
//! (`x509_san_dns`, `verifier_attestation`) require a signed mode.

use base64ct::{Base64, Encoding};

use crate::core::generate;
use crate::dif_exch::PresentationDefinition;
use crate::jose::jws::{self, JwsType, Protected};
use crate::oid4vp::state::State;
use crate::oid4vp::types::{
    ClientIdScheme, ClientMetadata, JarClaims, Query, RequestObject, ResponseMode, ResponseType,
    VerifierMetadata, WALLET_AUDIENCE,
};
use crate::oid4vp::Openid4VpVerifier;
use crate::provider::{Signer, StateStore};
use crate::{Error, Result};

/// How the request reaches the Wallet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestMode {
    /// Parameters on the URL, unsigned. Forbidden for schemes that require
    /// request authentication.
    #[default]
    Query,

    /// `client_id` and `request_uri` on the URL; the URI serves the plain
    /// request parameters as JSON.
    ByReference {
        /// Where the Wallet can fetch the request.
        request_uri: String,
    },

    /// The URL carries `request=<signed JAR>`.
    SignedByValue,

    /// `client_id` and `request_uri` on the URL; the URI serves the signed
    /// JAR.
    SignedByReference {
        /// Where the Wallet can fetch the JAR.
        request_uri: String,
    },
}

/// Options for [`Openid4VpVerifier::create_request`].
#[derive(Clone, Debug, Default)]
pub struct CreateRequestOptions {
    /// What the Wallet should return.
    pub response_type: ResponseType,

    /// The response mechanism and endpoint.
    pub response_mode: ResponseMode,

    /// The credentials being requested.
    pub presentation_definition: PresentationDefinition,

    /// Metadata to attach, inline or by URI. When the verifier holds an
    /// encryption key and none is given, a JWKS advertising that key is
    /// attached automatically.
    pub client_metadata: Option<ClientMetadata>,

    /// The delivery mode.
    pub mode: RequestMode,

    /// The wallet authorization endpoint the URL is built against.
    pub wallet_endpoint: Option<String>,
}

/// A constructed request, ready to hand to the Wallet.
#[derive(Clone, Debug)]
pub struct CreatedRequest {
    /// The URL to present (directly, or rendered for cross-device use).
    pub request_url: String,

    /// The full request parameters, as stored.
    pub request_object: RequestObject,

    /// The signed JAR, for the signed modes. For
    /// [`RequestMode::SignedByReference`] this is the body to serve at the
    /// `request_uri`.
    pub jar: Option<String>,

    /// The state key the paired response will carry.
    pub state: String,
}

const DEFAULT_WALLET_ENDPOINT: &str = "openid4vp://authorize";

pub(super) async fn create<S: Signer, St: StateStore>(
    verifier: &Openid4VpVerifier<'_, S, St>, options: CreateRequestOptions,
) -> Result<CreatedRequest> {
    tracing::debug!("create request");

    let signed_mode =
        matches!(options.mode, RequestMode::SignedByValue | RequestMode::SignedByReference { .. });
    if verifier.scheme.requires_signed_request() && !signed_mode {
        return Err(Error::Usage(format!(
            "client identifier scheme requires a signed request mode, got {:?}",
            options.mode
        )));
    }
    if matches!(verifier.scheme, ClientIdScheme::CertificateSanDns { .. })
        && options.response_mode.redirect_uri().is_some()
    {
        return Err(Error::Usage(
            "redirect_uri response modes are not permitted for x509_san_dns".to_string(),
        ));
    }

    // fresh nonce, recorded for single-use validation; opaque state
    let nonce = verifier.nonces.create();
    let state = generate::uri_token();

    let mut client_metadata = options.client_metadata;
    if client_metadata.is_none() {
        if let Some(encryption_key) = verifier.encryption_key {
            let mut jwk = encryption_key.public_jwk();
            jwk.use_ = Some("enc".to_string());
            client_metadata = Some(ClientMetadata::Inline(VerifierMetadata {
                jwks: Some(crate::jose::jwk::Jwks { keys: vec![jwk] }),
                authorization_encrypted_response_alg: Some("ECDH-ES".to_string()),
                authorization_encrypted_response_enc: Some("A256GCM".to_string()),
                ..VerifierMetadata::default()
            }));
        }
    }

    let (client_metadata, client_metadata_uri) = match client_metadata {
        Some(ClientMetadata::Inline(metadata)) => (Some(metadata), None),
        Some(ClientMetadata::Uri(uri)) => (None, Some(uri)),
        None => (None, None),
    };

    let request_object = RequestObject {
        response_type: options.response_type,
        client_id: verifier.scheme.client_id(),
        client_id_scheme: None,
        nonce,
        state: Some(state.clone()),
        response_mode: options.response_mode,
        query: Query::Definition(options.presentation_definition),
        client_metadata,
        client_metadata_uri,
        scope: None,
    };

    // request creation happens-before response validation via this write
    let stored = State::new(request_object.clone());
    verifier
        .store
        .put(&state, &stored, stored.expires_at)
        .await
        .map_err(|e| Error::Fetch(format!("issue saving state: {e}")))?;

    let endpoint =
        options.wallet_endpoint.unwrap_or_else(|| DEFAULT_WALLET_ENDPOINT.to_string());
    let client_id = urlencoding::encode(&request_object.client_id).to_string();

    let (request_url, jar) = match options.mode {
        RequestMode::Query => {
            let qs = request_object.to_querystring()?;
            (format!("{endpoint}?{qs}"), None)
        }
        RequestMode::ByReference { request_uri } => {
            let uri = urlencoding::encode(&request_uri).to_string();
            (format!("{endpoint}?client_id={client_id}&request_uri={uri}"), None)
        }
        RequestMode::SignedByValue => {
            let jar = sign_jar(verifier, &request_object).await?;
            (format!("{endpoint}?client_id={client_id}&request={jar}"), Some(jar))
        }
        RequestMode::SignedByReference { request_uri } => {
            let jar = sign_jar(verifier, &request_object).await?;
            let uri = urlencoding::encode(&request_uri).to_string();
            (format!("{endpoint}?client_id={client_id}&request_uri={uri}"), Some(jar))
        }
    };

    Ok(CreatedRequest { request_url, request_object, jar, state })
}

/// Sign the request as a JAR. The header carries the artifacts the chosen
/// scheme authenticates with: the `x5c` chain or the attestation `jwt`.
pub(super) async fn sign_jar<S: Signer, St: StateStore>(
    verifier: &Openid4VpVerifier<'_, S, St>, request_object: &RequestObject,
) -> Result<String> {
    let mut header = Protected {
        alg: verifier.signer.algorithm(),
        typ: Some(JwsType::OauthAuthzReqJwt),
        ..Protected::default()
    };
    match &verifier.scheme {
        ClientIdScheme::CertificateSanDns { chain, .. } => {
            if chain.is_empty() {
                return Err(Error::Usage("x509_san_dns requires a certificate chain".to_string()));
            }
            header.x5c = Some(chain.iter().map(|der| Base64::encode_string(der)).collect());
        }
        ClientIdScheme::VerifierAttestation { attestation_jwt, .. } => {
            header.jwt = Some(attestation_jwt.clone());
            header.kid = Some(verifier.signer.verification_method());
        }
        _ => header.kid = Some(verifier.signer.verification_method()),
    }
    let claims = JarClaims {
        iss: request_object.client_id.clone(),
        aud: WALLET_AUDIENCE.to_string(),
        request: request_object.clone(),
    };

    jws::encode_with_header(&header, &claims, verifier.signer).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::key::{Curve, KeyMaterial};
    use crate::oid4vp::ClientIdScheme;
    use crate::store::InMemoryStateStore;

    fn definition() -> PresentationDefinition {
        serde_json::from_value(json!({
            "id": "d1",
            "input_descriptors": [{"id": "employment", "constraints": {}}]
        }))
        .expect("should deserialize")
    }

    #[tokio::test]
    async fn query_mode_url_carries_parameters() {
        let key = KeyMaterial::generate(Curve::P256);
        let store = InMemoryStateStore::new();
        let verifier = Openid4VpVerifier::new(
            ClientIdScheme::RedirectUri {
                redirect_uri: "https://verifier.example/cb".to_string(),
            },
            &key,
            &store,
        );

        let created = verifier
            .create_request(CreateRequestOptions {
                response_mode: ResponseMode::Fragment {
                    redirect_uri: "https://verifier.example/cb".to_string(),
                },
                presentation_definition: definition(),
                ..CreateRequestOptions::default()
            })
            .await
            .expect("should create");

        assert!(created.request_url.contains("response_type=vp_token"));
        assert!(created.request_url.contains("nonce="));
        assert!(created.jar.is_none());

        // the request is retrievable under its state
        let stored = verifier.request_object(&created.state).await.expect("state stored");
        assert_eq!(stored.nonce, created.request_object.nonce);
    }

    #[tokio::test]
    async fn san_dns_requires_signing() {
        let key = KeyMaterial::generate(Curve::P256);
        let store = InMemoryStateStore::new();
        let verifier = Openid4VpVerifier::new(
            ClientIdScheme::CertificateSanDns {
                client_id: "verifier.example".to_string(),
                chain: vec![vec![0x30]],
            },
            &key,
            &store,
        );

        let result = verifier
            .create_request(CreateRequestOptions {
                response_mode: ResponseMode::DirectPost {
                    response_uri: "https://verifier.example/cb".to_string(),
                },
                presentation_definition: definition(),
                mode: RequestMode::Query,
                ..CreateRequestOptions::default()
            })
            .await;
        assert!(matches!(result, Err(Error::Usage(_))));

        // redirect-based response modes are also rejected
        let result = verifier
            .create_request(CreateRequestOptions {
                response_mode: ResponseMode::Fragment {
                    redirect_uri: "https://verifier.example/cb".to_string(),
                },
                presentation_definition: definition(),
                mode: RequestMode::SignedByValue,
                ..CreateRequestOptions::default()
            })
            .await;
        assert!(matches!(result, Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn signed_by_reference_serves_jar() {
        let key = KeyMaterial::generate(Curve::P256);
        let store = InMemoryStateStore::new();
        let verifier = Openid4VpVerifier::new(
            ClientIdScheme::PreRegistered { client_id: "https://verifier.example/rp1".to_string() },
            &key,
            &store,
        );

        let created = verifier
            .create_request(CreateRequestOptions {
                response_mode: ResponseMode::DirectPost {
                    response_uri: "https://verifier.example/cb".to_string(),
                },
                presentation_definition: definition(),
                mode: RequestMode::SignedByReference {
                    request_uri: "https://verifier.example/request/1".to_string(),
                },
                ..CreateRequestOptions::default()
            })
            .await
            .expect("should create");

        assert!(created.request_url.contains("request_uri="));
        let jar = created.jar.expect("jar present");

        // servable again from state
        let served = verifier.request_jwt(&created.state).await.expect("should serve");
        let a = crate::jose::jws::decode_unverified::<JarClaims>(&jar).unwrap();
        let b = crate::jose::jws::decode_unverified::<JarClaims>(&served).unwrap();
        assert_eq!(a.claims.request, b.claims.request);
    }
}
