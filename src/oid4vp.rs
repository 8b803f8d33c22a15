//! # OpenID for Verifiable Presentations
//!
//! The Verifier side of the [OpenID4VP](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html)
//! / [SIOPv2](https://openid.net/specs/openid-connect-self-issued-v2-1_0.html)
//! exchange: constructing authorization requests (by value, by reference,
//! or as signed JARs), tracking per-request state and nonces, and
//! validating authorization responses across every supported response mode
//! and credential format.

pub mod request;
pub mod response;
pub mod state;
pub mod types;

use crate::datetime::Leeway;
use crate::format::mdoc::TypeCodecRegistry;
use crate::jose::jwk::PublicKeyJwk;
use crate::key::KeyMaterial;
use crate::provider::{Clock, Signer, StateStore, SystemClock};
use crate::store::NonceService;
use crate::{Error, Result};

pub use self::request::{CreateRequestOptions, CreatedRequest, RequestMode};
pub use self::response::{NoFetch, ResponsePayload};
pub use self::types::{
    AuthResponseOutcome, AuthorizationResponse, ClientIdScheme, ClientMetadata, IdTokenClaims,
    PresentationOutcome, Query, RequestObject, ResponseMode, ResponseType, VerifierMetadata,
};

/// The Verifier protocol engine.
///
/// Thread-safe at the public API: concurrent protocol runs are isolated by
/// `state`, with request creation happening-before its response validation
/// through the state store.
pub struct Openid4VpVerifier<'a, S: Signer, St: StateStore> {
    pub(crate) scheme: ClientIdScheme,
    pub(crate) signer: &'a S,
    pub(crate) store: &'a St,
    pub(crate) nonces: NonceService,
    pub(crate) encryption_key: Option<&'a KeyMaterial>,
    pub(crate) trust_anchors: Vec<PublicKeyJwk>,
    pub(crate) registry: TypeCodecRegistry,
    pub(crate) leeway: Leeway,
    pub(crate) clock: Box<dyn Clock>,
}

impl<'a, S: Signer, St: StateStore> Openid4VpVerifier<'a, S, St> {
    /// Create a verifier with the given client-identifier scheme, signing
    /// key, and state store.
    pub fn new(scheme: ClientIdScheme, signer: &'a S, store: &'a St) -> Self {
        Self {
            scheme,
            signer,
            store,
            nonces: NonceService::new(),
            encryption_key: None,
            trust_anchors: vec![],
            registry: TypeCodecRegistry::new(),
            leeway: Leeway::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// The key encrypted (`direct_post.jwt`) responses are addressed to.
    /// Its public form is advertised in the request's `client_metadata`
    /// JWKS.
    #[must_use]
    pub fn with_encryption_key(mut self, key: &'a KeyMaterial) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Trust a credential issuer key. Presentations from issuers outside
    /// the trust list fail with `UnknownKey`.
    #[must_use]
    pub fn trust(mut self, issuer_key: PublicKeyJwk) -> Self {
        self.trust_anchors.push(issuer_key);
        self
    }

    /// The element codec registry for mdoc verification.
    #[must_use]
    pub fn with_registry(mut self, registry: TypeCodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the default time leeway.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Leeway) -> Self {
        self.leeway = leeway;
        self
    }

    /// Override the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Construct an authorization request, record its state and nonce, and
    /// return the URL (and any artifacts to serve by reference).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for scheme/mode combinations the protocol
    /// forbids, and signing errors for signed request modes.
    pub async fn create_request(&self, options: CreateRequestOptions) -> Result<CreatedRequest> {
        request::create(self, options).await
    }

    /// The plain request object to serve at `request_uri` for
    /// [`RequestMode::ByReference`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStructure`] for unknown or expired state.
    pub async fn request_object(&self, state: &str) -> Result<RequestObject> {
        let stored: Option<state::State> = self
            .store
            .get(state)
            .await
            .map_err(|e| Error::Fetch(format!("issue reading state: {e}")))?;
        let Some(stored) = stored else {
            return Err(Error::InvalidStructure(format!("no request for state: {state}")));
        };
        if stored.expired() {
            return Err(Error::ExpiredOrNotYetValid("request state has expired".to_string()));
        }
        Ok(stored.request_object)
    }

    /// The signed JAR (`application/oauth-authz-req+jwt`) to serve at
    /// `request_uri` for [`RequestMode::SignedByReference`].
    ///
    /// # Errors
    ///
    /// Returns state-lookup errors and signing errors.
    pub async fn request_jwt(&self, state: &str) -> Result<String> {
        let request_object = self.request_object(state).await?;
        request::sign_jar(self, &request_object).await
    }

    /// Validate an authorization response. All failures are reported as
    /// structured outcomes; this method never returns an error.
    pub async fn validate_response(&self, payload: ResponsePayload<'_>) -> AuthResponseOutcome {
        response::validate(self, payload, Option::<&NoFetch>::None).await
    }

    /// As [`Self::validate_response`], additionally evaluating each
    /// verified credential's revocation status through the given fetcher.
    pub async fn validate_response_with_status(
        &self, payload: ResponsePayload<'_>, fetcher: &impl crate::provider::Fetcher,
    ) -> AuthResponseOutcome {
        response::validate(self, payload, Some(fetcher)).await
    }
}
