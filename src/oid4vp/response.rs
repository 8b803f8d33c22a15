//! Authorization response handling: payload parsing across the response
//! modes, then the validation pipeline — state lookup, response-type
//! branch, per-descriptor verification, aggregation.
//!
//! Failures never escape as errors: every path lands in a structured
//! [`AuthResponseOutcome`].

use serde_json::Value;

use crate::dif_exch::DescriptorMap;
use crate::format::ClaimFormat;
use crate::format::mdoc::{DeviceBinding, DeviceResponse, SessionTranscript};
use crate::format::sd_jwt::{self, KeyBindingCheck};
use crate::format::w3c_vc::{self, VerifiedVc};
use crate::jose::jwe::Jwe;
use crate::jose::jws::Jws;
use crate::oid4vp::Openid4VpVerifier;
use crate::oid4vp::state::State;
use crate::oid4vp::types::{
    AuthResponseOutcome, AuthorizationResponse, IdTokenClaims, PresentationOutcome, RequestObject,
};
use crate::provider::{Fetcher, Signer, StateStore};
use crate::{Error, Result};

/// An authorization response as received on the wire.
#[derive(Clone, Copy, Debug)]
pub enum ResponsePayload<'a> {
    /// A redirect back to the Verifier: parameters in the URL fragment
    /// (`fragment` mode) or query (`query` mode).
    Url(&'a str),

    /// An `application/x-www-form-urlencoded` body POSTed to the
    /// `response_uri` (`direct_post` / `direct_post.jwt`).
    Form(&'a str),
}

/// A fetcher that always fails; used when no status checking is wanted.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFetch;

impl Fetcher for NoFetch {
    async fn fetch(&self, _uri: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("fetching is not configured")
    }
}

pub(super) async fn validate<S: Signer, St: StateStore, F: Fetcher>(
    verifier: &Openid4VpVerifier<'_, S, St>, payload: ResponsePayload<'_>, fetcher: Option<&F>,
) -> AuthResponseOutcome {
    // parse → (state, params); unparseable responses have no state to blame
    let (response, mdoc_nonce) = match parse_payload(verifier, payload) {
        Ok(parsed) => parsed,
        Err(e) => return AuthResponseOutcome::Error { reason: e.to_string(), state: None },
    };

    let state_key = response.state.clone();
    match validate_response(verifier, response, mdoc_nonce, fetcher).await {
        Ok(outcome) => outcome,
        Err(Error::InvalidStructure(field)) => {
            AuthResponseOutcome::ValidationError { field, state: state_key }
        }
        Err(e) => AuthResponseOutcome::Error { reason: e.to_string(), state: state_key },
    }
}

/// Decode the wire payload into response parameters. For `direct_post.jwt`
/// the parameters travel inside a JWS or JWE `response` value; a JWE's
/// `apu` carries the wallet-generated mdoc nonce.
fn parse_payload<S: Signer, St: StateStore>(
    verifier: &Openid4VpVerifier<'_, S, St>, payload: ResponsePayload<'_>,
) -> Result<(AuthorizationResponse, Option<String>)> {
    let params = match payload {
        ResponsePayload::Url(url) => {
            let (_, params) = url
                .split_once('#')
                .or_else(|| url.split_once('?'))
                .ok_or_else(|| Error::Parse("no parameters on redirect URL".to_string()))?;
            params.to_string()
        }
        ResponsePayload::Form(body) => body.to_string(),
    };

    let raw: serde_json::Map<String, Value> = crate::core::urlencode::from_str(&params)?;

    // direct_post.jwt: unwrap the response JWT first
    if let Some(Value::String(response_jwt)) = raw.get("response") {
        return unwrap_response_jwt(verifier, response_jwt);
    }

    let response = serde_json::from_value(Value::Object(raw))
        .map_err(|e| Error::Parse(format!("issue deserializing response: {e}")))?;
    Ok((response, None))
}

fn unwrap_response_jwt<S: Signer, St: StateStore>(
    verifier: &Openid4VpVerifier<'_, S, St>, response_jwt: &str,
) -> Result<(AuthorizationResponse, Option<String>)> {
    match response_jwt.split('.').count() {
        // encrypted: decrypt with our ephemeral-response key
        5 => {
            let Some(key) = verifier.encryption_key else {
                return Err(Error::Usage(
                    "no encryption key configured for encrypted responses".to_string(),
                ));
            };
            let jwe = Jwe::from_compact(response_jwt)?;
            let mdoc_nonce = jwe
                .apu_bytes()?
                .map(|bytes| String::from_utf8(bytes).map_err(|e| Error::Parse(e.to_string())))
                .transpose()?;
            let opened = jwe.decrypt(key)?;
            let response = serde_json::from_slice(&opened)
                .map_err(|e| Error::Parse(format!("issue deserializing response: {e}")))?;
            Ok((response, mdoc_nonce))
        }
        // signed: verify against the wallet key when one is embedded
        3 => {
            let jws: Jws = response_jwt.parse()?;
            if let Some(jwk) = jws.header.jwk() {
                jws.verify_with(jwk)?;
            }
            Ok((jws.claims()?, None))
        }
        _ => Err(Error::Parse("response is neither a JWS nor a JWE".to_string())),
    }
}

async fn validate_response<S: Signer, St: StateStore, F: Fetcher>(
    verifier: &Openid4VpVerifier<'_, S, St>, response: AuthorizationResponse,
    mdoc_nonce: Option<String>, fetcher: Option<&F>,
) -> Result<AuthResponseOutcome> {
    // [STATE-LOOKUP] — the request must exist and be live
    let Some(state_key) = &response.state else {
        return Err(Error::InvalidStructure("state".to_string()));
    };
    let stored: Option<State> = verifier
        .store
        .get(state_key)
        .await
        .map_err(|e| Error::Fetch(format!("issue reading state: {e}")))?;
    let Some(stored) = stored else {
        return Err(Error::InvalidStructure("state".to_string()));
    };
    if stored.expired() {
        return Err(Error::InvalidStructure("state".to_string()));
    }
    let request = stored.request_object;

    // consume: at most one response per request
    verifier
        .store
        .purge(state_key)
        .await
        .map_err(|e| Error::Fetch(format!("issue purging state: {e}")))?;
    if !verifier.nonces.verify_and_remove(&request.nonce) {
        return Err(Error::InvalidStructure("nonce".to_string()));
    }

    // [RESP-TYPE-BRANCH]
    let mut presentations = vec![];
    if request.response_type.wants_vp_token() {
        presentations =
            validate_vp_token(verifier, &request, &response, mdoc_nonce.as_deref(), fetcher)
                .await?;
    }

    let mut id_token = None;
    if request.response_type.wants_id_token() {
        let Some(token) = &response.id_token else {
            return Err(Error::InvalidStructure("id_token".to_string()));
        };
        id_token = Some(validate_id_token(verifier, &request, token)?);
    }

    Ok(AuthResponseOutcome::Success { state: state_key.clone(), presentations, id_token })
}

async fn validate_vp_token<S: Signer, St: StateStore, F: Fetcher>(
    verifier: &Openid4VpVerifier<'_, S, St>, request: &RequestObject,
    response: &AuthorizationResponse, mdoc_nonce: Option<&str>, fetcher: Option<&F>,
) -> Result<Vec<PresentationOutcome>> {
    let Some(vp_token) = &response.vp_token else {
        return Err(Error::InvalidStructure("vp_token".to_string()));
    };
    let Some(submission) = &response.presentation_submission else {
        return Err(Error::InvalidStructure("presentation_submission".to_string()));
    };
    if submission.descriptor_map.is_empty() {
        return Err(Error::InvalidStructure("presentation_submission".to_string()));
    }
    if let Ok(definition) = request.presentation_definition() {
        if submission.definition_id != definition.id {
            return Err(Error::InvalidStructure("presentation_submission".to_string()));
        }
    }

    // [FOR-EACH DESCRIPTOR] — failures are isolated per descriptor, never
    // short-circuiting the others
    let mut outcomes = vec![];
    for descriptor in &submission.descriptor_map {
        let outcome =
            match validate_descriptor(verifier, request, vp_token, descriptor, mdoc_nonce, fetcher)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::debug!("descriptor {} failed: {e}", descriptor.id);
                    PresentationOutcome::Invalid {
                        descriptor_id: descriptor.id.clone(),
                        field: "vpToken".to_string(),
                    }
                }
            };
        outcomes.push(outcome);
    }

    // a single descriptor returns the one result; a lone failure is the
    // response's failure
    if let [PresentationOutcome::Invalid { field, .. }] = outcomes.as_slice() {
        return Err(Error::InvalidStructure(field.clone()));
    }
    Ok(outcomes)
}

/// Locate an element by walking JSONPath hops in order. After the first
/// hop, a selected string that is a compact JWT is an envelope: its payload
/// is decoded and the walk continues inside.
fn locate_element(vp_token: &Value, paths: &[&str]) -> Result<Value> {
    let mut node = vp_token.clone();

    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            if let Value::String(envelope) = &node {
                if envelope.split('.').count() == 3 {
                    let jwt = crate::jose::jws::decode_unverified::<Value>(envelope)?;
                    node = jwt.claims;
                }
            }
        }

        let jsonpath = serde_json_path::JsonPath::parse(path)
            .map_err(|e| Error::Usage(format!("invalid JSONPath {path}: {e}")))?;
        let nodes = jsonpath.query(&node).all();
        let Some(found) = nodes.first() else {
            return Err(Error::InvalidStructure(format!(
                "descriptor path {path} selected nothing (step {i})"
            )));
        };
        node = (*found).clone();
    }
    Ok(node)
}

async fn validate_descriptor<S: Signer, St: StateStore, F: Fetcher>(
    verifier: &Openid4VpVerifier<'_, S, St>, request: &RequestObject, vp_token: &Value,
    descriptor: &DescriptorMap, mdoc_nonce: Option<&str>, fetcher: Option<&F>,
) -> Result<PresentationOutcome> {
    let now = verifier.clock.now();
    let audience = verifier.scheme.bare_client_id().to_string();

    // [VERIFY-FORMAT] — dispatch on the descriptor's (outermost) format
    match descriptor.format {
        ClaimFormat::JwtVp => {
            // the presentation JWT itself; nested paths are resolved by
            // the presentation verifier
            let element = locate_string(vp_token, &[descriptor.path.as_str()])?;
            let verified = w3c_vc::verify_presentation(
                &element,
                issuer_resolver(verifier.trust_anchors.clone()),
                &request.nonce,
                &audience,
                verifier.leeway,
                now,
            )
            .await?;

            let revoked =
                check_status(verifier, &verified.credentials, fetcher).await?;
            Ok(PresentationOutcome::JwtVc {
                descriptor_id: descriptor.id.clone(),
                credentials: verified.credentials,
                revoked,
            })
        }
        ClaimFormat::JwtVc | ClaimFormat::JwtVcJson => {
            let element = locate_string(vp_token, &descriptor.path_chain())?;
            let verified = w3c_vc::verify(
                &element,
                issuer_resolver(verifier.trust_anchors.clone()),
                None,
                verifier.leeway,
                now,
            )
            .await?;

            let credentials = vec![verified];
            let revoked = check_status(verifier, &credentials, fetcher).await?;
            Ok(PresentationOutcome::JwtVc {
                descriptor_id: descriptor.id.clone(),
                credentials,
                revoked,
            })
        }
        ClaimFormat::JwtSd | ClaimFormat::VcSdJwt | ClaimFormat::DcSdJwt => {
            let element = locate_string(vp_token, &descriptor.path_chain())?;
            let check = KeyBindingCheck { nonce: request.nonce.clone(), audience };
            let presentation = sd_jwt::verify(
                &element,
                issuer_resolver(verifier.trust_anchors.clone()),
                Some(&check),
                verifier.leeway,
                now,
            )
            .await?;
            Ok(PresentationOutcome::SdJwt { descriptor_id: descriptor.id.clone(), presentation })
        }
        ClaimFormat::MsoMdoc => {
            let element = locate_string(vp_token, &descriptor.path_chain())?;
            let device_response = DeviceResponse::from_base64url(&element)?;

            // encrypted responses bind through the session transcript; the
            // unencrypted path falls back to the bare challenge
            let binding = match mdoc_nonce {
                Some(mdoc_nonce) => {
                    let Some(response_uri) = request.response_mode.response_uri() else {
                        return Err(Error::InvalidStructure(
                            "transcript binding requires a response_uri".to_string(),
                        ));
                    };
                    DeviceBinding::Transcript(SessionTranscript::for_openid4vp(
                        &audience,
                        response_uri,
                        &request.nonce,
                        mdoc_nonce,
                    )?)
                }
                None => DeviceBinding::Challenge(request.nonce.clone()),
            };

            let documents = crate::format::mdoc::verify(
                &device_response,
                &verifier.trust_anchors,
                &binding,
                &verifier.registry,
                verifier.leeway,
                now,
            )?;
            Ok(PresentationOutcome::Mdoc { descriptor_id: descriptor.id.clone(), documents })
        }
    }
}

/// Locate the element and require it to be a string.
fn locate_string(vp_token: &Value, paths: &[&str]) -> Result<String> {
    match locate_element(vp_token, paths)? {
        Value::String(element) => Ok(element),
        other => Err(Error::InvalidStructure(format!(
            "descriptor path selected a non-string element: {other}"
        ))),
    }
}

/// Evaluate revocation for verified credentials that carry a status
/// reference. Without a fetcher the status is unknown (`None`).
async fn check_status<S: Signer, St: StateStore, F: Fetcher>(
    verifier: &Openid4VpVerifier<'_, S, St>, credentials: &[VerifiedVc], fetcher: Option<&F>,
) -> Result<Option<bool>> {
    let Some(fetcher) = fetcher else {
        return Ok(None);
    };

    let mut any_checked = false;
    let mut any_revoked = false;
    for credential in credentials {
        let Some(status) = &credential.claims.vc.credential_status else {
            continue;
        };
        any_checked = true;

        let bytes = fetcher
            .fetch(&status.status_list_credential)
            .await
            .map_err(|e| Error::Fetch(format!("issue fetching status list: {e}")))?;
        let list_jwt = String::from_utf8(bytes)
            .map_err(|e| Error::Parse(format!("status list is not UTF-8: {e}")))?;

        // the list names its signing key; resolve that, not a guess
        let list_jws: Jws = list_jwt.parse()?;
        let issuer_key = resolve_anchor(&verifier.trust_anchors, list_jws.header.kid())?;
        let revoked = crate::status::list::check_revocation(
            &list_jwt,
            &issuer_key,
            &credential.claims.iss,
            status.index()?,
            verifier.leeway,
            verifier.clock.now(),
        )
        .await?;
        any_revoked |= revoked;
    }

    Ok(any_checked.then_some(any_revoked))
}

fn validate_id_token<S: Signer, St: StateStore>(
    verifier: &Openid4VpVerifier<'_, S, St>, request: &RequestObject, token: &str,
) -> Result<IdTokenClaims> {
    let jws: Jws = token.parse().map_err(|_| Error::InvalidStructure("id_token".to_string()))?;
    let claims: IdTokenClaims =
        jws.claims().map_err(|_| Error::InvalidStructure("id_token".to_string()))?;

    // self-issued: the token verifies under its own sub_jwk
    jws.verify_with(&claims.sub_jwk)
        .map_err(|_| Error::InvalidStructure("id_token".to_string()))?;

    if claims.iss != claims.sub {
        return Err(Error::InvalidStructure("id_token".to_string()));
    }
    if claims.sub != claims.sub_jwk.identifier()? {
        return Err(Error::InvalidStructure("id_token".to_string()));
    }
    if claims.aud != request.client_id && claims.aud != verifier.scheme.bare_client_id() {
        return Err(Error::InvalidStructure("id_token".to_string()));
    }
    if claims.nonce != request.nonce {
        return Err(Error::InvalidStructure("id_token".to_string()));
    }
    let now = verifier.clock.now();
    verifier
        .leeway
        .check_issued_at(claims.iat, now)
        .and(verifier.leeway.check_window(None, Some(claims.exp), now))
        .map_err(|_| Error::InvalidStructure("id_token".to_string()))?;

    Ok(claims)
}

/// A `kid` resolver over a fixed trust-anchor list: exact thumbprint-URN
/// match wins, a sole anchor is assumed otherwise.
fn issuer_resolver(
    anchors: Vec<crate::jose::jwk::PublicKeyJwk>,
) -> impl Fn(String) -> std::pin::Pin<
    Box<dyn Future<Output = anyhow::Result<crate::jose::jwk::PublicKeyJwk>> + Send>,
> + Clone {
    move |kid: String| {
        let anchors = anchors.clone();
        Box::pin(async move { resolve_anchor(&anchors, Some(&kid)).map_err(Into::into) })
    }
}

fn resolve_anchor(
    anchors: &[crate::jose::jwk::PublicKeyJwk], kid: Option<&str>,
) -> Result<crate::jose::jwk::PublicKeyJwk> {
    if let Some(kid) = kid {
        for anchor in anchors {
            if anchor.identifier().is_ok_and(|id| id == kid) {
                return Ok(anchor.clone());
            }
        }
    }
    match anchors {
        [only] => Ok(only.clone()),
        _ => Err(Error::UnknownKey("no trust anchor matches".to_string())),
    }
}
