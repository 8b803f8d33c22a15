//! # Holder
//!
//! The wallet agent: stores credentials, validates incoming authorization
//! requests (including signed JARs and their scheme-specific checks), and
//! builds presentations routed per the requested response mode.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::{generate, urlencode};
use crate::dif_exch::{Claims, DescriptorMap, PresentationSubmission};
use crate::format::ClaimFormat;
use crate::format::mdoc::{
    DeviceBinding, DeviceResponseBuilder, IssuerSigned, SessionTranscript,
};
use crate::format::sd_jwt::{SdJwtParts, SdJwtPresentationBuilder};
use crate::format::w3c_vc::{W3cVcClaims, W3cVpBuilder};
use crate::jose::jwa::ContentEncryption;
use crate::jose::jwe;
use crate::jose::jws::{self, Jws, JwsType};
use crate::key::KeyMaterial;
use crate::oid4vp::types::{
    AuthorizationResponse, IdTokenClaims, JarClaims, RequestObject, ResponseMode, split_client_id,
};
use crate::provider::{Fetcher, Signer};
use crate::store::MapStore;
use crate::{Error, Result};

/// A credential held by the wallet.
#[derive(Clone, Debug)]
pub enum StoredCredential {
    /// A W3C VC-JWT.
    JwtVc {
        /// The compact serialization.
        raw: String,

        /// The decoded claims, for matching.
        claims: Box<W3cVcClaims>,
    },

    /// An SD-JWT with its full disclosure set.
    SdJwt {
        /// The tilde-separated serialization as issued.
        raw: String,
    },

    /// An ISO mdoc.
    Mdoc {
        /// The document type.
        doc_type: String,

        /// The issuer-signed structure.
        issuer_signed: Box<IssuerSigned>,
    },
}

impl StoredCredential {
    /// The claim format this credential presents as.
    #[must_use]
    pub const fn format(&self) -> ClaimFormat {
        match self {
            Self::JwtVc { .. } => ClaimFormat::JwtVp,
            Self::SdJwt { .. } => ClaimFormat::DcSdJwt,
            Self::Mdoc { .. } => ClaimFormat::MsoMdoc,
        }
    }
}

impl Claims for StoredCredential {
    fn to_json(&self) -> Result<Value> {
        match self {
            Self::JwtVc { claims, .. } => serde_json::to_value(claims.as_ref())
                .map_err(|e| Error::Parse(format!("issue serializing claims: {e}"))),
            Self::SdJwt { raw } => {
                // match against the full cleartext projection
                let parts = SdJwtParts::parse(raw)?;
                let jws: Jws = parts.issuer_jwt.parse()?;
                let mut payload: Value = jws.claims()?;
                if let Value::Object(object) = &mut payload {
                    for encoded in &parts.disclosures {
                        let disclosure =
                            crate::format::sd_jwt::Disclosure::from_encoded(encoded)?;
                        if let Some(name) = disclosure.name {
                            object.insert(name, disclosure.value);
                        }
                    }
                    object.remove("_sd");
                    object.remove("_sd_alg");
                }
                Ok(payload)
            }
            Self::Mdoc { doc_type, issuer_signed } => {
                let mut namespaces = serde_json::Map::new();
                if let Some(spaces) = &issuer_signed.name_spaces {
                    for (namespace, items) in spaces {
                        let mut elements = serde_json::Map::new();
                        for item in items {
                            elements.insert(
                                item.inner().element_identifier.clone(),
                                crate::cbor::to_json(&item.inner().element_value)?,
                            );
                        }
                        namespaces.insert(namespace.clone(), Value::Object(elements));
                    }
                }
                Ok(serde_json::json!({"docType": doc_type, "namespaces": namespaces}))
            }
        }
    }
}

/// What the holder chose to present for one input descriptor.
#[derive(Clone, Debug, Default)]
pub struct PresentationSelection {
    /// The input descriptor being answered.
    pub descriptor_id: String,

    /// The stored credential to present.
    pub credential_id: String,

    /// SD-JWT: the claims to disclose (others stay withheld).
    pub disclose: Vec<String>,

    /// mdoc: the elements to present, per namespace. Empty presents all.
    pub requested_elements: BTreeMap<String, Vec<String>>,
}

/// The wallet's answer, routed per the request's response mode.
#[derive(Clone, Debug)]
pub enum WalletResponse {
    /// Redirect to this URL (`fragment` / `query` modes).
    Redirect {
        /// The full redirect URL, parameters attached.
        url: String,
    },

    /// POST this body to the URI (`direct_post` / `direct_post.jwt`).
    Post {
        /// The `response_uri` to POST to.
        uri: String,

        /// The `application/x-www-form-urlencoded` body.
        body: String,
    },
}

/// The wallet agent. Exclusively owns its key material.
pub struct Holder {
    key: KeyMaterial,
    credentials: MapStore<String, StoredCredential>,
}

impl Holder {
    /// A holder using the given key for holder binding and device
    /// authentication.
    #[must_use]
    pub fn new(key: KeyMaterial) -> Self {
        Self { key, credentials: MapStore::new() }
    }

    /// The holder's key material.
    #[must_use]
    pub const fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Store a credential, returning its local identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the credential cannot be decoded.
    pub fn store(&self, credential: StoredCredential) -> Result<String> {
        let id = generate::uri_token();
        self.credentials.put(id.clone(), credential);
        Ok(id)
    }

    /// Store a VC-JWT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the token cannot be decoded.
    pub fn store_jwt_vc(&self, raw: &str) -> Result<String> {
        let jwt = jws::decode_unverified::<W3cVcClaims>(raw)?;
        self.store(StoredCredential::JwtVc { raw: raw.to_string(), claims: Box::new(jwt.claims) })
    }

    /// Store an SD-JWT (as issued, with all disclosures).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the serialization cannot be split.
    pub fn store_sd_jwt(&self, raw: &str) -> Result<String> {
        SdJwtParts::parse(raw)?;
        self.store(StoredCredential::SdJwt { raw: raw.to_string() })
    }

    /// Store an mdoc.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the MSO cannot be decoded.
    pub fn store_mdoc(&self, issuer_signed: IssuerSigned) -> Result<String> {
        let mso = issuer_signed.mobile_security_object()?;
        self.store(StoredCredential::Mdoc {
            doc_type: mso.doc_type,
            issuer_signed: Box::new(issuer_signed),
        })
    }

    /// Fetch a stored credential.
    #[must_use]
    pub fn credential(&self, id: &str) -> Option<StoredCredential> {
        self.credentials.get(&id.to_string())
    }

    /// Resolve and validate an incoming authorization request URL.
    ///
    /// Handles all four delivery modes: parameters by value, a signed JAR
    /// by value (`request`), and either form by reference (`request_uri`,
    /// resolved through the fetcher). Signed requests are verified
    /// according to their client-identifier scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] when a reference cannot be resolved and
    /// the scheme-specific errors of [`Self::validate_jar`].
    pub async fn parse_request(
        &self, url: &str, fetcher: &impl Fetcher,
    ) -> Result<RequestObject> {
        tracing::debug!("parse request");

        let params = url.split_once('?').map_or(url, |(_, qs)| qs);
        let raw: serde_json::Map<String, Value> = urlencode::from_str(params)?;

        if let Some(Value::String(jar)) = raw.get("request") {
            return self.validate_jar(jar);
        }
        if let Some(Value::String(request_uri)) = raw.get("request_uri") {
            let bytes = fetcher
                .fetch(request_uri)
                .await
                .map_err(|e| Error::Fetch(format!("issue fetching request_uri: {e}")))?;
            let body = String::from_utf8(bytes)
                .map_err(|e| Error::Parse(format!("request_uri body is not UTF-8: {e}")))?;

            // a JAR is served as a compact JWT; plain parameters as JSON
            return if body.trim_start().starts_with('{') {
                serde_json::from_str(&body)
                    .map_err(|e| Error::Parse(format!("issue parsing request object: {e}")))
            } else {
                self.validate_jar(body.trim())
            };
        }

        serde_json::from_value(Value::Object(raw))
            .map_err(|e| Error::Parse(format!("issue parsing request parameters: {e}")))
    }

    /// Verify a signed JAR according to its client-identifier scheme.
    ///
    /// `x509_san_dns`: the JWS must verify under the `x5c` leaf key and
    /// the leaf's SAN dNSName must equal the client identifier.
    /// `verifier_attestation`: the header carries the attestation JWT; the
    /// JWS must verify under the attestation's `cnf.jwk` and the client
    /// identifier must equal the attestation `sub`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] / [`Error::InvalidStructure`]
    /// when a scheme check fails.
    pub fn validate_jar(&self, jar: &str) -> Result<RequestObject> {
        let jws: Jws = jar.parse()?;
        let claims: JarClaims = jws.claims()?;
        let request = claims.request;

        let (scheme, bare_id) =
            split_client_id(&request.client_id, request.client_id_scheme.as_deref());

        match scheme {
            "x509_san_dns" => {
                let Some(leaf) = jws.header.x5c_leaf()? else {
                    return Err(Error::InvalidStructure(
                        "x509_san_dns request without x5c".to_string(),
                    ));
                };
                let leaf_key = crate::x509::public_key_jwk(&leaf)?;
                jws.verify_with(&leaf_key)?;
                crate::x509::check_san_dns(&leaf, bare_id)?;
            }
            "verifier_attestation" => {
                let Some(attestation) = &jws.header.jwt else {
                    return Err(Error::InvalidStructure(
                        "verifier_attestation request without attestation".to_string(),
                    ));
                };
                let attestation_jwt =
                    jws::decode_unverified::<AttestationClaims>(attestation)?;
                if attestation_jwt.claims.sub != bare_id {
                    return Err(Error::InvalidStructure(
                        "client_id does not match attestation sub".to_string(),
                    ));
                }
                jws.verify_with(attestation_jwt.claims.cnf.jwk())?;
            }
            _ => {
                // pre-registered / redirect_uri: verify when the key is in
                // the header, otherwise trust is out of band
                if let Some(jwk) = jws.header.jwk() {
                    jws.verify_with(jwk)?;
                } else {
                    tracing::warn!("signed request verified out of band for scheme {scheme}");
                }
            }
        }

        Ok(request)
    }

    /// Build the authorization response for a request, presenting the
    /// selected credentials, and route it per the response mode.
    ///
    /// # Errors
    ///
    /// Returns an error when a selection cannot be satisfied or building
    /// fails.
    pub async fn create_presentation(
        &self, request: &RequestObject, selections: &[PresentationSelection],
    ) -> Result<WalletResponse> {
        tracing::debug!("create presentation");

        if selections.is_empty() {
            return Err(Error::Usage("no credentials selected".to_string()));
        }
        let (_, bare_client_id) =
            split_client_id(&request.client_id, request.client_id_scheme.as_deref());

        // encrypted responses carry a wallet-generated nonce in `apu` and
        // bind mdoc device signatures through the session transcript
        let encrypt_to = self.encryption_parameters(request);
        let mdoc_nonce =
            if encrypt_to.is_some() { Some(generate::uri_token()) } else { None };

        let mut presentations = vec![];
        let mut descriptors = vec![];
        for (index, selection) in selections.iter().enumerate() {
            let Some(credential) = self.credential(&selection.credential_id) else {
                return Err(Error::Usage(format!(
                    "no stored credential: {}",
                    selection.credential_id
                )));
            };

            let path = if selections.len() == 1 { "$".to_string() } else { format!("$[{index}]") };
            let presented = self
                .present_one(&credential, selection, request, bare_client_id, mdoc_nonce.as_deref())
                .await?;

            descriptors.push(DescriptorMap {
                id: selection.descriptor_id.clone(),
                format: credential.format(),
                path,
                path_nested: None,
            });
            presentations.push(presented);
        }

        let vp_token = if presentations.len() == 1 {
            Value::String(presentations.remove(0))
        } else {
            Value::Array(presentations.into_iter().map(Value::String).collect())
        };

        let definition_id = request
            .presentation_definition()
            .map_or_else(|_| String::new(), |d| d.id.clone());
        let mut response = AuthorizationResponse {
            vp_token: Some(vp_token),
            presentation_submission: Some(PresentationSubmission {
                id: generate::uri_token(),
                definition_id,
                descriptor_map: descriptors,
            }),
            id_token: None,
            state: request.state.clone(),
        };

        if request.response_type.wants_id_token() {
            response.id_token = Some(self.build_id_token(request).await?);
        }

        self.route(request, response, encrypt_to, mdoc_nonce).await
    }

    async fn present_one(
        &self, credential: &StoredCredential, selection: &PresentationSelection,
        request: &RequestObject, bare_client_id: &str, mdoc_nonce: Option<&str>,
    ) -> Result<String> {
        match credential {
            StoredCredential::JwtVc { raw, .. } => {
                W3cVpBuilder::new()
                    .add_credential(raw)
                    .verifier(bare_client_id)
                    .nonce(&request.nonce)
                    .signer(&self.key)
                    .build()
                    .await
            }
            StoredCredential::SdJwt { raw } => {
                let mut builder = SdJwtPresentationBuilder::new()
                    .credential(raw)?
                    .verifier(bare_client_id)
                    .nonce(&request.nonce);
                for claim in &selection.disclose {
                    builder = builder.disclose(claim);
                }
                builder.signer(&self.key).build().await
            }
            StoredCredential::Mdoc { doc_type, issuer_signed } => {
                let binding = match mdoc_nonce {
                    Some(mdoc_nonce) => {
                        let Some(response_uri) = request.response_mode.response_uri() else {
                            return Err(Error::InvalidStructure(
                                "encrypted mdoc response requires a response_uri".to_string(),
                            ));
                        };
                        DeviceBinding::Transcript(SessionTranscript::for_openid4vp(
                            bare_client_id,
                            response_uri,
                            &request.nonce,
                            mdoc_nonce,
                        )?)
                    }
                    None => DeviceBinding::Challenge(request.nonce.clone()),
                };

                let mut builder = DeviceResponseBuilder::new()
                    .issuer_signed(issuer_signed.as_ref().clone())
                    .doc_type(doc_type)
                    .binding(binding);
                if !selection.requested_elements.is_empty() {
                    builder = builder.requested(selection.requested_elements.clone());
                }

                builder.signer(&self.key).build().await?.to_base64url()
            }
        }
    }

    /// The verifier's encryption key and algorithm, when the request asks
    /// for an encrypted response.
    fn encryption_parameters(
        &self, request: &RequestObject,
    ) -> Option<(crate::jose::jwk::PublicKeyJwk, ContentEncryption)> {
        if !matches!(request.response_mode, ResponseMode::DirectPostJwt { .. }) {
            return None;
        }
        let metadata = request.client_metadata.as_ref()?;
        let key = metadata.jwks.as_ref()?.encryption_key()?.clone();
        let enc = match metadata.authorization_encrypted_response_enc.as_deref() {
            Some("A128GCM") => ContentEncryption::A128GCM,
            Some("A192GCM") => ContentEncryption::A192GCM,
            Some("A128CBC-HS256") => ContentEncryption::A128CbcHs256,
            Some("A192CBC-HS384") => ContentEncryption::A192CbcHs384,
            Some("A256CBC-HS512") => ContentEncryption::A256CbcHs512,
            _ => ContentEncryption::A256GCM,
        };
        Some((key, enc))
    }

    async fn build_id_token(&self, request: &RequestObject) -> Result<String> {
        let now = chrono::Utc::now();
        let jwk = Signer::public_jwk(&self.key);
        let sub = jwk.identifier()?;
        let claims = IdTokenClaims {
            iss: sub.clone(),
            sub,
            aud: request.client_id.clone(),
            nonce: request.nonce.clone(),
            iat: now,
            exp: now + chrono::Duration::minutes(5),
            sub_jwk: jwk,
        };
        jws::encode_jwk(JwsType::Jwt, &claims, &self.key).await
    }

    async fn route(
        &self, request: &RequestObject, response: AuthorizationResponse,
        encrypt_to: Option<(crate::jose::jwk::PublicKeyJwk, ContentEncryption)>,
        mdoc_nonce: Option<String>,
    ) -> Result<WalletResponse> {
        match &request.response_mode {
            ResponseMode::Fragment { redirect_uri } => {
                let qs = urlencode::to_string(&response)?;
                Ok(WalletResponse::Redirect { url: format!("{redirect_uri}#{qs}") })
            }
            ResponseMode::Query { redirect_uri } => {
                let qs = urlencode::to_string(&response)?;
                Ok(WalletResponse::Redirect { url: format!("{redirect_uri}?{qs}") })
            }
            ResponseMode::DirectPost { response_uri } => {
                let body = urlencode::to_string(&response)?;
                Ok(WalletResponse::Post { uri: response_uri.clone(), body })
            }
            ResponseMode::DirectPostJwt { response_uri } => {
                let payload = serde_json::to_vec(&response)
                    .map_err(|e| Error::Parse(format!("issue serializing response: {e}")))?;

                let jwt = if let Some((key, enc)) = encrypt_to {
                    jwe::encrypt(
                        &payload,
                        &key,
                        enc,
                        mdoc_nonce.as_deref().map(str::as_bytes),
                        Some(request.nonce.as_bytes()),
                    )?
                } else {
                    // no encryption key advertised: sign the response instead
                    jws::encode_jwk(JwsType::Jwt, &response, &self.key).await?
                };

                Ok(WalletResponse::Post {
                    uri: response_uri.clone(),
                    body: format!("response={}", urlencoding::encode(&jwt)),
                })
            }
        }
    }
}

/// Claims of a Verifier Attestation JWT.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct AttestationClaims {
    /// The attester.
    pub iss: String,

    /// The attested client identifier.
    pub sub: String,

    /// The key the attested verifier signs requests with.
    pub cnf: crate::format::sd_jwt::KeyBinding,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dif_exch::PresentationDefinition;
    use crate::key::Curve;

    #[tokio::test]
    async fn matches_stored_credentials() {
        let holder = Holder::new(KeyMaterial::generate(Curve::P256));
        let issuer_key = KeyMaterial::generate(Curve::P256);

        let vc = crate::format::w3c_vc::W3cVcBuilder::new()
            .issuer("https://issuer.example")
            .add_type("EmployeeIDCredential")
            .holder("holder-key")
            .claims(json!({"employeeId": "1234"}).as_object().unwrap().clone())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");
        let id = holder.store_jwt_vc(&vc).expect("should store");

        let definition: PresentationDefinition = serde_json::from_value(json!({
            "id": "d1",
            "input_descriptors": [{
                "id": "employment",
                "constraints": {
                    "fields": [{
                        "path": ["$.vc.type"],
                        "filter": {"type": "string", "const": "EmployeeIDCredential"}
                    }]
                }
            }]
        }))
        .expect("should parse");

        let credential = holder.credential(&id).expect("stored");
        let constraints = &definition.input_descriptors[0].constraints;
        assert!(constraints.accepts(&credential).expect("should evaluate"));
    }
}
