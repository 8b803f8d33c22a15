//! End-to-end: ISO mdoc presented over `direct_post.jwt` with an encrypted
//! response, the wallet nonce riding in the JWE `apu`, and the device
//! signature bound through the OID4VP session transcript.

mod utils;

use attesta::holder::{Holder, PresentationSelection, WalletResponse};
use attesta::key::{Curve, KeyMaterial};
use attesta::oid4vp::{
    AuthResponseOutcome, ClientIdScheme, CreateRequestOptions, NoFetch, PresentationOutcome,
    ResponseMode, ResponsePayload,
};
use attesta::store::InMemoryStateStore;
use attesta::{Issuer, Openid4VpVerifier};
use serde_json::json;

fn definition() -> attesta::dif_exch::PresentationDefinition {
    serde_json::from_value(json!({
        "id": "mdl-check",
        "input_descriptors": [{
            "id": "org.iso.18013.5.1.mDL",
            "format": {"mso_mdoc": {"alg": ["ES256"]}},
            "constraints": {}
        }]
    }))
    .expect("should parse")
}

#[tokio::test]
async fn mdoc_via_encrypted_direct_post() {
    utils::init_tracer();

    // issue an mdoc committed to the holder's device key
    let issuer_key = KeyMaterial::generate(Curve::P256);
    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let issuer = Issuer::new("https://issuer.example", &issuer_key);

    let issuer_signed = issuer
        .issue_mdoc(
            "org.iso.18013.5.1.mDL",
            "org.iso.18013.5.1",
            json!({"given_name": "Erika", "family_name": "Mustermann", "age_over_18": true})
                .as_object()
                .unwrap()
                .clone(),
            attesta::provider::Signer::public_jwk(holder.key()),
        )
        .await
        .expect("should issue");
    let credential_id = holder.store_mdoc(issuer_signed).expect("should store");

    // encrypted cross-device flow
    let verifier_key = KeyMaterial::generate(Curve::P256);
    let encryption_key = KeyMaterial::generate(Curve::P256);
    let store = InMemoryStateStore::new();
    let verifier = Openid4VpVerifier::new(
        ClientIdScheme::PreRegistered { client_id: "https://verifier.example/rp2".to_string() },
        &verifier_key,
        &store,
    )
    .with_encryption_key(&encryption_key)
    .trust(issuer_key.public_jwk());

    let created = verifier
        .create_request(CreateRequestOptions {
            response_mode: ResponseMode::DirectPostJwt {
                response_uri: "https://verifier.example/cb".to_string(),
            },
            presentation_definition: definition(),
            ..CreateRequestOptions::default()
        })
        .await
        .expect("should create request");

    let request = holder.parse_request(&created.request_url, &NoFetch).await.expect("should parse");

    let WalletResponse::Post { uri, body } = holder
        .create_presentation(
            &request,
            &[PresentationSelection {
                descriptor_id: "org.iso.18013.5.1.mDL".to_string(),
                credential_id,
                requested_elements: [(
                    "org.iso.18013.5.1".to_string(),
                    vec!["age_over_18".to_string()],
                )]
                .into(),
                ..PresentationSelection::default()
            }],
        )
        .await
        .expect("should present")
    else {
        panic!("direct_post.jwt POSTs");
    };
    assert_eq!(uri, "https://verifier.example/cb");

    // the body carries a single encrypted response JWT
    assert!(body.starts_with("response="));

    let outcome = verifier.validate_response(ResponsePayload::Form(&body)).await;
    let AuthResponseOutcome::Success { presentations, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    let PresentationOutcome::Mdoc { documents, .. } = &presentations[0] else {
        panic!("expected an mdoc outcome");
    };

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].doc_type, "org.iso.18013.5.1.mDL");

    // only the requested element was disclosed
    let elements = &documents[0].namespaces["org.iso.18013.5.1"];
    assert_eq!(elements["age_over_18"], json!(true));
    assert!(!elements.contains_key("given_name"));
}

#[tokio::test]
async fn stale_request_cannot_be_answered_twice() {
    utils::init_tracer();

    let issuer_key = KeyMaterial::generate(Curve::P256);
    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let issuer = Issuer::new("https://issuer.example", &issuer_key);

    let issuer_signed = issuer
        .issue_mdoc(
            "org.iso.18013.5.1.mDL",
            "org.iso.18013.5.1",
            json!({"age_over_18": true}).as_object().unwrap().clone(),
            attesta::provider::Signer::public_jwk(holder.key()),
        )
        .await
        .expect("should issue");
    let credential_id = holder.store_mdoc(issuer_signed).expect("should store");

    let verifier_key = KeyMaterial::generate(Curve::P256);
    let encryption_key = KeyMaterial::generate(Curve::P256);
    let store = InMemoryStateStore::new();
    let verifier = Openid4VpVerifier::new(
        ClientIdScheme::PreRegistered { client_id: "https://verifier.example/rp2".to_string() },
        &verifier_key,
        &store,
    )
    .with_encryption_key(&encryption_key)
    .trust(issuer_key.public_jwk());

    let created = verifier
        .create_request(CreateRequestOptions {
            response_mode: ResponseMode::DirectPostJwt {
                response_uri: "https://verifier.example/cb".to_string(),
            },
            presentation_definition: definition(),
            ..CreateRequestOptions::default()
        })
        .await
        .expect("should create request");

    let request = holder.parse_request(&created.request_url, &NoFetch).await.expect("should parse");
    let selection = PresentationSelection {
        descriptor_id: "org.iso.18013.5.1.mDL".to_string(),
        credential_id,
        ..PresentationSelection::default()
    };

    let WalletResponse::Post { body, .. } =
        holder.create_presentation(&request, std::slice::from_ref(&selection)).await.expect("first")
    else {
        panic!("direct_post.jwt POSTs");
    };
    assert!(matches!(
        verifier.validate_response(ResponsePayload::Form(&body)).await,
        AuthResponseOutcome::Success { .. }
    ));

    // a second answer to the same request finds no state
    let WalletResponse::Post { body, .. } =
        holder.create_presentation(&request, &[selection]).await.expect("second")
    else {
        panic!("direct_post.jwt POSTs");
    };
    assert!(matches!(
        verifier.validate_response(ResponsePayload::Form(&body)).await,
        AuthResponseOutcome::ValidationError { .. }
    ));
}
