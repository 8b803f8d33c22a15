//! End-to-end: signed request by reference under the `x509_san_dns`
//! scheme — the wallet resolves the `request_uri`, verifies the JAR
//! against the certificate's leaf key, and enforces the SAN dNSName.

mod utils;

use attesta::key::{Curve, KeyMaterial};
use attesta::oid4vp::{
    ClientIdScheme, CreateRequestOptions, CreatedRequest, RequestMode, ResponseMode,
};
use attesta::store::InMemoryStateStore;
use attesta::{Error, Holder, Openid4VpVerifier};
use serde_json::json;

/// P-256 key and self-signed certificate with SAN dNSName
/// `verifier.example`, fixed so the SAN checks are deterministic.
const RP_SECRET_HEX: &str = "6a0ca77406dfda0f21db68cc1671451a25bad558d507c08b28919274189530b1";
const RP_CERT_HEX: &str = "308201a73082014ea003020102021460959668f89570ecf1cf3b37e0682ac0f0ba02c7300a06082a8648ce3d040302301b3119301706035504030c1076657269666965722e6578616d706c65301e170d3236303830313131343634335a170d3436303732373131343634335a301b3119301706035504030c1076657269666965722e6578616d706c653059301306072a8648ce3d020106082a8648ce3d030107034200045b26fce441fd225f7c4933552f1fbfca75d825c03f6896174e7a814ab893a77d51291cc32ac6c004bb6a62dff58eeab1a09d2649c2c319447264c40d0dc1c79ca370306e301d0603551d0e0416041457c8aa8b811060fd0dcf18819ecdc1402105aadb301f0603551d2304183016801457c8aa8b811060fd0dcf18819ecdc1402105aadb300f0603551d130101ff040530030101ff301b0603551d1104143012821076657269666965722e6578616d706c65300a06082a8648ce3d0403020347003044022024dd48ec2ab747216f6a68ae5fc448aa73bd617220e5a0bba24d4839ad0eebef02201ff5797f7e120f5bf6bd43104cf6e8587558894a27506feea01fda6360c64bca";

fn rp_key() -> KeyMaterial {
    let secret = hex::decode(RP_SECRET_HEX).expect("valid hex");
    KeyMaterial::from_secret_bytes(Curve::P256, &secret).expect("valid key")
}

fn rp_cert() -> Vec<u8> {
    hex::decode(RP_CERT_HEX).expect("valid hex")
}

fn definition() -> attesta::dif_exch::PresentationDefinition {
    serde_json::from_value(json!({
        "id": "identity-check",
        "input_descriptors": [{"id": "identity", "constraints": {}}]
    }))
    .expect("should parse")
}

async fn create_signed_request(client_id: &str) -> (CreatedRequest, InMemoryStateStore) {
    let key = rp_key();
    let store = InMemoryStateStore::new();
    let verifier = Openid4VpVerifier::new(
        ClientIdScheme::CertificateSanDns { client_id: client_id.to_string(), chain: vec![rp_cert()] },
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
        .expect("should create request");

    (created, store)
}

#[tokio::test]
async fn signed_request_by_reference() {
    utils::init_tracer();

    let (created, _store) = create_signed_request("verifier.example").await;
    assert!(created.request_url.contains("request_uri="));
    let jar = created.jar.expect("jar present");

    // the wallet resolves the request_uri and verifies the JAR
    let fetcher = utils::MapFetcher::new();
    fetcher.serve("https://verifier.example/request/1", jar.into_bytes());

    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let request =
        holder.parse_request(&created.request_url, &fetcher).await.expect("should verify");

    assert_eq!(request.client_id, "x509_san_dns:verifier.example");
    assert_eq!(request.nonce, created.request_object.nonce);
}

#[tokio::test]
async fn plain_request_by_reference() {
    utils::init_tracer();

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
            mode: RequestMode::ByReference {
                request_uri: "https://verifier.example/request/2".to_string(),
            },
            ..CreateRequestOptions::default()
        })
        .await
        .expect("should create request");
    assert!(created.jar.is_none());

    // the request_uri serves the plain parameters as JSON
    let served = verifier.request_object(&created.state).await.expect("should serve");
    let fetcher = utils::MapFetcher::new();
    fetcher.serve(
        "https://verifier.example/request/2",
        serde_json::to_vec(&served).expect("should serialize"),
    );

    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let request = holder.parse_request(&created.request_url, &fetcher).await.expect("should parse");
    assert_eq!(request, created.request_object);
}

#[tokio::test]
async fn san_mismatch_rejected() {
    utils::init_tracer();

    // the certificate names verifier.example; the request claims otherwise
    let (created, _store) = create_signed_request("other.example").await;
    let jar = created.jar.expect("jar present");

    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let result = holder.validate_jar(&jar);

    assert!(matches!(result, Err(Error::InvalidStructure(_))));
}

#[tokio::test]
async fn tampered_jar_rejected() {
    utils::init_tracer();

    let (created, _store) = create_signed_request("verifier.example").await;
    let jar = created.jar.expect("jar present");

    // swap the payload for different parameters; signature no longer holds
    let mut parts: Vec<&str> = jar.split('.').collect();
    let other = create_signed_request("verifier.example").await.0.jar.expect("jar present");
    let other_parts: Vec<&str> = other.split('.').collect();
    parts[1] = other_parts[1];
    let tampered = parts.join(".");

    let holder = Holder::new(KeyMaterial::generate(Curve::P256));
    let result = holder.validate_jar(&tampered);
    assert!(matches!(result, Err(Error::InvalidSignature(_))));
}
