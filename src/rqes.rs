//! # Remote Qualified Electronic Signatures
//!
//! DTOs for remote-signature requests in the style of the
//! [CSC API](https://cloudsignatureconsortium.org/resources/download-api-specifications/):
//! the parameter set a relying party sends when asking a wallet-held key to
//! sign document digests. Carried over the same OpenID4VP transport as
//! presentation requests.

use serde::{Deserialize, Serialize};

/// How the signature request conveys what is to be signed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SignatureRequestParameters {
    /// Sign pre-computed document digests.
    SignDoc(SignDocParameters),

    /// Sign a single raw hash.
    SignHash(SignHashParameters),
}

/// Parameters for signing one or more documents by digest.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignDocParameters {
    /// The qualified-signature level requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_qualifier: Option<SignatureQualifier>,

    /// The digests to sign.
    pub document_digests: Vec<DocumentDigest>,

    /// Identifier of the credential (key) to sign with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

/// Parameters for signing a raw hash.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignHashParameters {
    /// Base64-encoded hashes to sign.
    pub hashes: Vec<String>,

    /// OID of the algorithm that produced the hashes.
    #[serde(rename = "hashAlgorithmOID")]
    pub hash_algorithm_oid: String,

    /// Signing algorithm OID.
    #[serde(rename = "signAlgo")]
    pub sign_algo: String,

    /// Identifier of the credential (key) to sign with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

/// One document digest entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDigest {
    /// Human-readable label shown to the signer.
    pub label: String,

    /// The base64-encoded digest value.
    pub hash: String,

    /// OID of the digest algorithm.
    #[serde(rename = "hashAlgorithmOID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm_oid: Option<String>,

    /// Where the document itself can be retrieved.
    #[serde(rename = "documentLocation_uri")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_location_uri: Option<String>,

    /// Access method for the document location.
    #[serde(rename = "documentLocation_method")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_location_method: Option<serde_json::Value>,

    /// Requested conformance level for the produced signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conformance_level: Option<ConformanceLevel>,

    /// Container format for the produced signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_envelope_property: Option<SignedEnvelopeProperty>,
}

/// The qualified-signature level of a request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum SignatureQualifier {
    /// EU qualified electronic signature.
    #[default]
    #[serde(rename = "eu_eidas_qes")]
    EuEidasQes,

    /// EU advanced electronic signature.
    #[serde(rename = "eu_eidas_aes")]
    EuEidasAes,

    /// EU qualified electronic seal.
    #[serde(rename = "eu_eidas_qeseal")]
    EuEidasQeseal,
}

/// AdES conformance levels.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConformanceLevel {
    /// Baseline B level.
    #[default]
    #[serde(rename = "Ades-B-B")]
    AdesBB,

    /// Baseline T level (with timestamp).
    #[serde(rename = "Ades-B-T")]
    AdesBT,

    /// Baseline LT level (long-term validation material).
    #[serde(rename = "Ades-B-LT")]
    AdesBLt,

    /// Baseline LTA level (long-term with archive timestamps).
    #[serde(rename = "Ades-B-LTA")]
    AdesBLta,
}

/// Signature envelope containers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum SignedEnvelopeProperty {
    /// PDF-embedded signature.
    #[serde(rename = "Attached")]
    Attached,

    /// Signature detached from the document.
    #[serde(rename = "Detached")]
    Detached,

    /// Signature parallel to the content within the container.
    #[serde(rename = "Enveloping")]
    Enveloping,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sign_doc_round_trip() {
        let request = json!({
            "signatureQualifier": "eu_eidas_qes",
            "documentDigests": [{
                "label": "Contract.pdf",
                "hash": "sTOgwOm+474gFj0q0x1iSNspKqbcse4IeiqlDg/HWuI=",
                "hashAlgorithmOID": "2.16.840.1.101.3.4.2.1",
                "conformanceLevel": "Ades-B-B",
                "signedEnvelopeProperty": "Attached"
            }]
        });

        let parsed: SignatureRequestParameters =
            serde_json::from_value(request.clone()).expect("should deserialize");
        let SignatureRequestParameters::SignDoc(doc) = &parsed else {
            panic!("expected SignDoc");
        };
        assert_eq!(doc.document_digests.len(), 1);
        assert_eq!(doc.document_digests[0].label, "Contract.pdf");

        assert_eq!(serde_json::to_value(&parsed).expect("should serialize"), request);
    }

    #[test]
    fn sign_hash_round_trip() {
        let request = json!({
            "hashes": ["sTOgwOm+474gFj0q0x1iSNspKqbcse4IeiqlDg/HWuI="],
            "hashAlgorithmOID": "2.16.840.1.101.3.4.2.1",
            "signAlgo": "1.2.840.10045.4.3.2"
        });

        let parsed: SignatureRequestParameters =
            serde_json::from_value(request).expect("should deserialize");
        assert!(matches!(parsed, SignatureRequestParameters::SignHash(_)));
    }
}
