//! X.509 certificate helpers for `x5c` header processing: extracting the
//! leaf public key and checking SAN dNSName entries against a client
//! identifier.

use base64ct::{Base64UrlUnpadded, Encoding};
use x509_cert::Certificate;
use x509_cert::der::Decode;
use x509_cert::der::oid::AssociatedOid;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;

use crate::jose::jwk::PublicKeyJwk;
use crate::{Error, Result};

/// Extract the subject public key of a DER-encoded certificate as a JWK.
///
/// Only EC keys on the curves the engine verifies with are supported; the
/// curve is inferred from the SEC1 point length.
///
/// # Errors
///
/// Returns [`Error::Parse`] for undecodable certificates and
/// [`Error::UnsupportedAlgorithm`] for key types outside the envelope.
pub fn public_key_jwk(der: &[u8]) -> Result<PublicKeyJwk> {
    let cert = Certificate::from_der(der)
        .map_err(|e| Error::Parse(format!("issue decoding certificate: {e}")))?;

    let spki = &cert.tbs_certificate.subject_public_key_info;
    let Some(point) = spki.subject_public_key.as_bytes() else {
        return Err(Error::Parse("certificate public key is not byte-aligned".to_string()));
    };

    // uncompressed SEC1: 0x04 || x || y
    if point.first() != Some(&0x04) {
        return Err(Error::UnsupportedAlgorithm(
            "only uncompressed EC certificate keys are supported".to_string(),
        ));
    }
    let coord_len = (point.len() - 1) / 2;
    let crv = match coord_len {
        32 => "P-256",
        48 => "P-384",
        66 => "P-521",
        n => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "unsupported EC coordinate length: {n}"
            )));
        }
    };

    Ok(PublicKeyJwk {
        kty: "EC".to_string(),
        crv: crv.to_string(),
        x: Base64UrlUnpadded::encode_string(&point[1..=coord_len]),
        y: Some(Base64UrlUnpadded::encode_string(&point[1 + coord_len..])),
        ..PublicKeyJwk::default()
    })
}

/// The SAN dNSName entries of a DER-encoded certificate.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the certificate or its SAN extension cannot
/// be decoded.
pub fn san_dns_names(der: &[u8]) -> Result<Vec<String>> {
    let cert = Certificate::from_der(der)
        .map_err(|e| Error::Parse(format!("issue decoding certificate: {e}")))?;

    let mut names = vec![];
    if let Some(extensions) = &cert.tbs_certificate.extensions {
        for ext in extensions {
            if ext.extn_id != SubjectAltName::OID {
                continue;
            }
            let san = SubjectAltName::from_der(ext.extn_value.as_bytes())
                .map_err(|e| Error::Parse(format!("issue decoding SAN: {e}")))?;
            for name in san.0 {
                if let GeneralName::DnsName(dns) = name {
                    names.push(dns.to_string());
                }
            }
        }
    }
    Ok(names)
}

/// Check a client identifier appears among the certificate's SAN dNSName
/// entries. The identifier may be a bare DNS name or a URI whose host must
/// match.
///
/// # Errors
///
/// Returns [`Error::InvalidStructure`] on mismatch.
pub fn check_san_dns(der: &[u8], client_id: &str) -> Result<()> {
    let names = san_dns_names(der)?;

    // strip scheme and path when the client_id is a URI
    let host = client_id
        .split_once("://")
        .map_or(client_id, |(_, rest)| rest)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    if names.iter().any(|n| n == client_id || n == host) {
        return Ok(());
    }
    Err(Error::InvalidStructure(format!(
        "client_id {client_id} not among certificate SAN dNSNames"
    )))
}
