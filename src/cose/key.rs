//! COSE_Key ↔ JWK conversion for the curves the engine signs with.

use base64ct::{Base64UrlUnpadded, Encoding};
use ciborium::Value;
use coset::{CoseKey, KeyType, Label, iana};

use crate::jose::jwk::PublicKeyJwk;
use crate::{Error, Result};

const OKP_CRV: i64 = -1;
const OKP_X: i64 = -2;
const EC2_CRV: i64 = -1;
const EC2_X: i64 = -2;
const EC2_Y: i64 = -3;

/// Project a JWK into a COSE_Key.
///
/// # Errors
///
/// Returns [`Error::UnsupportedAlgorithm`] for key types outside the
/// supported set, [`Error::Parse`] for undecodable coordinates.
pub fn to_cose_key(jwk: &PublicKeyJwk) -> Result<CoseKey> {
    let (x, y) =
        jwk.coordinates().map_err(|e| Error::Parse(format!("issue decoding coordinates: {e}")))?;

    match (jwk.kty.as_str(), jwk.crv.as_str()) {
        ("EC", crv) => {
            let curve = match crv {
                "P-256" => iana::EllipticCurve::P_256,
                "P-384" => iana::EllipticCurve::P_384,
                "P-521" => iana::EllipticCurve::P_521,
                _ => {
                    return Err(Error::UnsupportedAlgorithm(format!("unsupported curve: {crv}")));
                }
            };
            Ok(coset::CoseKeyBuilder::new_ec2_pub_key(curve, x, y).build())
        }
        ("OKP", "Ed25519") => Ok(CoseKey {
            kty: KeyType::Assigned(iana::KeyType::OKP),
            params: vec![
                (Label::Int(OKP_CRV), Value::from(iana::EllipticCurve::Ed25519 as i64)),
                (Label::Int(OKP_X), Value::Bytes(x)),
            ],
            ..CoseKey::default()
        }),
        (kty, crv) => {
            Err(Error::UnsupportedAlgorithm(format!("unsupported key type: {kty}/{crv}")))
        }
    }
}

/// Recover a JWK from a COSE_Key.
///
/// # Errors
///
/// Returns [`Error::InvalidStructure`] when required parameters are absent
/// and [`Error::UnsupportedAlgorithm`] for unsupported key types.
pub fn from_cose_key(key: &CoseKey) -> Result<PublicKeyJwk> {
    let param = |label: i64| {
        key.params.iter().find_map(|(l, v)| (l == &Label::Int(label)).then_some(v))
    };
    let bytes_param = |label: i64, name: &str| -> Result<Vec<u8>> {
        let Some(Value::Bytes(bytes)) = param(label) else {
            return Err(Error::InvalidStructure(format!("missing COSE_Key {name}")));
        };
        Ok(bytes.clone())
    };

    match &key.kty {
        KeyType::Assigned(iana::KeyType::EC2) => {
            let crv = match param(EC2_CRV) {
                Some(Value::Integer(i)) if i128::from(*i) == iana::EllipticCurve::P_256 as i128 => {
                    "P-256"
                }
                Some(Value::Integer(i)) if i128::from(*i) == iana::EllipticCurve::P_384 as i128 => {
                    "P-384"
                }
                Some(Value::Integer(i)) if i128::from(*i) == iana::EllipticCurve::P_521 as i128 => {
                    "P-521"
                }
                _ => return Err(Error::UnsupportedAlgorithm("unsupported EC2 curve".to_string())),
            };
            Ok(PublicKeyJwk {
                kty: "EC".to_string(),
                crv: crv.to_string(),
                x: Base64UrlUnpadded::encode_string(&bytes_param(EC2_X, "x")?),
                y: Some(Base64UrlUnpadded::encode_string(&bytes_param(EC2_Y, "y")?)),
                ..PublicKeyJwk::default()
            })
        }
        KeyType::Assigned(iana::KeyType::OKP) => Ok(PublicKeyJwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: Base64UrlUnpadded::encode_string(&bytes_param(OKP_X, "x")?),
            ..PublicKeyJwk::default()
        }),
        _ => Err(Error::UnsupportedAlgorithm("unsupported COSE key type".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[test]
    fn jwk_cose_round_trip() {
        for curve in [Curve::P256, Curve::P384, Curve::Ed25519] {
            let jwk = KeyMaterial::generate(curve).public_jwk();
            let cose = to_cose_key(&jwk).expect("should convert");
            let back = from_cose_key(&cose).expect("should convert back");
            assert_eq!(back.x, jwk.x);
            assert_eq!(back.y, jwk.y);
            assert_eq!(back.crv, jwk.crv);
        }
    }
}
