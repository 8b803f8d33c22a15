//! Query-string serialization for authorization request and response
//! parameters.
//!
//! OpenID4VP passes request objects on URLs and response parameters in
//! `application/x-www-form-urlencoded` bodies. Scalar fields become plain
//! `key=value` pairs; object and array fields are carried as percent-encoded
//! JSON, which is how wallets expect `presentation_definition` and
//! `client_metadata` to arrive.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Serialize to a query string.
///
/// # Errors
///
/// Returns an error if the value does not serialize to a JSON object.
pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    let json =
        serde_json::to_value(value).map_err(|e| Error::Parse(format!("issue serializing: {e}")))?;
    let Value::Object(map) = json else {
        return Err(Error::Usage("can only urlencode an object".to_string()));
    };

    let mut pairs = vec![];
    for (key, value) in &map {
        let encoded = match value {
            Value::Null => continue,
            Value::String(s) => urlencoding::encode(s).to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Object(_) | Value::Array(_) => {
                let json = serde_json::to_string(value)
                    .map_err(|e| Error::Parse(format!("issue serializing {key}: {e}")))?;
                urlencoding::encode(&json).to_string()
            }
        };
        pairs.push(format!("{key}={encoded}"));
    }

    Ok(pairs.join("&"))
}

/// Deserialize from a query string or form body.
///
/// # Errors
///
/// Returns an error if a pair cannot be percent-decoded or the reassembled
/// object does not match the target type.
pub fn from_str<T: DeserializeOwned>(qs: &str) -> Result<T> {
    let mut map = Map::new();

    for pair in qs.split('&').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Parse(format!("missing '=' in pair: {pair}")));
        };
        let decoded = urlencoding::decode(value)
            .map_err(|e| Error::Parse(format!("issue decoding {key}: {e}")))?;

        // object and array parameters travel as JSON
        let value = if decoded.starts_with('{') || decoded.starts_with('[') {
            serde_json::from_str(&decoded)
                .map_err(|e| Error::Parse(format!("issue parsing {key}: {e}")))?
        } else {
            Value::String(decoded.into_owned())
        };
        map.insert(key.to_string(), value);
    }

    serde_json::from_value(Value::Object(map))
        .map_err(|e| Error::Parse(format!("issue deserializing query string: {e}")))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Params {
        client_id: String,
        nonce: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    }

    #[test]
    fn round_trip() {
        let params = Params {
            client_id: "https://verifier.example/rp1".to_string(),
            nonce: "n 1".to_string(),
            metadata: Some(serde_json::json!({"vp_formats": ["jwt_vp"]})),
        };

        let qs = to_string(&params).expect("should serialize");
        assert!(qs.contains("client_id=https%3A%2F%2Fverifier.example%2Frp1"));

        let parsed: Params = from_str(&qs).expect("should deserialize");
        assert_eq!(parsed, params);
    }
}
