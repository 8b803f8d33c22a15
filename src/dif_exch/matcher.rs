//! Constraint evaluation for input descriptors.
//!
//! A wallet decides whether a stored credential can answer an input
//! descriptor by running each constraint [`Field`] over the credential's
//! claims: the field's JSONPath candidates select a node, and the field's
//! [`Filter`] (when present) is applied to whatever was selected. The
//! verifier relies on the same evaluation when pre-screening submissions.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;

use super::{Claims, Constraints, Field, Filter, FilterValue};
use crate::{Error, Result};

impl Constraints {
    /// Whether a credential's claims can answer this constraint set.
    ///
    /// Acceptance requires every non-optional field to select a node that
    /// passes its filter. Optional fields never disqualify a credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for malformed JSONPath or filter
    /// expressions in the definition itself.
    pub fn accepts(&self, claims: &impl Claims) -> Result<bool> {
        let document = claims.to_json()?;

        for field in self.fields.as_deref().unwrap_or_default() {
            if field.optional.unwrap_or(false) {
                continue;
            }
            if !field.selects(&document)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Field {
    /// Run the field's path candidates over the document. The first path
    /// that selects anything decides: its node either passes the filter or
    /// the field fails. Later candidates are only consulted when earlier
    /// ones select nothing at all.
    fn selects(&self, document: &Value) -> Result<bool> {
        for path in &self.path {
            let jsonpath = JsonPath::parse(path)
                .map_err(|e| Error::Usage(format!("invalid JSONPath {path}: {e}")))?;

            let nodes = jsonpath.query(document).all();
            let Some(node) = nodes.first() else {
                continue;
            };
            return match &self.filter {
                Some(filter) => filter.matches(node),
                // an unfiltered field only asks that the claim exist
                None => Ok(true),
            };
        }
        Ok(false)
    }
}

impl Filter {
    /// Apply the filter to a selected node.
    fn matches(&self, node: &Value) -> Result<bool> {
        match &self.value {
            FilterValue::Const(expected) => Ok(constant_matches(node, expected)),
            FilterValue::Pattern(pattern) => {
                let regex = Regex::new(pattern)
                    .map_err(|e| Error::Usage(format!("invalid pattern {pattern}: {e}")))?;
                let haystack = match node {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                Ok(regex.is_match(&haystack))
            }
            FilterValue::Format(format) => named_format_matches(node, format),
        }
    }
}

/// Exact comparison against a scalar, with membership semantics for arrays
/// (a `type` array matches when any entry equals the constant).
fn constant_matches(node: &Value, expected: &str) -> bool {
    match node {
        Value::String(text) => text == expected,
        Value::Array(entries) => entries.iter().any(|entry| entry.as_str() == Some(expected)),
        Value::Bool(flag) => expected == if *flag { "true" } else { "false" },
        Value::Number(number) => number.to_string() == expected,
        Value::Null | Value::Object(_) => false,
    }
}

/// The named-format checks PEX profiles use in practice: calendar dates
/// (`full-date` elements such as `birth_date`) and RFC 3339 instants.
fn named_format_matches(node: &Value, format: &str) -> Result<bool> {
    let Value::String(text) = node else {
        return Ok(false);
    };
    match format {
        "date" => Ok(NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()),
        "date-time" => Ok(DateTime::parse_from_rfc3339(text).is_ok()),
        other => Err(Error::Usage(format!("unsupported format constraint: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Claims shaped like the VC-JWT payloads this engine issues.
    struct VcClaims(Value);

    impl Claims for VcClaims {
        fn to_json(&self) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn erika_vc() -> VcClaims {
        VcClaims(json!({
            "iss": "https://issuer.example",
            "sub": "urn:ietf:params:oauth:jwk-thumbprint:sha-256:abc",
            "vc": {
                "type": ["VerifiableCredential", "AtomicAttribute2023"],
                "issuanceDate": "2024-03-01T12:00:00Z",
                "credentialSubject": {
                    "given-name": "Erika",
                    "birth_date": "1986-03-22",
                    "age-over-18": true
                }
            }
        }))
    }

    fn constraints(value: Value) -> Constraints {
        serde_json::from_value(value).expect("should deserialize")
    }

    #[test]
    fn type_membership() {
        let constraints = constraints(json!({
            "fields": [{
                "path": ["$.vc.type"],
                "filter": {"type": "string", "const": "AtomicAttribute2023"}
            }]
        }));
        assert!(constraints.accepts(&erika_vc()).expect("should evaluate"));

        let wrong_type = self::constraints(json!({
            "fields": [{
                "path": ["$.vc.type"],
                "filter": {"type": "string", "const": "MobileDrivingLicence"}
            }]
        }));
        assert!(!wrong_type.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn missing_claim_disqualifies_unless_optional() {
        let required = constraints(json!({
            "fields": [{"path": ["$.vc.credentialSubject.family-name"]}]
        }));
        assert!(!required.accepts(&erika_vc()).expect("should evaluate"));

        let optional = constraints(json!({
            "fields": [{"path": ["$.vc.credentialSubject.family-name"], "optional": true}]
        }));
        assert!(optional.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn fallback_paths_are_tried_in_order() {
        // the first candidate selects nothing; the second finds the claim
        let constraints = constraints(json!({
            "fields": [{
                "path": ["$.vc.credentialSubject.given_name", "$.vc.credentialSubject.given-name"],
                "filter": {"type": "string", "const": "Erika"}
            }]
        }));
        assert!(constraints.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn pattern_over_issuer() {
        let constraints = constraints(json!({
            "fields": [{
                "path": ["$.iss"],
                "filter": {"type": "string", "pattern": "^https://[a-z]+\\.example$"}
            }]
        }));
        assert!(constraints.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn date_formats() {
        let full_date = constraints(json!({
            "fields": [{
                "path": ["$.vc.credentialSubject.birth_date"],
                "filter": {"type": "string", "format": "date"}
            }]
        }));
        assert!(full_date.accepts(&erika_vc()).expect("should evaluate"));

        // an instant is not a calendar date
        let mismatched = constraints(json!({
            "fields": [{
                "path": ["$.vc.issuanceDate"],
                "filter": {"type": "string", "format": "date"}
            }]
        }));
        assert!(!mismatched.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn boolean_constant() {
        let constraints = constraints(json!({
            "fields": [{
                "path": ["$.vc.credentialSubject.age-over-18"],
                "filter": {"type": "boolean", "const": "true"}
            }]
        }));
        assert!(constraints.accepts(&erika_vc()).expect("should evaluate"));
    }

    #[test]
    fn no_fields_accepts_anything() {
        let constraints: Constraints = serde_json::from_value(json!({})).expect("should parse");
        assert!(constraints.accepts(&erika_vc()).expect("should evaluate"));
    }
}
