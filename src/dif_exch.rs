//! # Presentation Exchange
//!
//! Types for the [DIF Presentation Exchange 2.0.0](https://identity.foundation/presentation-exchange/spec/v2.0.0)
//! data model: a Verifier describes the credentials it needs with a
//! `PresentationDefinition`; a Holder answers with a
//! `PresentationSubmission` locating each credential inside the VP token.

mod matcher;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format::ClaimFormat;
use crate::Result;

/// Used by a Verifier to articulate proofs required. The proofs help the
/// Verifier decide how to interact with the Holder providing them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    /// A unique ID for the desired context.
    pub id: String,

    /// Human-friendly name for the definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The purpose for which the presentation is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// One input descriptor per requested credential.
    pub input_descriptors: Vec<InputDescriptor>,

    /// The formats the Verifier accepts, keyed by format designation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<HashMap<ClaimFormat, FormatProfile>>,
}

/// Describes one credential the Verifier requires.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct InputDescriptor {
    /// Unique (within the definition) descriptor identifier.
    pub id: String,

    /// Human-friendly name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The purpose for requesting this credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Accepted formats for this descriptor, overriding the definition's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<HashMap<ClaimFormat, FormatProfile>>,

    /// Constraints the candidate credential must satisfy.
    pub constraints: Constraints,
}

/// Algorithms or proof types acceptable for a format.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FormatProfile {
    /// Accepted JWS algorithms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<Vec<String>>,

    /// Accepted proof types (Data Integrity formats).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_type: Option<Vec<String>>,
}

/// Constraints on a candidate credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Constraints {
    /// Constraint fields; a credential must answer every non-optional one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,

    /// Whether the Holder must limit disclosure to the named fields:
    /// `required` or `preferred`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<String>,
}

/// One field constraint: JSONPath candidates plus an optional filter.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Field {
    /// JSONPath expressions; the first that selects a node is used.
    pub path: Vec<String>,

    /// A JSON Schema descriptor applied to the selected node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// When `true`, a failed match does not disqualify the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    /// Field identifier, used for cross-field `same_subject` grouping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The subset of JSON Schema filtering PEX profiles use.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Filter {
    /// Expected JSON type of the selected node.
    #[serde(rename = "type")]
    pub type_: String,

    /// The comparison to apply.
    #[serde(flatten)]
    pub value: FilterValue,
}

/// The filter comparison variants in use.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterValue {
    /// Exact match.
    Const(String),

    /// Regular expression over the node's serialization.
    Pattern(String),

    /// A named format, e.g. `date` or `date-time`.
    Format(String),
}

impl Default for FilterValue {
    fn default() -> Self {
        Self::Const(String::new())
    }
}

/// Claims data the constraint matcher evaluates against.
pub trait Claims {
    /// Serialize claims to a JSON value for JSONPath evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be represented as JSON.
    fn to_json(&self) -> Result<Value>;
}

/// Submitted alongside a VP token to locate each presented credential and
/// name its format.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    /// Unique submission identifier.
    pub id: String,

    /// The `PresentationDefinition.id` this submission answers.
    pub definition_id: String,

    /// One entry per satisfied input descriptor.
    pub descriptor_map: Vec<DescriptorMap>,
}

/// Locates a credential within the VP token.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DescriptorMap {
    /// The matching `InputDescriptor.id`.
    pub id: String,

    /// The format of the element at `path`.
    pub format: ClaimFormat,

    /// JSONPath into the VP token.
    pub path: String,

    /// Nested location for multi-layer envelopes (e.g. a VC inside a VP).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    /// The chain of JSONPath expressions to apply in order, outermost
    /// first.
    #[must_use]
    pub fn path_chain(&self) -> Vec<&str> {
        let mut chain = vec![self.path.as_str()];
        let mut nested = self.path_nested.as_deref();
        while let Some(map) = nested {
            chain.push(map.path.as_str());
            nested = map.path_nested.as_deref();
        }
        chain
    }

    /// The format of the innermost element.
    #[must_use]
    pub fn innermost_format(&self) -> &ClaimFormat {
        let mut map = self;
        while let Some(nested) = map.path_nested.as_deref() {
            map = nested;
        }
        &map.format
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn descriptor_path_chain() {
        let map: DescriptorMap = serde_json::from_value(json!({
            "id": "employment",
            "format": "jwt_vp",
            "path": "$",
            "path_nested": {
                "id": "employment",
                "format": "jwt_vc",
                "path": "$.vp.verifiableCredential[0]"
            }
        }))
        .expect("should deserialize");

        assert_eq!(map.path_chain(), vec!["$", "$.vp.verifiableCredential[0]"]);
        assert_eq!(map.innermost_format(), &ClaimFormat::JwtVc);
    }

    #[test]
    fn definition_round_trip() {
        let definition = json!({
            "id": "employment-check",
            "input_descriptors": [{
                "id": "employment",
                "constraints": {
                    "fields": [{
                        "path": ["$.vc.type"],
                        "filter": {"type": "string", "const": "EmployeeIDCredential"}
                    }]
                }
            }]
        });

        let parsed: PresentationDefinition =
            serde_json::from_value(definition.clone()).expect("should deserialize");
        assert_eq!(serde_json::to_value(&parsed).expect("should serialize"), definition);
    }
}
