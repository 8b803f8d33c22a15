//! mdoc issuance: building `IssuerSigned` with a signed mobile security
//! object.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_bytes::ByteBuf;
use serde_json::{Map, Value};

use crate::cbor::{EmbeddedCoseSign1, TDate, Tag24};
use crate::core::generate;
use crate::cose;
use crate::format::mdoc::{
    DIGEST_ALGORITHM, DeviceKeyInfo, IssuerSigned, IssuerSignedItem, MobileSecurityObject,
    TypeCodecRegistry, VERSION, ValidityInfo,
};
use crate::jose::jwk::PublicKeyJwk;
use crate::provider::Signer;
use crate::{Error, Result};

/// Generate an ISO mdoc `mso_mdoc` format credential.
#[derive(Debug)]
pub struct MdocBuilder<S> {
    doc_type: Option<String>,
    namespaces: BTreeMap<String, Map<String, Value>>,
    device_jwk: Option<PublicKeyJwk>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    registry: TypeCodecRegistry,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for MdocBuilder<NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl MdocBuilder<NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            doc_type: None,
            namespaces: BTreeMap::new(),
            device_jwk: None,
            valid_from: None,
            valid_until: None,
            registry: TypeCodecRegistry::new(),
            signer: NoSigner,
        }
    }

    /// Set the credential Signer.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> MdocBuilder<HasSigner<'_, S>> {
        MdocBuilder {
            doc_type: self.doc_type,
            namespaces: self.namespaces,
            device_jwk: self.device_jwk,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            registry: self.registry,
            signer: HasSigner(signer),
        }
    }
}

impl<S> MdocBuilder<S> {
    /// The document type, e.g. `org.iso.18013.5.1.mDL`.
    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Add a namespace of data elements.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>, claims: Map<String, Value>) -> Self {
        self.namespaces.insert(namespace.into(), claims);
        self
    }

    /// The holder's device public key, committed to in `deviceKeyInfo`.
    #[must_use]
    pub fn device_jwk(mut self, jwk: PublicKeyJwk) -> Self {
        self.device_jwk = Some(jwk);
        self
    }

    /// The validity window (defaults to one year from now).
    #[must_use]
    pub const fn validity(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.valid_from = Some(from);
        self.valid_until = Some(until);
        self
    }

    /// The element codec registry to encode values with.
    #[must_use]
    pub fn registry(mut self, registry: TypeCodecRegistry) -> Self {
        self.registry = registry;
        self
    }
}

impl<S: Signer> MdocBuilder<HasSigner<'_, S>> {
    /// Build the credential, returning the `IssuerSigned` structure.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing, an element value
    /// cannot be encoded, or signing fails.
    pub async fn build(self) -> Result<IssuerSigned> {
        let Some(doc_type) = self.doc_type else {
            return Err(Error::Usage("doc_type is required".to_string()));
        };
        let Some(device_jwk) = self.device_jwk else {
            return Err(Error::Usage("device key is required".to_string()));
        };
        if self.namespaces.is_empty() {
            return Err(Error::Usage("at least one namespace is required".to_string()));
        }

        let mut name_spaces = BTreeMap::new();
        let mut value_digests: BTreeMap<String, BTreeMap<u64, ByteBuf>> = BTreeMap::new();

        for (namespace, claims) in &self.namespaces {
            let mut items = vec![];
            let mut digests = BTreeMap::new();

            // digest IDs are monotonic within the namespace
            for (digest_id, (name, value)) in (0u64..).zip(claims.iter()) {
                let item = IssuerSignedItem {
                    digest_id,
                    random: ByteBuf::from(generate::random_bytes::<16>().to_vec()),
                    element_identifier: name.clone(),
                    element_value: self.registry.encode(namespace, name, value)?,
                };
                let wrapped = Tag24::new(item)?;
                digests.insert(digest_id, ByteBuf::from(wrapped.value_digest()?));
                items.push(wrapped);
            }

            name_spaces.insert(namespace.clone(), items);
            value_digests.insert(namespace.clone(), digests);
        }

        let now = Utc::now();
        let mso = MobileSecurityObject {
            version: VERSION.to_string(),
            digest_algorithm: DIGEST_ALGORITHM.to_string(),
            value_digests,
            device_key_info: DeviceKeyInfo { device_key: cose::to_cose_key(&device_jwk)? },
            doc_type,
            validity_info: ValidityInfo {
                signed: TDate(now),
                valid_from: TDate(self.valid_from.unwrap_or(now)),
                valid_until: TDate(self.valid_until.unwrap_or(now + Duration::days(365))),
            },
        };

        let payload = Tag24::new(mso)?.to_vec()?;
        let issuer_auth = cose::sign(payload, &[], self.signer.0).await?;

        Ok(IssuerSigned { name_spaces: Some(name_spaces), issuer_auth: EmbeddedCoseSign1(issuer_auth) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn digests_cover_every_item() {
        let issuer_key = KeyMaterial::generate(Curve::P256);
        let device_key = KeyMaterial::generate(Curve::P256);

        let issued = MdocBuilder::new()
            .doc_type("org.iso.18013.5.1.mDL")
            .namespace(
                "org.iso.18013.5.1",
                json!({"given_name": "Erika", "family_name": "Mustermann"})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .device_jwk(device_key.public_jwk())
            .signer(&issuer_key)
            .build()
            .await
            .expect("should issue");

        let mso = issued.mobile_security_object().expect("should decode mso");
        assert_eq!(mso.doc_type, "org.iso.18013.5.1.mDL");

        let namespaces = issued.name_spaces.as_ref().unwrap();
        for (namespace, items) in namespaces {
            for item in items {
                let expected = &mso.value_digests[namespace][&item.inner().digest_id];
                assert_eq!(item.value_digest().unwrap(), expected.to_vec());
                assert_eq!(item.inner().random.len(), 16);
            }
        }

        // round-trip through CBOR preserves the digests
        let bytes = crate::cbor::to_vec(&issued).expect("should encode");
        let parsed: IssuerSigned = crate::cbor::from_slice(&bytes).expect("should decode");
        for (namespace, items) in parsed.name_spaces.as_ref().unwrap() {
            for item in items {
                let expected = &mso.value_digests[namespace][&item.inner().digest_id];
                assert_eq!(item.value_digest().unwrap(), expected.to_vec());
            }
        }
    }
}
