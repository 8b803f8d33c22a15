//! mdoc presentation: selective disclosure by item subset plus device
//! authentication.

use std::collections::BTreeMap;

use crate::cbor::{EmbeddedCoseSign1, Tag24};
use crate::cose;
use crate::format::mdoc::{
    DeviceAuth, DeviceBinding, DeviceResponse, DeviceSigned, Document, IssuerSigned, VERSION,
    device_authentication_bytes,
};
use crate::provider::Signer;
use crate::{Error, Result};

/// Build a `DeviceResponse` presenting a subset of an issued document's
/// data elements.
#[derive(Debug)]
pub struct DeviceResponseBuilder<S> {
    issuer_signed: Option<IssuerSigned>,
    doc_type: Option<String>,
    requested: Option<BTreeMap<String, Vec<String>>>,
    binding: Option<DeviceBinding>,
    signer: S,
}

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for DeviceResponseBuilder<NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceResponseBuilder<NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issuer_signed: None,
            doc_type: None,
            requested: None,
            binding: None,
            signer: NoSigner,
        }
    }

    /// Set the device Signer — the key committed to in `deviceKeyInfo`.
    pub fn signer<S: Signer>(self, signer: &'_ S) -> DeviceResponseBuilder<HasSigner<'_, S>> {
        DeviceResponseBuilder {
            issuer_signed: self.issuer_signed,
            doc_type: self.doc_type,
            requested: self.requested,
            binding: self.binding,
            signer: HasSigner(signer),
        }
    }
}

impl<S> DeviceResponseBuilder<S> {
    /// The issued document to present.
    #[must_use]
    pub fn issuer_signed(mut self, issuer_signed: IssuerSigned) -> Self {
        self.issuer_signed = Some(issuer_signed);
        self
    }

    /// The document type (as committed in the MSO).
    #[must_use]
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Restrict the presentation to the requested elements per namespace.
    /// Without this, every issued element is presented.
    #[must_use]
    pub fn requested(mut self, requested: BTreeMap<String, Vec<String>>) -> Self {
        self.requested = Some(requested);
        self
    }

    /// How to bind the device signature to the exchange.
    #[must_use]
    pub fn binding(mut self, binding: DeviceBinding) -> Self {
        self.binding = Some(binding);
        self
    }
}

impl<S: Signer> DeviceResponseBuilder<HasSigner<'_, S>> {
    /// Build the response.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or signing fails.
    pub async fn build(self) -> Result<DeviceResponse> {
        let Some(mut issuer_signed) = self.issuer_signed else {
            return Err(Error::Usage("issuer_signed is required".to_string()));
        };
        let Some(doc_type) = self.doc_type else {
            return Err(Error::Usage("doc_type is required".to_string()));
        };
        let Some(binding) = self.binding else {
            return Err(Error::Usage("device binding is required".to_string()));
        };

        // selective disclosure: keep only the requested items; withheld
        // digests stay authenticated in the MSO but are not presented
        if let Some(requested) = &self.requested {
            if let Some(namespaces) = issuer_signed.name_spaces.take() {
                let mut filtered = BTreeMap::new();
                for (namespace, items) in namespaces {
                    let Some(wanted) = requested.get(&namespace) else {
                        continue;
                    };
                    let kept: Vec<_> = items
                        .into_iter()
                        .filter(|item| wanted.contains(&item.inner().element_identifier))
                        .collect();
                    if !kept.is_empty() {
                        filtered.insert(namespace, kept);
                    }
                }
                issuer_signed.name_spaces = Some(filtered);
            }
        }

        // this profile carries no self-asserted device namespaces
        let device_namespaces = Tag24::new(BTreeMap::new())?;

        let device_signature = match &binding {
            DeviceBinding::Transcript(transcript) => {
                let payload =
                    device_authentication_bytes(transcript, &doc_type, &device_namespaces)?;
                cose::sign_detached(&payload, &[], self.signer.0).await?
            }
            DeviceBinding::Challenge(nonce) => {
                cose::sign(nonce.clone().into_bytes(), &[], self.signer.0).await?
            }
        };

        let document = Document {
            doc_type,
            issuer_signed,
            device_signed: Some(DeviceSigned {
                name_spaces: device_namespaces,
                device_auth: DeviceAuth {
                    device_signature: Some(EmbeddedCoseSign1(device_signature)),
                    device_mac: None,
                },
            }),
        };

        Ok(DeviceResponse { version: VERSION.to_string(), documents: Some(vec![document]), status: 0 })
    }
}
