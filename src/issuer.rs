//! # Issuer
//!
//! The issuing agent: one logical credential, issued in any of the three
//! representations against the holder's key. Revocation indexes are
//! allocated from the issuer's status list as credentials are issued.

use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::format::mdoc::{IssuerSigned, MdocBuilder, TypeCodecRegistry};
use crate::format::sd_jwt::SdJwtBuilder;
use crate::format::w3c_vc::{CredentialStatus, W3cVcBuilder};
use crate::jose::jwk::PublicKeyJwk;
use crate::provider::Signer;
use crate::status::list::{RevocationList, StatusListCredentialBuilder};
use crate::{Error, Result};

/// An issuing agent. Owns its key material (via the signer) and its
/// revocation list.
pub struct Issuer<'a, S: Signer> {
    id: String,
    signer: &'a S,
    status_list_url: Option<String>,
    revocation: Mutex<RevocationList>,
    next_index: Mutex<usize>,
    registry: TypeCodecRegistry,
}

impl<'a, S: Signer> Issuer<'a, S> {
    /// An issuer identified by `id` (a URI), signing with the given key.
    pub fn new(id: impl Into<String>, signer: &'a S) -> Self {
        Self {
            id: id.into(),
            signer,
            status_list_url: None,
            revocation: Mutex::new(RevocationList::default()),
            next_index: Mutex::new(0),
            registry: TypeCodecRegistry::new(),
        }
    }

    /// Enable status list support: issued VC-JWTs carry a
    /// `credentialStatus` pointing at this URL.
    #[must_use]
    pub fn with_status_list(mut self, url: impl Into<String>) -> Self {
        self.status_list_url = Some(url.into());
        self
    }

    /// The element codec registry used for mdoc issuance.
    #[must_use]
    pub fn with_registry(mut self, registry: TypeCodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The issuer identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Issue a W3C VC-JWT for the holder.
    ///
    /// # Errors
    ///
    /// Returns an error if building or signing fails.
    pub async fn issue_jwt_vc(
        &self, credential_type: &str, holder_id: &str, claims: Map<String, Value>,
    ) -> Result<String> {
        tracing::debug!("issue jwt_vc");

        let mut builder = W3cVcBuilder::new()
            .issuer(&self.id)
            .add_type(credential_type)
            .holder(holder_id)
            .claims(claims);

        if let Some(url) = &self.status_list_url {
            builder = builder.status(CredentialStatus::new(url, self.allocate_index()?));
        }

        builder.signer(self.signer).build().await
    }

    /// Issue an SD-JWT credential with the named claims selectively
    /// disclosable.
    ///
    /// # Errors
    ///
    /// Returns an error if a disclosable path does not resolve or signing
    /// fails.
    pub async fn issue_sd_jwt(
        &self, vct: &str, claims: Map<String, Value>, disclosable: &[&str],
        holder_jwk: PublicKeyJwk,
    ) -> Result<String> {
        tracing::debug!("issue sd-jwt");

        let mut builder = SdJwtBuilder::new()
            .issuer(&self.id)
            .vct(vct)
            .claims(claims)
            .holder_jwk(holder_jwk);
        for path in disclosable {
            builder = builder.disclosable(*path);
        }
        builder.signer(self.signer).build().await
    }

    /// Issue an ISO mdoc committed to the holder's device key.
    ///
    /// # Errors
    ///
    /// Returns an error if an element cannot be encoded or signing fails.
    pub async fn issue_mdoc(
        &self, doc_type: &str, namespace: &str, claims: Map<String, Value>,
        device_jwk: PublicKeyJwk,
    ) -> Result<IssuerSigned> {
        tracing::debug!("issue mdoc");

        MdocBuilder::new()
            .doc_type(doc_type)
            .namespace(namespace, claims)
            .device_jwk(device_jwk)
            .registry(self.registry.clone())
            .signer(self.signer)
            .build()
            .await
    }

    /// Revoke the credential issued with the given status index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when the index is out of range.
    pub fn revoke(&self, index: usize) -> Result<()> {
        self.revocation.lock().map_err(|_| Error::Usage("lock poisoned".to_string()))?.revoke(index)
    }

    /// Build the signed status list credential for publication.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when status list support is not enabled.
    pub async fn status_list_credential(&self) -> Result<String> {
        let Some(url) = &self.status_list_url else {
            return Err(Error::Usage("no status list configured".to_string()));
        };
        let list = self
            .revocation
            .lock()
            .map_err(|_| Error::Usage("lock poisoned".to_string()))?
            .clone();

        StatusListCredentialBuilder::new(&list)
            .issuer(&self.id)
            .list_url(url)
            .signer(self.signer)
            .build()
            .await
    }

    fn allocate_index(&self) -> Result<usize> {
        let mut next = self.next_index.lock().map_err(|_| Error::Usage("lock poisoned".to_string()))?;
        let index = *next;
        *next += 1;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::key::{Curve, KeyMaterial};

    #[tokio::test]
    async fn status_indexes_are_monotonic() {
        let key = KeyMaterial::generate(Curve::P256);
        let issuer = Issuer::new("https://issuer.example", &key)
            .with_status_list("https://issuer.example/status/1");

        let first = issuer
            .issue_jwt_vc("TestCredential", "holder-1", json!({"a": 1}).as_object().unwrap().clone())
            .await
            .expect("should issue");
        let second = issuer
            .issue_jwt_vc("TestCredential", "holder-2", json!({"a": 2}).as_object().unwrap().clone())
            .await
            .expect("should issue");

        let parse = |token: &str| {
            crate::jose::jws::decode_unverified::<crate::format::w3c_vc::W3cVcClaims>(token)
                .unwrap()
                .claims
        };
        assert_eq!(parse(&first).vc.credential_status.unwrap().status_list_index, "0");
        assert_eq!(parse(&second).vc.credential_status.unwrap().status_list_index, "1");
    }
}
