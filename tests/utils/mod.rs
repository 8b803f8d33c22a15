//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use attesta::provider::Fetcher;

/// Initialize the tracing subscriber once for the whole test binary.
pub fn init_tracer() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt().with_env_filter("attesta=debug").try_init();
    });
}

/// A fetcher backed by an in-memory URI map, standing in for the HTTP
/// surfaces the protocol fetches from (`request_uri`, status lists).
#[derive(Debug, Default)]
pub struct MapFetcher {
    resources: Mutex<HashMap<String, Vec<u8>>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, uri: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.resources.lock().expect("lock poisoned").insert(uri.into(), body.into());
    }
}

impl Fetcher for MapFetcher {
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        self.resources
            .lock()
            .expect("lock poisoned")
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no resource at {uri}"))
    }
}
