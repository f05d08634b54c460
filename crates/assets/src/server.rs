//! Asset servers: where asset bytes come from.
//!
//! The remote implementation resolves a URL per `(type, key)` and fetches
//! with a bearer token. The static implementation serves canned JSON and
//! backs the test suites.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{AssetError, AssetReader, AssetType, AssetValue};

/// Resolves and fetches assets by type and key.
pub trait AssetServer: Send + Sync {
    fn is_type_supported(&self, asset_type: AssetType) -> bool;

    /// Fetches and materializes one asset. Key is ignored for collection
    /// types, which live at their set URL.
    fn fetch(&self, asset_type: AssetType, key: &str) -> Result<AssetValue, AssetError>;
}

// ──────────────────────────────────────────────
// Remote server
// ──────────────────────────────────────────────

/// An asset server reached over HTTP. URLs may contain `{key}` which is
/// replaced by the item key; collection types use their URL as-is.
pub struct RemoteAssetServer {
    urls: HashMap<AssetType, String>,
    readers: HashMap<AssetType, AssetReader>,
    auth_token: String,
    client: reqwest::blocking::Client,
}

impl RemoteAssetServer {
    pub fn new(
        urls: HashMap<AssetType, String>,
        readers: HashMap<AssetType, AssetReader>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        RemoteAssetServer {
            urls,
            readers,
            auth_token: auth_token.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .expect("default TLS backend available"),
        }
    }

    fn resolve_url(&self, asset_type: AssetType, key: &str) -> Result<String, AssetError> {
        let template = self.urls.get(&asset_type).ok_or_else(|| AssetError::TypeNotSupported {
            asset_type: asset_type.to_string(),
        })?;
        Ok(template.replace("{key}", key))
    }
}

impl AssetServer for RemoteAssetServer {
    fn is_type_supported(&self, asset_type: AssetType) -> bool {
        self.urls.contains_key(&asset_type)
    }

    fn fetch(&self, asset_type: AssetType, key: &str) -> Result<AssetValue, AssetError> {
        let url = self.resolve_url(asset_type, key)?;
        tracing::debug!(%asset_type, key, %url, "fetching asset");

        let mut request = self.client.get(&url);
        if !self.auth_token.is_empty() {
            request = request.bearer_auth(&self.auth_token);
        }
        let response = request.send().map_err(|e| AssetError::Fetch {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(AssetError::Fetch {
                url: url.clone(),
                message: format!("asset request returned {}", response.status()),
            });
        }
        let body = response.bytes().map_err(|e| AssetError::Fetch {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let reader = self.readers.get(&asset_type).ok_or_else(|| AssetError::TypeNotSupported {
            asset_type: asset_type.to_string(),
        })?;
        reader(&body)
    }
}

// ──────────────────────────────────────────────
// Static server
// ──────────────────────────────────────────────

/// An in-memory asset server holding canned JSON bodies.
pub struct StaticAssetServer {
    items: HashMap<(AssetType, String), Vec<u8>>,
    readers: HashMap<AssetType, AssetReader>,
}

impl StaticAssetServer {
    pub fn new(readers: HashMap<AssetType, AssetReader>) -> Self {
        StaticAssetServer { items: HashMap::new(), readers }
    }

    pub fn add(&mut self, asset_type: AssetType, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.items.insert((asset_type, key.into()), body.into());
    }
}

impl AssetServer for StaticAssetServer {
    fn is_type_supported(&self, asset_type: AssetType) -> bool {
        self.readers.contains_key(&asset_type)
    }

    fn fetch(&self, asset_type: AssetType, key: &str) -> Result<AssetValue, AssetError> {
        let body = self
            .items
            .get(&(asset_type, key.to_string()))
            .ok_or_else(|| AssetError::Fetch {
                url: format!("static:{}/{}", asset_type, key),
                message: "no such asset".to_string(),
            })?;
        let reader = self.readers.get(&asset_type).ok_or_else(|| AssetError::TypeNotSupported {
            asset_type: asset_type.to_string(),
        })?;
        reader(body)
    }
}
