//! Engine configuration and errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The engine's recognized options, with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When set, webhook actions emit a disabled event without calling out.
    #[serde(default)]
    pub disable_webhooks: bool,
    #[serde(default = "default_max_webhook_response_bytes")]
    pub max_webhook_response_bytes: usize,
    #[serde(default = "default_asset_cache_size")]
    pub asset_cache_size: usize,
    #[serde(default = "default_asset_cache_prune")]
    pub asset_cache_prune: usize,
    /// Sent as a bearer token on asset fetches.
    #[serde(default)]
    pub asset_server_token: String,
}

fn default_max_webhook_response_bytes() -> usize {
    10000
}

fn default_asset_cache_size() -> usize {
    1000
}

fn default_asset_cache_prune() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            disable_webhooks: false,
            max_webhook_response_bytes: default_max_webhook_response_bytes(),
            asset_cache_size: default_asset_cache_size(),
            asset_cache_prune: default_asset_cache_prune(),
            asset_server_token: String::new(),
        }
    }
}

/// Errors that stop a start or resume before any sweep happens. Problems
/// *during* a sweep surface as error and fatal_error events instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidSession { message: String },
    CannotResume { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSession { message } => {
                write!(f, "invalid session: {}", message)
            }
            EngineError::CannotResume { message } => {
                write!(f, "unable to resume: {}", message)
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_apply_to_missing_keys() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.disable_webhooks);
        assert_eq!(config.max_webhook_response_bytes, 10000);
        assert_eq!(config.asset_cache_size, 1000);
        assert_eq!(config.asset_cache_prune, 100);
        assert_eq!(config.asset_server_token, "");

        let config: EngineConfig =
            serde_json::from_str(r#"{"disable_webhooks": true, "asset_cache_size": 5}"#).unwrap();
        assert!(config.disable_webhooks);
        assert_eq!(config.asset_cache_size, 5);
    }
}
