//! Asset type tags, values and errors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The kinds of asset the engine can reference. Collection types are
/// fetched whole and cached under a singleton key; flows are keyed by uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Flow,
    ChannelSet,
    FieldSet,
    GroupSet,
    LabelSet,
    LocationHierarchy,
}

impl AssetType {
    /// Whether this type is a collection cached under a singleton key.
    pub fn is_set(&self) -> bool {
        !matches!(self, AssetType::Flow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Flow => "flow",
            AssetType::ChannelSet => "channel_set",
            AssetType::FieldSet => "field_set",
            AssetType::GroupSet => "group_set",
            AssetType::LabelSet => "label_set",
            AssetType::LocationHierarchy => "location_hierarchy",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A materialized asset. The concrete type behind the `Any` is decided by
/// the reader registered for the asset type; consumers downcast and treat a
/// mismatch as fatal.
pub type AssetValue = Arc<dyn Any + Send + Sync>;

/// Deserializes fetched bytes into a materialized asset value.
pub type AssetReader = Arc<dyn Fn(&[u8]) -> Result<AssetValue, AssetError> + Send + Sync>;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The server has no URL for this asset type.
    TypeNotSupported { asset_type: String },
    /// The server couldn't produce the asset.
    Fetch { url: String, message: String },
    /// The fetched bytes don't deserialize as the expected type.
    Invalid { asset_type: String, message: String },
    /// The cache holds a value of the wrong concrete type for this lookup.
    TypeMismatch { asset_type: String, key: String },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::TypeNotSupported { asset_type } => {
                write!(f, "asset type '{}' not supported by server", asset_type)
            }
            AssetError::Fetch { url, message } => {
                write!(f, "error fetching '{}': {}", url, message)
            }
            AssetError::Invalid { asset_type, message } => {
                write!(f, "invalid {} asset: {}", asset_type, message)
            }
            AssetError::TypeMismatch { asset_type, key } => {
                write!(
                    f,
                    "asset cache contains asset with wrong type for {} '{}'",
                    asset_type, key
                )
            }
        }
    }
}

impl std::error::Error for AssetError {}

/// Builds a reader that deserializes JSON into `T` and boxes it.
pub fn json_reader<T>(asset_type: AssetType) -> AssetReader
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(move |data: &[u8]| {
        let value: T = serde_json::from_slice(data).map_err(|e| AssetError::Invalid {
            asset_type: asset_type.to_string(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(value) as AssetValue)
    })
}
