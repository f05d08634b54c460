//! The session-scoped asset facade and the materialized asset content types.
//!
//! The shared cache stores type-erased values; this module registers the
//! readers that materialize them and exposes typed, read-through accessors.
//! A cached value of the wrong concrete type is a fatal error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brook_assets::{
    json_reader, AssetCache, AssetError, AssetReader, AssetServer, AssetType, AssetValue,
};

use crate::definition::Flow;

// ──────────────────────────────────────────────
// Asset content types
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub label: String,
    #[serde(default = "default_value_type")]
    pub value_type: String,
}

fn default_value_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub uuid: Uuid,
    pub name: String,
}

/// A node in the location hierarchy: name, aliases and children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHierarchy {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub children: Vec<LocationHierarchy>,
}

pub type ChannelSet = Vec<Channel>;
pub type FieldSet = Vec<Field>;
pub type GroupSet = Vec<Group>;
pub type LabelSet = Vec<Label>;

// ──────────────────────────────────────────────
// Readers
// ──────────────────────────────────────────────

/// The reader table for every asset type the engine understands. Flows are
/// validated as part of materialization so a structurally broken flow never
/// enters the cache.
pub fn default_readers() -> HashMap<AssetType, AssetReader> {
    let mut readers: HashMap<AssetType, AssetReader> = HashMap::new();
    readers.insert(
        AssetType::Flow,
        Arc::new(|data: &[u8]| {
            let flow: Flow = serde_json::from_slice(data).map_err(|e| AssetError::Invalid {
                asset_type: AssetType::Flow.to_string(),
                message: e.to_string(),
            })?;
            flow.validate().map_err(|e| AssetError::Invalid {
                asset_type: AssetType::Flow.to_string(),
                message: e,
            })?;
            Ok(Arc::new(flow) as AssetValue)
        }),
    );
    readers.insert(AssetType::ChannelSet, json_reader::<ChannelSet>(AssetType::ChannelSet));
    readers.insert(AssetType::FieldSet, json_reader::<FieldSet>(AssetType::FieldSet));
    readers.insert(AssetType::GroupSet, json_reader::<GroupSet>(AssetType::GroupSet));
    readers.insert(AssetType::LabelSet, json_reader::<LabelSet>(AssetType::LabelSet));
    readers.insert(
        AssetType::LocationHierarchy,
        json_reader::<LocationHierarchy>(AssetType::LocationHierarchy),
    );
    readers
}

/// Builds session assets over a remote asset server, wiring in the engine's
/// cache bounds and bearer token.
pub fn remote_session_assets(
    config: &crate::engine::EngineConfig,
    urls: HashMap<AssetType, String>,
) -> SessionAssets {
    let server = brook_assets::RemoteAssetServer::new(
        urls,
        default_readers(),
        config.asset_server_token.clone(),
        std::time::Duration::from_secs(10),
    );
    SessionAssets::new(
        Arc::new(AssetCache::new(config.asset_cache_size, config.asset_cache_prune)),
        Arc::new(server),
    )
}

// ──────────────────────────────────────────────
// Session assets
// ──────────────────────────────────────────────

/// Read-through access to assets for one session: a shared cache fronting
/// an asset server.
#[derive(Clone)]
pub struct SessionAssets {
    cache: Arc<AssetCache>,
    server: Arc<dyn AssetServer>,
}

impl SessionAssets {
    pub fn new(cache: Arc<AssetCache>, server: Arc<dyn AssetServer>) -> Self {
        SessionAssets { cache, server }
    }

    pub fn has_locations(&self) -> bool {
        self.server.is_type_supported(AssetType::LocationHierarchy)
    }

    fn get<T: Send + Sync + 'static>(
        &self,
        asset_type: AssetType,
        key: &str,
    ) -> Result<Arc<T>, AssetError> {
        let value = self.cache.get(self.server.as_ref(), asset_type, key)?;
        value.downcast::<T>().map_err(|_| AssetError::TypeMismatch {
            asset_type: asset_type.to_string(),
            key: key.to_string(),
        })
    }

    pub fn get_flow(&self, uuid: Uuid) -> Result<Arc<Flow>, AssetError> {
        self.get::<Flow>(AssetType::Flow, &uuid.to_string())
    }

    pub fn get_channel_set(&self) -> Result<Arc<ChannelSet>, AssetError> {
        self.get::<ChannelSet>(AssetType::ChannelSet, "")
    }

    pub fn get_channel(&self, uuid: Uuid) -> Result<Channel, AssetError> {
        let channels = self.get_channel_set()?;
        channels
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                url: format!("channel:{}", uuid),
                message: format!("no such channel with uuid '{}'", uuid),
            })
    }

    pub fn get_field_set(&self) -> Result<Arc<FieldSet>, AssetError> {
        self.get::<FieldSet>(AssetType::FieldSet, "")
    }

    pub fn get_field(&self, key: &str) -> Result<Field, AssetError> {
        let fields = self.get_field_set()?;
        fields
            .iter()
            .find(|f| f.key == key)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                url: format!("field:{}", key),
                message: format!("no such field with key '{}'", key),
            })
    }

    pub fn get_group_set(&self) -> Result<Arc<GroupSet>, AssetError> {
        self.get::<GroupSet>(AssetType::GroupSet, "")
    }

    pub fn get_group(&self, uuid: Uuid) -> Result<Group, AssetError> {
        let groups = self.get_group_set()?;
        groups
            .iter()
            .find(|g| g.uuid == uuid)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                url: format!("group:{}", uuid),
                message: format!("no such group with uuid '{}'", uuid),
            })
    }

    pub fn get_label_set(&self) -> Result<Arc<LabelSet>, AssetError> {
        self.get::<LabelSet>(AssetType::LabelSet, "")
    }

    pub fn get_label(&self, uuid: Uuid) -> Result<Label, AssetError> {
        let labels = self.get_label_set()?;
        labels
            .iter()
            .find(|l| l.uuid == uuid)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                url: format!("label:{}", uuid),
                message: format!("no such label with uuid '{}'", uuid),
            })
    }

    pub fn get_location_hierarchy(&self) -> Result<Arc<LocationHierarchy>, AssetError> {
        self.get::<LocationHierarchy>(AssetType::LocationHierarchy, "")
    }
}
