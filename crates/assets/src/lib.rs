//! Asset infrastructure for the flow engine: a bounded, single-flight
//! cache fronting an asset server.
//!
//! Asset *content* types live with the runtime; this crate stores
//! type-erased values and dispatches deserialization through readers
//! registered per asset type.

mod cache;
mod server;
mod types;

pub use cache::AssetCache;
pub use server::{AssetServer, RemoteAssetServer, StaticAssetServer};
pub use types::{json_reader, AssetError, AssetReader, AssetType, AssetValue};
