//! Configuration storage abstraction layer.
//!
//! Every persisted configuration object (API settings, block row collections)
//! is a named JSON document. All config reads/writes go through
//! [`ConfigStorage`] so the backing store can be swapped without touching
//! call sites.
//!
//! # Usage
//!
//! ```ignore
//! let settings: Option<ApiSettings> = load_typed(storage.as_ref(), names::API_SETTINGS).await?;
//! storage.save(&names::block("leadership"), &value).await?;
//! ```

mod direct;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use direct::DirectConfigStorage;

/// Well-known configuration object names.
pub mod names {
    /// Upstream API settings edited on the admin configuration surface.
    pub const API_SETTINGS: &str = "meridian_api.settings";

    /// Prefix for block instance configuration objects.
    pub const BLOCK_PREFIX: &str = "block.";

    /// Configuration object name for a block instance.
    pub fn block(block_id: &str) -> String {
        format!("{BLOCK_PREFIX}{block_id}")
    }
}

/// The core trait for configuration storage.
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// Load a configuration object by name.
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>>;

    /// Create or replace a configuration object.
    async fn save(&self, name: &str, data: &serde_json::Value) -> Result<()>;

    /// Delete a configuration object. Returns true if it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// List configuration object names starting with `prefix`, sorted.
    async fn list_names(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Load and deserialize a configuration object.
pub async fn load_typed<T: DeserializeOwned>(
    storage: &dyn ConfigStorage,
    name: &str,
) -> Result<Option<T>> {
    let Some(value) = storage.load(name).await? else {
        return Ok(None);
    };

    let parsed = serde_json::from_value(value)
        .with_context(|| format!("failed to deserialize config object {name}"))?;
    Ok(Some(parsed))
}

/// Serialize and save a configuration object.
pub async fn save_typed<T: Serialize>(
    storage: &dyn ConfigStorage,
    name: &str,
    data: &T,
) -> Result<()> {
    let value = serde_json::to_value(data)
        .with_context(|| format!("failed to serialize config object {name}"))?;
    storage.save(name, &value).await
}
