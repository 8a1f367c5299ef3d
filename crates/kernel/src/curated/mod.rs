//! Curated feed of the most recent items per bundle.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::CacheMetadata;
use crate::clock::Clock;
use crate::config_storage::ConfigStorage;
use crate::content::{ContentRepository, ItemFilter};
use crate::search::format_timestamp;
use crate::settings::ApiSettings;

/// Content bundles exposed on the curated feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bundle {
    Insights,
    Strategies,
    Notices,
    Funds,
}

impl Bundle {
    /// Every bundle, in feed order.
    pub const ALL: [Bundle; 4] = [
        Bundle::Insights,
        Bundle::Strategies,
        Bundle::Notices,
        Bundle::Funds,
    ];

    pub fn machine_name(self) -> &'static str {
        match self {
            Bundle::Insights => "insights",
            Bundle::Strategies => "strategies",
            Bundle::Notices => "notices",
            Bundle::Funds => "funds",
        }
    }

    /// Maximum number of items the feed carries for this bundle.
    pub fn limit(self) -> i64 {
        match self {
            Bundle::Insights => 6,
            Bundle::Strategies => 4,
            Bundle::Notices => 3,
            Bundle::Funds => 5,
        }
    }
}

/// One feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedItem {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub created: String,
}

/// The curated feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedFeed {
    /// RFC 3339 generation time.
    pub generated: String,
    pub endpoint: String,
    /// Bundles present on this site, in feed order.
    pub bundles: Vec<String>,
    pub items: BTreeMap<String, Vec<CuratedItem>>,
}

/// Builds the curated feed.
pub struct CuratedService {
    content: Arc<dyn ContentRepository>,
    config: Arc<dyn ConfigStorage>,
    clock: Arc<dyn Clock>,
    site_url: String,
    max_age: u32,
}

impl CuratedService {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        config: Arc<dyn ConfigStorage>,
        clock: Arc<dyn Clock>,
        site_url: impl Into<String>,
        max_age: u32,
    ) -> Self {
        Self {
            content,
            config,
            clock,
            site_url: site_url.into().trim_end_matches('/').to_string(),
            max_age,
        }
    }

    /// Build the feed. Bundles that are not installed are skipped.
    pub async fn feed(&self) -> Result<(CuratedFeed, CacheMetadata)> {
        let settings = ApiSettings::load(self.config.as_ref()).await?;
        let mut metadata = CacheMetadata::new()
            .with_max_age(self.max_age)
            .with_tag(format!("config:{}", crate::config_storage::names::API_SETTINGS));

        let mut bundles = Vec::new();
        let mut items = BTreeMap::new();

        for bundle in Bundle::ALL {
            let name = bundle.machine_name();
            if !self.content.bundle_exists(name).await? {
                debug!(bundle = name, "bundle not installed, skipping");
                continue;
            }

            let stored = self
                .content
                .list(&ItemFilter::published(name), bundle.limit(), 0)
                .await?;

            metadata = metadata
                .with_tag(format!("item_list:{name}"))
                .with_tags(stored.iter().map(|item| format!("item:{}", item.id)));

            let entries = stored
                .into_iter()
                .map(|item| CuratedItem {
                    url: format!("{}/item/{}", self.site_url, item.id),
                    created: format_timestamp(item.created),
                    id: item.id,
                    title: item.title,
                })
                .collect();

            bundles.push(name.to_string());
            items.insert(name.to_string(), entries);
        }

        let endpoint = settings.display_endpoint().to_string();
        let feed = CuratedFeed {
            generated: self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true),
            endpoint,
            bundles,
            items,
        };

        Ok((feed, metadata))
    }

    /// Log one access to the feed when access logging is enabled.
    ///
    /// Runs for every request, including ones served from the response
    /// cache. Returns whether the access was logged.
    pub async fn record_access(&self) -> Result<bool> {
        let settings = ApiSettings::load(self.config.as_ref()).await?;
        if settings.logging_enabled {
            info!(endpoint = %settings.display_endpoint(), "curated feed accessed");
        }
        Ok(settings.logging_enabled)
    }
}

impl std::fmt::Debug for CuratedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CuratedService").finish()
    }
}
