//! Insights listing and keyword search.
//!
//! Queries published items of the insights bundle newest first, filters by a
//! case-insensitive keyword over title and body, paginates, and derives the
//! per-item summary, theme and read time through the legacy field fallbacks.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cache::CacheMetadata;
use crate::content::fields::{resolve_read_time, resolve_summary, theme_reference};
use crate::content::{ContentRepository, ItemFilter, StoredItem};

/// Bundle served by the search endpoint.
pub const INSIGHTS_BUNDLE: &str = "insights";

/// Default page size.
pub const DEFAULT_LIMIT: i64 = 10;

/// Largest page size a client may request.
pub const MAX_LIMIT: i64 = 50;

/// Normalized search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    /// Trimmed keyword; empty means no filtering.
    pub keyword: String,
    /// Page size in `1..=MAX_LIMIT`.
    pub limit: i64,
    /// Zero-based page index.
    pub page: i64,
}

impl SearchQuery {
    /// Normalize raw request values. Out-of-range numbers are clamped.
    pub fn normalize(keyword: Option<&str>, limit: Option<i64>, page: Option<i64>) -> Self {
        Self {
            keyword: keyword.unwrap_or_default().trim().to_string(),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            page: page.unwrap_or(0).max(0),
        }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.limit)
    }
}

/// Number of pages needed for `total` rows; 0 when `limit` is 0.
pub fn page_count(total: i64, limit: i64) -> i64 {
    if limit <= 0 || total <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// Taxonomy reference of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRef {
    pub id: Option<Uuid>,
    pub label: String,
}

impl ThemeRef {
    /// The "no theme" value.
    pub fn none() -> Self {
        Self {
            id: None,
            label: String::new(),
        }
    }
}

/// Serialized view of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub author: String,
    /// RFC 3339 creation time.
    pub created: String,
    pub url: String,
    pub theme: ThemeRef,
    pub read_time: String,
}

/// Echo of the normalized request plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMeta {
    pub query: String,
    pub limit: i64,
    pub page: i64,
    pub total: i64,
    pub pages: i64,
}

/// Paginated search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEnvelope {
    pub meta: SearchMeta,
    pub data: Vec<ContentItem>,
}

/// Search failures.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The insights content type is not installed.
    #[error("content type '{0}' is not available")]
    BundleMissing(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Insights search service.
pub struct SearchService {
    content: Arc<dyn ContentRepository>,
    site_url: String,
    max_age: u32,
}

impl SearchService {
    /// Create a new search service.
    ///
    /// `site_url` prefixes canonical item URLs; `max_age` bounds how long
    /// responses may be cached.
    pub fn new(content: Arc<dyn ContentRepository>, site_url: impl Into<String>, max_age: u32) -> Self {
        Self {
            content,
            site_url: site_url.into().trim_end_matches('/').to_string(),
            max_age,
        }
    }

    /// Cache metadata shared by every search response before items are known.
    pub fn base_cache_metadata(&self) -> CacheMetadata {
        CacheMetadata::new()
            .with_max_age(self.max_age)
            .with_context("url.query_args:q")
            .with_context("url.query_args:limit")
            .with_context("url.query_args:page")
            .with_tag(format!("item_list:{INSIGHTS_BUNDLE}"))
    }

    /// Run a search.
    pub async fn search(
        &self,
        query: &SearchQuery,
    ) -> Result<(SearchResultEnvelope, CacheMetadata), SearchError> {
        if !self.content.bundle_exists(INSIGHTS_BUNDLE).await? {
            return Err(SearchError::BundleMissing(INSIGHTS_BUNDLE.to_string()));
        }

        let filter = ItemFilter::published(INSIGHTS_BUNDLE).with_keyword(&query.keyword);

        let total = self.content.count(&filter).await?;
        let items = self
            .content
            .list(&filter, query.limit, query.offset())
            .await?;

        let data = self.to_content_items(items).await?;

        debug!(
            query = %query.keyword,
            total = total,
            returned = data.len(),
            "insights search completed"
        );

        let metadata = self
            .base_cache_metadata()
            .with_tags(data.iter().map(|item| format!("item:{}", item.id)));

        let envelope = SearchResultEnvelope {
            meta: SearchMeta {
                query: query.keyword.clone(),
                limit: query.limit,
                page: query.page,
                total,
                pages: page_count(total, query.limit),
            },
            data,
        };

        Ok((envelope, metadata))
    }

    /// Derive the serialized view for a page of stored items.
    async fn to_content_items(&self, items: Vec<StoredItem>) -> Result<Vec<ContentItem>> {
        let theme_ids: Vec<Uuid> = items
            .iter()
            .filter_map(|item| theme_reference(&item.fields))
            .collect();
        let labels = self.content.term_labels(&theme_ids).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let theme = match theme_reference(&item.fields) {
                    Some(id) => ThemeRef {
                        id: Some(id),
                        label: labels.get(&id).cloned().unwrap_or_default(),
                    },
                    None => ThemeRef::none(),
                };

                ContentItem {
                    summary: resolve_summary(&item.fields),
                    read_time: resolve_read_time(&item.fields),
                    created: format_timestamp(item.created),
                    url: format!("{}/item/{}", self.site_url, item.id),
                    id: item.id,
                    title: item.title,
                    author: item.author,
                    theme,
                }
            })
            .collect())
    }
}

/// Format a unix timestamp as RFC 3339 (UTC); "" when out of range.
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService").finish()
    }
}
