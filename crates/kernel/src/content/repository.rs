//! Content storage access.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::fields::{SEARCHABLE_FIELDS, text_value};
use crate::db::escape_like;

/// Item row as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredItem {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Content type machine name.
    #[sqlx(rename = "type")]
    pub bundle: String,

    /// Item title.
    pub title: String,

    /// Display name of the owning user ("" when unknown).
    pub author: String,

    /// Publication status (0 = unpublished, 1 = published).
    pub status: i16,

    /// Unix timestamp when created.
    pub created: i64,

    /// Dynamic field storage (JSONB).
    pub fields: serde_json::Value,
}

impl StoredItem {
    /// Check if this item is published.
    pub fn is_published(&self) -> bool {
        self.status == 1
    }
}

/// Selection criteria for item listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFilter {
    /// Bundle to list.
    pub bundle: String,

    /// Case-insensitive substring matched against title and body fields.
    pub keyword: Option<String>,

    /// Restrict to published items.
    pub published_only: bool,
}

impl ItemFilter {
    /// Published items of a bundle.
    pub fn published(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            keyword: None,
            published_only: true,
        }
    }

    /// Add a keyword; blank keywords are ignored.
    pub fn with_keyword(mut self, keyword: &str) -> Self {
        let keyword = keyword.trim();
        self.keyword = (!keyword.is_empty()).then(|| keyword.to_string());
        self
    }

    /// Evaluate the filter against an item in memory.
    ///
    /// Mirrors the SQL predicate used by [`PgContentRepository`].
    pub fn matches(&self, item: &StoredItem) -> bool {
        if item.bundle != self.bundle {
            return false;
        }
        if self.published_only && !item.is_published() {
            return false;
        }
        let Some(keyword) = &self.keyword else {
            return true;
        };

        let needle = keyword.to_lowercase();
        if item.title.to_lowercase().contains(&needle) {
            return true;
        }
        SEARCHABLE_FIELDS
            .iter()
            .filter_map(|name| text_value(&item.fields, name))
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

/// Read access to content items and taxonomy terms.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Whether a content type with this machine name is installed.
    async fn bundle_exists(&self, bundle: &str) -> Result<bool>;

    /// Count items matching the filter.
    async fn count(&self, filter: &ItemFilter) -> Result<i64>;

    /// List matching items newest first (ties broken by id, descending).
    async fn list(&self, filter: &ItemFilter, limit: i64, offset: i64) -> Result<Vec<StoredItem>>;

    /// Look up taxonomy term labels by id. Unknown ids are omitted.
    async fn term_labels(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>>;

    /// Check if the backing store is reachable.
    async fn ping(&self) -> bool;
}

/// PostgreSQL implementation of [`ContentRepository`].
#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    /// Create a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Shared WHERE clause: $1 bundle, $2 published_only, $3 LIKE pattern or NULL.
const FILTER_SQL: &str = r"
    i.type = $1
    AND ($2 = FALSE OR i.status = 1)
    AND (
        $3::text IS NULL
        OR i.title ILIKE $3 ESCAPE '\'
        OR COALESCE(i.fields->'field_body'->>'value', i.fields->>'field_body', '') ILIKE $3 ESCAPE '\'
        OR COALESCE(i.fields->'body'->>'value', i.fields->>'body', '') ILIKE $3 ESCAPE '\'
        OR COALESCE(i.fields->'field_description'->>'value', i.fields->>'field_description', '') ILIKE $3 ESCAPE '\'
    )
";

fn like_pattern(filter: &ItemFilter) -> Option<String> {
    filter
        .keyword
        .as_deref()
        .map(|k| format!("%{}%", escape_like(k)))
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn bundle_exists(&self, bundle: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM item_type WHERE type = $1)")
                .bind(bundle)
                .fetch_one(&self.pool)
                .await
                .context("failed to check content type")?;

        Ok(exists)
    }

    async fn count(&self, filter: &ItemFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM item i WHERE {FILTER_SQL}");
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(&filter.bundle)
            .bind(filter.published_only)
            .bind(like_pattern(filter))
            .fetch_one(&self.pool)
            .await
            .context("failed to count items")?;

        Ok(total)
    }

    async fn list(&self, filter: &ItemFilter, limit: i64, offset: i64) -> Result<Vec<StoredItem>> {
        let sql = format!(
            r#"
            SELECT i.id, i.type, i.title, COALESCE(u.name, '') AS author,
                   i.status, i.created, i.fields
            FROM item i
            LEFT JOIN users u ON u.id = i.author_id
            WHERE {FILTER_SQL}
            ORDER BY i.created DESC, i.id DESC
            LIMIT $4 OFFSET $5
            "#
        );

        let items = sqlx::query_as::<_, StoredItem>(&sql)
            .bind(&filter.bundle)
            .bind(filter.published_only)
            .bind(like_pattern(filter))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("failed to list items")?;

        Ok(items)
    }

    async fn term_labels(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, label FROM tag WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("failed to load tag labels")?;

        Ok(rows.into_iter().collect())
    }

    async fn ping(&self) -> bool {
        crate::db::check_health(&self.pool).await
    }
}

impl std::fmt::Debug for PgContentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgContentRepository").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(title: &str, fields: serde_json::Value) -> StoredItem {
        StoredItem {
            id: Uuid::now_v7(),
            bundle: "insights".to_string(),
            title: title.to_string(),
            author: String::new(),
            status: 1,
            created: 0,
            fields,
        }
    }

    #[test]
    fn test_filter_matches_title_case_insensitively() {
        let filter = ItemFilter::published("insights").with_keyword("GROWTH");
        assert!(filter.matches(&item("Growth outlook", json!({}))));
        assert!(!filter.matches(&item("Rates", json!({}))));
    }

    #[test]
    fn test_filter_matches_body_and_description() {
        let filter = ItemFilter::published("insights").with_keyword("yield");
        assert!(filter.matches(&item("A", json!({"field_body": {"value": "<p>High Yield</p>"}}))));
        assert!(filter.matches(&item("B", json!({"field_description": "yield curve"}))));
        assert!(!filter.matches(&item("C", json!({"field_summary": "yield"}))));
    }

    #[test]
    fn test_filter_blank_keyword_is_ignored() {
        let filter = ItemFilter::published("insights").with_keyword("   ");
        assert_eq!(filter.keyword, None);
        assert!(filter.matches(&item("anything", json!({}))));
    }

    #[test]
    fn test_filter_respects_bundle_and_status() {
        let filter = ItemFilter::published("insights");
        let mut draft = item("Draft", json!({}));
        draft.status = 0;
        assert!(!filter.matches(&draft));

        let mut other = item("Other", json!({}));
        other.bundle = "notices".to_string();
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let filter = ItemFilter::published("insights").with_keyword("50%");
        assert_eq!(like_pattern(&filter).as_deref(), Some(r"%50\%%"));
        assert_eq!(like_pattern(&ItemFilter::published("insights")), None);
    }
}
