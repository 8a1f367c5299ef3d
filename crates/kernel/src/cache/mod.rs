//! Response caching with bubbleable metadata and tag-based invalidation.
//!
//! Every data source that contributes to a response describes how long the
//! result may be cached ([`CacheMetadata::max_age`]), which request inputs it
//! varies by (contexts), and which stored objects it depends on (tags).
//! Metadata is merged upwards so a response carries the union of contexts and
//! tags and the smallest max-age of its parts.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Maximum number of cached responses.
const MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cached responses (5 minutes).
const DEFAULT_TTL_SECS: u64 = 300;

/// Cacheability of a response or response fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetadata {
    /// Seconds the result may be reused. `None` means unbounded.
    pub max_age: Option<u32>,
    /// Request inputs the result varies by, e.g. `url.query_args:q`.
    pub contexts: BTreeSet<String>,
    /// Stored objects the result depends on, e.g. `item:<id>`.
    pub tags: BTreeSet<String>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetadata {
    /// Metadata with no constraints.
    pub fn new() -> Self {
        Self {
            max_age: None,
            contexts: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Bound the max-age; the smaller bound wins.
    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(self.max_age.map_or(seconds, |current| current.min(seconds)));
        self
    }

    /// Add a cache context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.insert(context.into());
        self
    }

    /// Add a cache tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add several cache tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Bubble another source's metadata into this one.
    pub fn merge(mut self, other: &CacheMetadata) -> Self {
        if let Some(age) = other.max_age {
            self = self.with_max_age(age);
        }
        self.contexts.extend(other.contexts.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
        self
    }

    /// Response headers describing this metadata.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let cache_control = match self.max_age {
            Some(0) => "no-cache".to_string(),
            Some(age) => format!("public, max-age={age}"),
            None => format!("public, max-age={DEFAULT_TTL_SECS}"),
        };
        insert_header(&mut headers, "cache-control", &cache_control);

        let contexts = self.contexts.iter().cloned().collect::<Vec<_>>().join(" ");
        if !contexts.is_empty() {
            insert_header(&mut headers, "x-cache-contexts", &contexts);
        }

        let tags = self.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        if !tags.is_empty() {
            insert_header(&mut headers, "x-cache-tags", &tags);
        }

        headers
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => warn!(error = %e, header = name, "skipping unrepresentable cache header"),
    }
}

/// A cached response body and the metadata it was built with.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub body: String,
    pub metadata: CacheMetadata,
}

/// In-process response cache keyed by the resolved cache contexts.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<ResponseCacheInner>,
}

struct ResponseCacheInner {
    entries: Cache<String, CachedEntry>,
    /// Tag → keys that depend on it.
    tag_index: Mutex<HashMap<String, HashSet<String>>>,
}

impl ResponseCache {
    /// Create a cache whose entries live at most `ttl_secs` seconds.
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = if ttl_secs > 0 {
            ttl_secs
        } else {
            DEFAULT_TTL_SECS
        };
        let entries = Cache::builder()
            .max_capacity(MAX_CAPACITY)
            .time_to_live(Duration::from_secs(ttl))
            .build();

        Self {
            inner: Arc::new(ResponseCacheInner {
                entries,
                tag_index: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Build a cache key from a namespace and the values of its contexts.
    pub fn key(namespace: &str, parts: &[(&str, &str)]) -> String {
        let mut key = namespace.to_string();
        for (name, value) in parts {
            key.push('|');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }

    /// Look up a cached entry.
    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        let hit = self.inner.entries.get(key);
        if hit.is_some() {
            debug!(key = %key, "response cache hit");
        }
        hit
    }

    /// Store an entry. Entries with `max_age == Some(0)` are not cached.
    pub fn set(&self, key: &str, entry: CachedEntry) {
        if entry.metadata.max_age == Some(0) {
            return;
        }

        {
            let mut index = self.inner.tag_index.lock();
            for tag in &entry.metadata.tags {
                index
                    .entry(tag.clone())
                    .or_default()
                    .insert(key.to_string());
            }
        }

        debug!(key = %key, tags = ?entry.metadata.tags, "response cache set");
        self.inner.entries.insert(key.to_string(), entry);
    }

    /// Drop every entry that depends on `tag`.
    pub fn invalidate_tag(&self, tag: &str) {
        let keys = self.inner.tag_index.lock().remove(tag).unwrap_or_default();
        for key in &keys {
            self.inner.entries.invalidate(key);
        }
        debug!(tag = %tag, count = keys.len(), "cache tag invalidated");
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").finish()
    }
}
