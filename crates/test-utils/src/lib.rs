//! Meridian test utilities.
//!
//! In-memory implementations of the kernel's storage traits, a fixed clock,
//! and fixture builders for items and managed files. Integration tests build
//! an `AppState` from [`test_state_parts`] instead of a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use meridian_kernel::StateParts;
use meridian_kernel::clock::Clock;
use meridian_kernel::config_storage::ConfigStorage;
use meridian_kernel::content::{ContentRepository, ItemFilter, StoredItem};
use meridian_kernel::file::{FileRecord, FileRepository, FileStatus, LocalFileStorage};
use meridian_kernel::form::{FormState, FormStateStore};
use meridian_kernel::theme::ThemeEngine;

/// Timestamp every fixture clock starts at (2024-03-01T12:00:00Z).
pub const FIXED_TIMESTAMP: i64 = 1_709_294_400;

/// Site URL used by [`test_state_parts`].
pub const TEST_SITE_URL: &str = "https://www.example.com";

/// Public files URL used by [`test_state_parts`].
pub const TEST_FILES_URL: &str = "/files";

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<i64>,
}

impl FixedClock {
    pub fn new(timestamp: i64) -> Self {
        Self {
            now: RwLock::new(timestamp),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: i64) {
        *self.now.write() += seconds;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(FIXED_TIMESTAMP)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(*self.now.read(), 0)
            .single()
            .unwrap_or_default()
    }
}

/// In-memory content repository.
#[derive(Debug, Default)]
pub struct MemoryContentRepository {
    bundles: RwLock<HashSet<String>>,
    items: RwLock<Vec<StoredItem>>,
    tags: RwLock<HashMap<Uuid, String>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a content type.
    pub fn add_bundle(&self, bundle: &str) {
        self.bundles.write().insert(bundle.to_string());
    }

    /// Store an item, installing its bundle if needed.
    pub fn add_item(&self, item: StoredItem) {
        self.add_bundle(&item.bundle);
        self.items.write().push(item);
    }

    /// Store a taxonomy term.
    pub fn add_tag(&self, id: Uuid, label: &str) {
        self.tags.write().insert(id, label.to_string());
    }

    fn matching(&self, filter: &ItemFilter) -> Vec<StoredItem> {
        let mut items: Vec<StoredItem> = self
            .items
            .read()
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        items
    }
}

#[async_trait]
impl ContentRepository for MemoryContentRepository {
    async fn bundle_exists(&self, bundle: &str) -> Result<bool> {
        Ok(self.bundles.read().contains(bundle))
    }

    async fn count(&self, filter: &ItemFilter) -> Result<i64> {
        Ok(self.matching(filter).len() as i64)
    }

    async fn list(&self, filter: &ItemFilter, limit: i64, offset: i64) -> Result<Vec<StoredItem>> {
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self.matching(filter).into_iter().skip(skip).take(take).collect())
    }

    async fn term_labels(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        let tags = self.tags.read();
        Ok(ids
            .iter()
            .filter_map(|id| tags.get(id).map(|label| (*id, label.clone())))
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// In-memory configuration storage.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    objects: RwLock<BTreeMap<String, JsonValue>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an object synchronously, for assertions.
    pub fn get(&self, name: &str) -> Option<JsonValue> {
        self.objects.read().get(name).cloned()
    }

    /// Write an object synchronously, for fixtures.
    pub fn put(&self, name: &str, data: JsonValue) {
        self.objects.write().insert(name.to_string(), data);
    }
}

#[async_trait]
impl ConfigStorage for MemoryConfigStorage {
    async fn load(&self, name: &str) -> Result<Option<JsonValue>> {
        Ok(self.get(name))
    }

    async fn save(&self, name: &str, data: &JsonValue) -> Result<()> {
        self.put(name, data.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.objects.write().remove(name).is_some())
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// In-memory form state store, tracking last-write time per build.
pub struct MemoryFormStateStore {
    states: RwLock<HashMap<String, (FormState, i64)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryFormStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Read a state synchronously, for assertions.
    pub fn get(&self, form_build_id: &str) -> Option<FormState> {
        self.states
            .read()
            .get(form_build_id)
            .map(|(state, _)| state.clone())
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[async_trait]
impl FormStateStore for MemoryFormStateStore {
    async fn load(&self, form_build_id: &str) -> Result<Option<FormState>> {
        Ok(self.get(form_build_id))
    }

    async fn save(&self, state: &FormState) -> Result<()> {
        let now = self.clock.timestamp();
        self.states
            .write()
            .insert(state.form_build_id.clone(), (state.clone(), now));
        Ok(())
    }

    async fn delete(&self, form_build_id: &str) -> Result<()> {
        self.states.write().remove(form_build_id);
        Ok(())
    }

    async fn cleanup_expired(&self, cutoff: i64) -> Result<u64> {
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|_, (_, updated)| *updated >= cutoff);
        Ok((before - states.len()) as u64)
    }
}

/// In-memory managed file repository with save counting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryFileRepository {
    files: RwLock<HashMap<i64, FileRecord>>,
    saves: AtomicUsize,
    fail_saves: RwLock<bool>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, file: FileRecord) {
        self.files.write().insert(file.fid, file);
    }

    pub fn get(&self, fid: i64) -> Option<FileRecord> {
        self.files.read().get(&fid).cloned()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail.
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.write() = fail;
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn load(&self, fid: i64) -> Result<Option<FileRecord>> {
        Ok(self.get(fid))
    }

    async fn save(&self, file: &FileRecord) -> Result<()> {
        if *self.fail_saves.read() {
            bail!("storage unavailable");
        }
        let mut files = self.files.write();
        if !files.contains_key(&file.fid) {
            bail!("file {} no longer exists", file.fid);
        }
        files.insert(file.fid, file.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Create a test item with default values: published, created at
/// [`FIXED_TIMESTAMP`], no fields.
pub fn test_item(bundle: &str, title: &str) -> TestItem {
    TestItem {
        id: Uuid::now_v7(),
        bundle: bundle.to_string(),
        title: title.to_string(),
        author: String::new(),
        status: 1,
        created: FIXED_TIMESTAMP,
        fields: serde_json::json!({}),
    }
}

/// A test item builder.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub id: Uuid,
    pub bundle: String,
    pub title: String,
    pub author: String,
    pub status: i16,
    pub created: i64,
    pub fields: JsonValue,
}

impl TestItem {
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    pub fn created(mut self, timestamp: i64) -> Self {
        self.created = timestamp;
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.status = 0;
        self
    }

    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        if let Some(obj) = self.fields.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    /// Add a formatted text field.
    pub fn with_text_field(self, name: &str, value: &str) -> Self {
        self.with_field(
            name,
            serde_json::json!({
                "value": value,
                "format": "basic_html"
            }),
        )
    }

    pub fn build(self) -> StoredItem {
        StoredItem {
            id: self.id,
            bundle: self.bundle,
            title: self.title,
            author: self.author,
            status: self.status,
            created: self.created,
            fields: self.fields,
        }
    }
}

/// A temporary managed file at `public://<filename>`.
pub fn temporary_file(fid: i64, filename: &str) -> FileRecord {
    FileRecord {
        fid,
        owner_id: None,
        filename: filename.to_string(),
        uri: format!("public://{filename}"),
        filemime: "image/png".to_string(),
        filesize: 1024,
        status: FileStatus::Temporary,
        created: FIXED_TIMESTAMP,
        changed: FIXED_TIMESTAMP,
    }
}

/// Handles to the in-memory collaborators behind a test state.
#[derive(Clone)]
pub struct TestBackends {
    pub content: Arc<MemoryContentRepository>,
    pub config: Arc<MemoryConfigStorage>,
    pub forms: Arc<MemoryFormStateStore>,
    pub files: Arc<MemoryFileRepository>,
    pub clock: Arc<FixedClock>,
}

impl TestBackends {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::default());
        Self {
            content: Arc::new(MemoryContentRepository::new()),
            config: Arc::new(MemoryConfigStorage::new()),
            forms: Arc::new(MemoryFormStateStore::new(clock.clone())),
            files: Arc::new(MemoryFileRepository::new()),
            clock,
        }
    }
}

impl Default for TestBackends {
    fn default() -> Self {
        Self::new()
    }
}

/// State parts wired to `backends`, using the built-in templates.
pub fn test_state_parts(backends: &TestBackends) -> Result<StateParts> {
    Ok(StateParts {
        content: backends.content.clone(),
        config_storage: backends.config.clone(),
        form_states: backends.forms.clone(),
        files: backends.files.clone(),
        file_storage: Arc::new(LocalFileStorage::new("/tmp/meridian-files", TEST_FILES_URL)),
        clock: backends.clock.clone(),
        theme: ThemeEngine::new()?,
        site_url: TEST_SITE_URL.to_string(),
        cache_max_age: 300,
    })
}
