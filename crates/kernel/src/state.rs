//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cache::ResponseCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::config_storage::{ConfigStorage, DirectConfigStorage};
use crate::content::{ContentRepository, PgContentRepository};
use crate::curated::CuratedService;
use crate::db;
use crate::editor::RowEditorService;
use crate::file::{AssetPromoter, FileRepository, FileStorage, LocalFileStorage, PgFileRepository};
use crate::form::{FormStateStore, PgFormStateStore};
use crate::search::SearchService;
use crate::theme::ThemeEngine;

/// Collaborators the services are built from.
pub struct StateParts {
    pub content: Arc<dyn ContentRepository>,
    pub config_storage: Arc<dyn ConfigStorage>,
    pub form_states: Arc<dyn FormStateStore>,
    pub files: Arc<dyn FileRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub clock: Arc<dyn Clock>,
    pub theme: ThemeEngine,
    /// Public site URL, without trailing slash.
    pub site_url: String,
    /// Max-age advertised on cacheable API responses.
    pub cache_max_age: u32,
}

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    content: Arc<dyn ContentRepository>,
    config_storage: Arc<dyn ConfigStorage>,
    search: SearchService,
    curated: CuratedService,
    editor: RowEditorService,
    promoter: Arc<AssetPromoter>,
    theme: ThemeEngine,
    cache: ResponseCache,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations and build the services.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        db::run_migrations(&pool).await?;
        info!("database migrations applied");

        let theme = match &config.templates_dir {
            Some(dir) => ThemeEngine::with_overrides(dir)?,
            None => ThemeEngine::new()?,
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self::from_parts(StateParts {
            content: Arc::new(PgContentRepository::new(pool.clone())),
            config_storage: Arc::new(DirectConfigStorage::new(pool.clone())),
            form_states: Arc::new(PgFormStateStore::new(pool.clone(), clock.clone())),
            files: Arc::new(PgFileRepository::new(pool)),
            file_storage: Arc::new(LocalFileStorage::new(
                config.uploads_dir.clone(),
                config.files_url.clone(),
            )),
            clock,
            theme,
            site_url: config.site_url.clone(),
            cache_max_age: config.search_cache_max_age,
        }))
    }

    /// Build the state from explicit collaborators.
    pub fn from_parts(parts: StateParts) -> Self {
        let cache = ResponseCache::new(u64::from(parts.cache_max_age));
        let promoter = Arc::new(AssetPromoter::new(
            parts.files,
            parts.file_storage,
            parts.clock.clone(),
        ));

        let search = SearchService::new(
            parts.content.clone(),
            parts.site_url.clone(),
            parts.cache_max_age,
        );
        let curated = CuratedService::new(
            parts.content.clone(),
            parts.config_storage.clone(),
            parts.clock.clone(),
            parts.site_url,
            parts.cache_max_age,
        );
        let editor = RowEditorService::new(
            parts.config_storage.clone(),
            parts.form_states,
            promoter.clone(),
            cache.clone(),
            parts.clock,
        );

        Self {
            inner: Arc::new(AppStateInner {
                content: parts.content,
                config_storage: parts.config_storage,
                search,
                curated,
                editor,
                promoter,
                theme: parts.theme,
                cache,
            }),
        }
    }

    /// Check if the content store is reachable.
    pub async fn postgres_healthy(&self) -> bool {
        self.inner.content.ping().await
    }

    pub fn config_storage(&self) -> &Arc<dyn ConfigStorage> {
        &self.inner.config_storage
    }

    pub fn search(&self) -> &SearchService {
        &self.inner.search
    }

    pub fn curated(&self) -> &CuratedService {
        &self.inner.curated
    }

    pub fn editor(&self) -> &RowEditorService {
        &self.inner.editor
    }

    pub fn promoter(&self) -> &Arc<AssetPromoter> {
        &self.inner.promoter
    }

    pub fn theme(&self) -> &ThemeEngine {
        &self.inner.theme
    }

    /// In-process response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
