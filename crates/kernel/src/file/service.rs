//! Managed file records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// File status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum FileStatus {
    /// Temporary upload, removable by cleanup.
    Temporary = 0,
    /// Permanent file, referenced by saved configuration.
    Permanent = 1,
}

impl From<i16> for FileStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => FileStatus::Permanent,
            _ => FileStatus::Temporary,
        }
    }
}

/// A managed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub fid: i64,
    pub owner_id: Option<Uuid>,
    pub filename: String,
    /// Storage URI, e.g. `public://team/ceo.png`.
    pub uri: String,
    pub filemime: String,
    pub filesize: i64,
    pub status: FileStatus,
    pub created: i64,
    pub changed: i64,
}

impl FileRecord {
    pub fn is_permanent(&self) -> bool {
        self.status == FileStatus::Permanent
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    fid: i64,
    owner_id: Option<Uuid>,
    filename: String,
    uri: String,
    filemime: String,
    filesize: i64,
    status: i16,
    created: i64,
    changed: i64,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            fid: row.fid,
            owner_id: row.owner_id,
            filename: row.filename,
            uri: row.uri,
            filemime: row.filemime,
            filesize: row.filesize,
            status: FileStatus::from(row.status),
            created: row.created,
            changed: row.changed,
        }
    }
}

/// Load and persist managed file records.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Load a file by id.
    async fn load(&self, fid: i64) -> Result<Option<FileRecord>>;

    /// Persist status and timestamps of an existing file.
    async fn save(&self, file: &FileRecord) -> Result<()>;
}

/// PostgreSQL implementation of [`FileRepository`] on `file_managed`.
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn load(&self, fid: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT fid, owner_id, filename, uri, filemime, filesize, status, created, changed
            FROM file_managed
            WHERE fid = $1
            "#,
        )
        .bind(fid)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load file")?;

        Ok(row.map(FileRecord::from))
    }

    async fn save(&self, file: &FileRecord) -> Result<()> {
        let result = sqlx::query("UPDATE file_managed SET status = $1, changed = $2 WHERE fid = $3")
            .bind(file.status as i16)
            .bind(file.changed)
            .bind(file.fid)
            .execute(&self.pool)
            .await
            .context("failed to update file")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("file {} no longer exists", file.fid);
        }
        Ok(())
    }
}

impl std::fmt::Debug for PgFileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgFileRepository").finish()
    }
}
