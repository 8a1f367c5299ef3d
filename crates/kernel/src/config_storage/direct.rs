//! Direct database implementation of ConfigStorage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::ConfigStorage;
use crate::db::escape_like;

/// Direct database implementation of ConfigStorage backed by the `config` table.
#[derive(Clone)]
pub struct DirectConfigStorage {
    pool: PgPool,
}

impl DirectConfigStorage {
    /// Create a new DirectConfigStorage with a database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStorage for DirectConfigStorage {
    async fn load(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM config WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load config object")?;

        Ok(data)
    }

    async fn save(&self, name: &str, data: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO config (name, data, changed)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET data = EXCLUDED.data, changed = EXCLUDED.changed
            "#,
        )
        .bind(name)
        .bind(data)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("failed to save config object")?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM config WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("failed to delete config object")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", escape_like(prefix));
        let names = sqlx::query_scalar::<_, String>(
            r"SELECT name FROM config WHERE name LIKE $1 ESCAPE '\' ORDER BY name",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .context("failed to list config objects")?;

        Ok(names)
    }
}

impl std::fmt::Debug for DirectConfigStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConfigStorage").finish()
    }
}
