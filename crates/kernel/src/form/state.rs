//! Working state persisted per form build.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock::Clock;

/// Form states untouched for this long are discarded (6 hours).
pub const STATE_TTL_SECS: i64 = 6 * 3600;

/// Fresh identifier for one rendered instance of a form.
pub fn new_build_id() -> String {
    format!("form-{}", Uuid::now_v7().simple())
}

/// State kept between round-trips of one form build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    /// Form ID.
    pub form_id: String,

    /// Form build ID.
    pub form_build_id: String,

    /// Build ID of the enclosing form when this form is nested.
    #[serde(default)]
    pub parent_build_id: Option<String>,

    /// Form key of the session that created this build.
    #[serde(default)]
    pub owner: Option<String>,

    /// Extra state data (e.g. row working copies).
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl FormState {
    /// Create a new form state.
    pub fn new(form_id: impl Into<String>, form_build_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            form_build_id: form_build_id.into(),
            parent_build_id: None,
            owner: None,
            extra: HashMap::new(),
        }
    }

    /// Set the enclosing form's build id.
    pub fn with_parent(mut self, parent_build_id: Option<String>) -> Self {
        self.parent_build_id = parent_build_id.filter(|id| !id.is_empty());
        self
    }

    /// Bind the build to a session's form key.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Whether the session holding `owner` may use this build.
    ///
    /// Builds without an owner were created outside an editor session
    /// (e.g. by an enclosing layout form) and are open to any session.
    pub fn is_usable_by(&self, owner: &str) -> bool {
        self.owner.as_deref().is_none_or(|o| o == owner)
    }
}

/// Storage for form states, keyed by build id.
#[async_trait]
pub trait FormStateStore: Send + Sync {
    /// Load the state of a form build.
    async fn load(&self, form_build_id: &str) -> Result<Option<FormState>>;

    /// Create or replace the state of a form build.
    async fn save(&self, state: &FormState) -> Result<()>;

    /// Delete the state of a form build.
    async fn delete(&self, form_build_id: &str) -> Result<()>;

    /// Remove states not updated since `cutoff` (unix seconds). Returns the count removed.
    async fn cleanup_expired(&self, cutoff: i64) -> Result<u64>;
}

/// PostgreSQL implementation of [`FormStateStore`] on `form_state_cache`.
#[derive(Clone)]
pub struct PgFormStateStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgFormStateStore {
    /// Create a store stamping writes with `clock`, the clock expiry is measured on.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl FormStateStore for PgFormStateStore {
    async fn load(&self, form_build_id: &str) -> Result<Option<FormState>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT state FROM form_state_cache WHERE form_build_id = $1")
                .bind(form_build_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to load form state")?;

        let Some((state_json,)) = row else {
            return Ok(None);
        };

        let state =
            serde_json::from_value(state_json).context("failed to deserialize form state")?;
        Ok(Some(state))
    }

    async fn save(&self, state: &FormState) -> Result<()> {
        let state_json = serde_json::to_value(state).context("failed to serialize form state")?;
        let now = self.clock.timestamp();

        sqlx::query(
            r#"
            INSERT INTO form_state_cache (form_build_id, form_id, state, created, updated)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (form_build_id) DO UPDATE
            SET state = EXCLUDED.state, updated = EXCLUDED.updated
            "#,
        )
        .bind(&state.form_build_id)
        .bind(&state.form_id)
        .bind(&state_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to save form state")?;

        Ok(())
    }

    async fn delete(&self, form_build_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM form_state_cache WHERE form_build_id = $1")
            .bind(form_build_id)
            .execute(&self.pool)
            .await
            .context("failed to delete form state")?;

        Ok(())
    }

    async fn cleanup_expired(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM form_state_cache WHERE updated < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to clean up expired form states")?;

        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for PgFormStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgFormStateStore").finish()
    }
}

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field name (None for form-level errors).
    pub field: Option<String>,

    /// Error message.
    pub message: String,
}

impl ValidationError {
    /// Create a field-level error.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            message: message.into(),
        }
    }

    /// Create a form-level error.
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_form_state_roundtrip_defaults() {
        let state: FormState =
            serde_json::from_str(r#"{"form_id":"rows","form_build_id":"form-1"}"#).unwrap();
        assert_eq!(state.parent_build_id, None);
        assert!(state.extra.is_empty());
    }

    #[test]
    fn test_with_parent_ignores_empty() {
        let state = FormState::new("rows", "b").with_parent(Some(String::new()));
        assert_eq!(state.parent_build_id, None);

        let state = FormState::new("rows", "b").with_parent(Some("outer".into()));
        assert_eq!(state.parent_build_id.as_deref(), Some("outer"));
    }

    #[test]
    fn test_owner_scoping() {
        let open = FormState::new("layout", "outer");
        assert!(open.is_usable_by("session-a"));

        let owned = FormState::new("rows", "b").with_owner("session-a");
        assert!(owned.is_usable_by("session-a"));
        assert!(!owned.is_usable_by("session-b"));

        let legacy: FormState =
            serde_json::from_str(r#"{"form_id":"rows","form_build_id":"form-1"}"#).unwrap();
        assert_eq!(legacy.owner, None);
    }

    #[test]
    fn test_build_ids_are_unique() {
        let a = new_build_id();
        let b = new_build_id();
        assert_ne!(a, b);
        assert!(a.starts_with("form-"));
    }

    #[test]
    fn test_validation_error_constructors() {
        let e = ValidationError::field("endpoint_url", "required");
        assert_eq!(e.field.as_deref(), Some("endpoint_url"));
        assert_eq!(ValidationError::form("boom").field, None);
        assert_eq!(ValidationError::form("boom").to_string(), "boom");
    }
}
