//! Row editor service: working copies, saving and widget configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::machine::{Phase, RowEvent, RowSource, WorkingCopy, resolve_rows};
use super::rows::{FieldKind, Row, Widget, normalize_rows, pending_fid};
use super::submitted::{EditorOp, Submission};
use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::config_storage::{ConfigStorage, names, save_typed};
use crate::file::{AssetPromoter, PromotedAsset, PromotionError};
use crate::form::{
    AjaxRequest, FormState, FormStateStore, STATE_TTL_SECS, ValidationError, new_build_id,
};

/// Form id of the row editor.
pub const FORM_ID: &str = "row_editor";

/// Form id given to outer form states created by mirroring.
pub const PARENT_FORM_ID: &str = "layout_editor";

/// Key of a block's working copy inside [`FormState::extra`].
pub fn state_key(block_id: &str) -> String {
    format!("rows:{block_id}")
}

/// Cache tag of a rendered block.
pub fn block_cache_tag(block_id: &str) -> String {
    format!("block:{block_id}")
}

/// Persisted configuration of a widget block (`block.<id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub widget: Widget,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Raw stored shape, including the legacy serialized-rows fallback.
#[derive(Debug, Deserialize)]
struct StoredBlock {
    widget: Option<Widget>,
    #[serde(default)]
    label: String,
    rows: Option<Vec<Row>>,
    serialized_rows: Option<String>,
}

/// Editor failures that are not validation messages.
#[derive(Debug, Error)]
pub enum EditorError {
    /// No configuration exists and no widget type was given.
    #[error("unknown block '{0}'")]
    UnknownBlock(String),

    /// The form build this request refers to is gone.
    #[error("form has expired, reload the page")]
    ExpiredForm,

    /// The form build was opened by another session.
    #[error("form belongs to another session")]
    ForeignForm,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Everything needed to render the editor after a request.
#[derive(Debug, Clone, Serialize)]
pub struct EditorView {
    pub block_id: String,
    pub widget: Widget,
    pub label: String,
    pub form_build_id: String,
    pub parent_build_id: Option<String>,
    pub phase: Phase,
    pub source: RowSource,
    pub rows: Vec<Row>,
    pub errors: Vec<ValidationError>,
}

impl EditorView {
    pub fn saved(&self) -> bool {
        self.phase == Phase::Saved
    }
}

enum SaveOutcome {
    Saved(Vec<Row>),
    Rejected(ValidationError),
}

/// Row editor service.
pub struct RowEditorService {
    config: Arc<dyn ConfigStorage>,
    forms: Arc<dyn FormStateStore>,
    promoter: Arc<AssetPromoter>,
    cache: ResponseCache,
    clock: Arc<dyn Clock>,
}

impl RowEditorService {
    pub fn new(
        config: Arc<dyn ConfigStorage>,
        forms: Arc<dyn FormStateStore>,
        promoter: Arc<AssetPromoter>,
        cache: ResponseCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            forms,
            promoter,
            cache,
            clock,
        }
    }

    async fn read_block(&self, block_id: &str) -> Result<Option<StoredBlock>> {
        let Some(value) = self.config.load(&names::block(block_id)).await? else {
            return Ok(None);
        };
        let stored = serde_json::from_value(value)
            .with_context(|| format!("invalid configuration for block {block_id}"))?;
        Ok(Some(stored))
    }

    fn stored_rows(block_id: &str, stored: &StoredBlock) -> Vec<Row> {
        if let Some(rows) = &stored.rows {
            return rows.clone();
        }
        let Some(text) = stored.serialized_rows.as_deref() else {
            return Vec::new();
        };
        match serde_json::from_str(text) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(block_id = %block_id, error = %e, "unreadable serialized rows, starting empty");
                Vec::new()
            }
        }
    }

    /// Persisted configuration of a block, with legacy rows resolved.
    pub async fn block(&self, block_id: &str) -> Result<Option<BlockConfig>> {
        let Some(stored) = self.read_block(block_id).await? else {
            return Ok(None);
        };
        let Some(widget) = stored.widget else {
            return Ok(None);
        };
        Ok(Some(BlockConfig {
            widget,
            label: stored.label.clone(),
            rows: Self::stored_rows(block_id, &stored),
        }))
    }

    async fn resolve_block(
        &self,
        block_id: &str,
        widget_hint: Option<Widget>,
    ) -> Result<BlockConfig, EditorError> {
        let stored = self.read_block(block_id).await?;
        let widget = stored
            .as_ref()
            .and_then(|s| s.widget)
            .or(widget_hint)
            .ok_or_else(|| EditorError::UnknownBlock(block_id.to_string()))?;

        Ok(match stored {
            Some(stored) => BlockConfig {
                widget,
                rows: Self::stored_rows(block_id, &stored),
                label: stored.label,
            },
            None => BlockConfig {
                widget,
                label: String::new(),
                rows: Vec::new(),
            },
        })
    }

    fn working_copy(state: &FormState, block_id: &str) -> Option<WorkingCopy> {
        let value = state.extra.get(&state_key(block_id))?;
        match serde_json::from_value(value.clone()) {
            Ok(copy) => Some(copy),
            Err(e) => {
                warn!(
                    form_build_id = %state.form_build_id,
                    error = %e,
                    "discarding unreadable working copy"
                );
                None
            }
        }
    }

    async fn parent_copy(
        &self,
        parent_build_id: Option<&str>,
        block_id: &str,
        owner: &str,
    ) -> Result<Option<WorkingCopy>> {
        let Some(parent_id) = parent_build_id else {
            return Ok(None);
        };
        Ok(self
            .forms
            .load(parent_id)
            .await?
            .filter(|state| state.is_usable_by(owner))
            .and_then(|state| Self::working_copy(&state, block_id)))
    }

    /// Write the working copy to the form state and mirror it into the parent.
    async fn store(
        &self,
        own: Option<FormState>,
        form_build_id: &str,
        parent_build_id: Option<&str>,
        block_id: &str,
        working: &WorkingCopy,
        owner: &str,
    ) -> Result<()> {
        let key = state_key(block_id);
        let value = serde_json::to_value(working).context("failed to serialize working copy")?;

        let mut state = own
            .unwrap_or_else(|| FormState::new(FORM_ID, form_build_id).with_owner(owner))
            .with_parent(parent_build_id.map(str::to_string));
        state.extra.insert(key.clone(), value.clone());
        self.forms.save(&state).await?;

        if let Some(parent_id) = parent_build_id {
            let mut parent = match self.forms.load(parent_id).await? {
                Some(parent) if !parent.is_usable_by(owner) => {
                    warn!(parent_build_id = %parent_id, "not mirroring into another session's form");
                    return Ok(());
                }
                Some(parent) => parent,
                None => FormState::new(PARENT_FORM_ID, parent_id).with_owner(owner),
            };
            parent.extra.insert(key, value);
            self.forms.save(&parent).await?;
        }

        Ok(())
    }

    /// Start an editing session for a block.
    ///
    /// `owner` is the session form key the new build is bound to.
    pub async fn open(
        &self,
        block_id: &str,
        widget_hint: Option<Widget>,
        parent_build_id: Option<String>,
        owner: &str,
    ) -> Result<EditorView, EditorError> {
        let block = self.resolve_block(block_id, widget_hint).await?;
        let parent_build_id = parent_build_id.filter(|id| !id.is_empty());
        let parent = self
            .parent_copy(parent_build_id.as_deref(), block_id, owner)
            .await?;

        let (working, source) = resolve_rows(None, parent, None, || block.rows.clone());
        let form_build_id = new_build_id();
        self.store(
            None,
            &form_build_id,
            parent_build_id.as_deref(),
            block_id,
            &working,
            owner,
        )
        .await?;

        debug!(block_id = %block_id, source = ?source, rows = working.rows.len(), "row editor opened");

        Ok(EditorView {
            block_id: block_id.to_string(),
            widget: block.widget,
            label: display_label(&block),
            form_build_id,
            parent_build_id,
            phase: working.phase,
            source,
            rows: working.rows,
            errors: Vec::new(),
        })
    }

    /// Handle a regular form submission.
    pub async fn submit(
        &self,
        block_id: &str,
        widget_hint: Option<Widget>,
        pairs: Vec<(String, String)>,
        owner: &str,
    ) -> Result<EditorView, EditorError> {
        let block = self.resolve_block(block_id, widget_hint).await?;
        let submission = Submission::from_pairs(block.widget, pairs);
        self.run(block_id, block, submission, owner).await
    }

    /// Handle an AJAX callback.
    ///
    /// The form build must still exist and belong to `owner`. Callbacks only
    /// rebuild the working copy; saving needs a full form submission.
    pub async fn ajax(
        &self,
        block_id: &str,
        widget_hint: Option<Widget>,
        request: AjaxRequest,
        owner: &str,
    ) -> Result<EditorView, EditorError> {
        let Some(state) = self.forms.load(&request.form_build_id).await? else {
            return Err(EditorError::ExpiredForm);
        };
        if !state.is_usable_by(owner) {
            return Err(EditorError::ForeignForm);
        }

        let block = self.resolve_block(block_id, widget_hint).await?;
        let mut submission = Submission::from_values(block.widget, &request.values);
        submission.op = Some(request.trigger);
        submission.form_build_id = Some(request.form_build_id);
        if submission.operation().map_err(EditorError::InvalidRequest)? == Some(EditorOp::Save) {
            return Err(EditorError::InvalidRequest(
                "saving requires a full form submission".to_string(),
            ));
        }
        self.run(block_id, block, submission, owner).await
    }

    async fn run(
        &self,
        block_id: &str,
        block: BlockConfig,
        submission: Submission,
        owner: &str,
    ) -> Result<EditorView, EditorError> {
        let op = submission.operation().map_err(EditorError::InvalidRequest)?;
        let form_build_id = submission
            .form_build_id
            .clone()
            .ok_or_else(|| EditorError::InvalidRequest("missing form_build_id".to_string()))?;
        let widget = block.widget;

        let own = self.forms.load(&form_build_id).await?;
        if own.as_ref().is_some_and(|state| !state.is_usable_by(owner)) {
            return Err(EditorError::ForeignForm);
        }
        let parent_build_id = submission
            .parent_build_id
            .clone()
            .or_else(|| own.as_ref().and_then(|s| s.parent_build_id.clone()));

        let own_copy = own
            .as_ref()
            .and_then(|state| Self::working_copy(state, block_id));
        let parent_copy = if own_copy.is_none() {
            self.parent_copy(parent_build_id.as_deref(), block_id, owner)
                .await?
        } else {
            None
        };

        let (mut working, source) = resolve_rows(
            own_copy,
            parent_copy,
            submission.rows.as_ref().map(|rows| rows.values().cloned().collect()),
            || block.rows.clone(),
        );
        // Keep in-progress edits when the rows came from a stored copy
        if source != RowSource::Submitted {
            if let Some(rows) = &submission.rows {
                working.merge_submitted(rows);
            }
        }

        let label = submission
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| block.label.clone());

        let mut errors = Vec::new();
        working = match op {
            None => working,
            Some(EditorOp::AddRow) => working.apply(widget, RowEvent::AddRow),
            Some(EditorOp::RemoveRow(index)) => working.apply(widget, RowEvent::RemoveRow(index)),
            Some(EditorOp::RemoveSelected) => working.apply(widget, RowEvent::RemoveSelected),
            Some(EditorOp::Save) => {
                match self
                    .save_rows(block_id, widget, &label, working.rows.clone())
                    .await?
                {
                    SaveOutcome::Saved(rows) => working.apply(widget, RowEvent::Saved(rows)),
                    SaveOutcome::Rejected(error) => {
                        errors.push(error);
                        working
                    }
                }
            }
        };

        let phase = working.phase;
        let working = working.reset();
        self.store(
            own,
            &form_build_id,
            parent_build_id.as_deref(),
            block_id,
            &working,
            owner,
        )
        .await?;

        let display = if label.is_empty() {
            widget.label().to_string()
        } else {
            label
        };

        Ok(EditorView {
            block_id: block_id.to_string(),
            widget,
            label: display,
            form_build_id,
            parent_build_id,
            phase,
            source,
            rows: working.rows,
            errors,
        })
    }

    /// Normalize, promote and persist rows.
    async fn save_rows(
        &self,
        block_id: &str,
        widget: Widget,
        label: &str,
        rows: Vec<Row>,
    ) -> Result<SaveOutcome> {
        let mut rows = normalize_rows(widget, rows);

        for row in &mut rows {
            if let Err(e) = self.promote_images(widget, row).await {
                warn!(block_id = %block_id, code = e.code, error = %e, "save aborted by failed image promotion");
                return Ok(SaveOutcome::Rejected(ValidationError::form(format!(
                    "An image could not be saved: {e}"
                ))));
            }
        }

        let config = BlockConfig {
            widget,
            label: label.to_string(),
            rows,
        };
        save_typed(self.config.as_ref(), &names::block(block_id), &config).await?;
        self.cache.invalidate_tag(&block_cache_tag(block_id));

        info!(block_id = %block_id, widget = %widget, rows = config.rows.len(), "block rows saved");
        Ok(SaveOutcome::Saved(config.rows))
    }

    async fn promote_images(&self, widget: Widget, row: &mut Row) -> Result<(), PromotionError> {
        if widget == Widget::Cards {
            let desktop = pending_fid(row.values.get("image"));
            let mobile = pending_fid(row.values.get("image_mobile"));
            if desktop.is_some() || mobile.is_some() {
                let pair = self.promoter.promote_pair(desktop, mobile).await?;
                fill_slot(row, "image", desktop.is_some(), pair.desktop);
                fill_slot(row, "image_mobile", mobile.is_some(), pair.mobile);
            }
            mirror_slots(row, "image", "image_mobile");
            return Ok(());
        }

        for spec in widget.fields().iter().filter(|f| f.kind == FieldKind::Image) {
            if let Some(fid) = pending_fid(row.values.get(spec.name)) {
                let asset = self.promoter.promote(fid).await?;
                row.set(spec.name, asset.url);
            }
        }
        Ok(())
    }

    /// Drop form states older than the retention window.
    pub async fn purge_expired_states(&self) -> Result<u64> {
        let cutoff = self.clock.timestamp() - STATE_TTL_SECS;
        let removed = self.forms.cleanup_expired(cutoff).await?;
        if removed > 0 {
            info!(removed = removed, "expired form states removed");
        }
        Ok(removed)
    }
}

/// Write a promoted URL into an image slot.
///
/// Pending slots take their own URL; empty slots take the mirrored one;
/// slots that already hold a URL are left alone.
fn fill_slot(row: &mut Row, field: &str, was_pending: bool, asset: Option<PromotedAsset>) {
    let Some(asset) = asset else {
        return;
    };
    if was_pending || row.text(field).is_empty() {
        row.set(field, asset.url);
    }
}

/// Copy whichever of two image slots has content into the empty one.
fn mirror_slots(row: &mut Row, first: &str, second: &str) {
    let (a, b) = (row.text(first), row.text(second));
    if a.is_empty() && !b.is_empty() {
        row.set(first, b);
    } else if b.is_empty() && !a.is_empty() {
        row.set(second, a);
    }
}

fn display_label(block: &BlockConfig) -> String {
    if block.label.is_empty() {
        block.widget.label().to_string()
    } else {
        block.label.clone()
    }
}

impl std::fmt::Debug for RowEditorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowEditorService").finish()
    }
}
