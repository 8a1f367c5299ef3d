//! Admin editor for widget row collections (executives, map pins, cards).
//!
//! Rows survive several round-trips (add, remove, AJAX rebuilds) as a working
//! copy in the form state before a save flushes them to the block's
//! configuration object.

pub mod machine;
pub mod rows;
mod service;
pub mod submitted;

pub use machine::{Phase, RowEvent, RowSource, WorkingCopy, resolve_rows};
pub use rows::{FieldKind, FieldSpec, Row, Widget, normalize_rows};
pub use service::{
    BlockConfig, EditorError, EditorView, FORM_ID, PARENT_FORM_ID, RowEditorService,
    block_cache_tag, state_key,
};
pub use submitted::{EditorOp, Submission};
