//! Working-copy state machine of the row editor.
//!
//! ```text
//! Initial --add/remove/edit--> Editing --save--> Saved --reset--> Initial
//! ```
//!
//! A working copy lives in the form state of one form build. When the editor
//! is nested inside an outer (layout) form, the copy is mirrored into the
//! outer form's state as well so either build can resume it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rows::{Row, Widget};

/// Editing phase of a working copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Matches the persisted collection.
    #[default]
    Initial,
    /// Diverges from the persisted collection.
    Editing,
    /// Just flushed to storage.
    Saved,
}

/// Where the rows of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Own,
    Parent,
    Submitted,
    Persisted,
}

/// Transitions of a working copy.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    AddRow,
    RemoveRow(usize),
    RemoveSelected,
    /// Persisted; carries the rows as stored.
    Saved(Vec<Row>),
}

/// In-progress row collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingCopy {
    pub phase: Phase,
    pub rows: Vec<Row>,
}

impl WorkingCopy {
    /// Copy of the persisted rows.
    pub fn snapshot(rows: Vec<Row>) -> Self {
        Self {
            phase: Phase::Initial,
            rows,
        }
    }

    /// Overlay submitted values onto the rows still present, by row index.
    ///
    /// Indices beyond the working copy are ignored.
    pub fn merge_submitted(&mut self, submitted: &BTreeMap<usize, Row>) {
        let mut changed = false;
        for (index, incoming) in submitted {
            let Some(row) = self.rows.get_mut(*index) else {
                continue;
            };
            for (name, value) in &incoming.values {
                if row.values.get(name) != Some(value) {
                    row.values.insert(name.clone(), value.clone());
                    changed = true;
                }
            }
            if row.remove != incoming.remove {
                row.remove = incoming.remove;
                changed = true;
            }
        }
        if changed && self.phase == Phase::Initial {
            self.phase = Phase::Editing;
        }
    }

    /// Apply a transition.
    pub fn apply(mut self, widget: Widget, event: RowEvent) -> Self {
        match event {
            RowEvent::AddRow => {
                self.rows.push(Row::blank(widget));
                self.phase = Phase::Editing;
            }
            RowEvent::RemoveRow(index) => {
                if index < self.rows.len() {
                    self.rows.remove(index);
                    self.phase = Phase::Editing;
                }
            }
            RowEvent::RemoveSelected => {
                let before = self.rows.len();
                self.rows.retain(|row| !row.remove);
                if self.rows.len() != before {
                    self.phase = Phase::Editing;
                }
            }
            RowEvent::Saved(rows) => {
                self.rows = rows;
                self.phase = Phase::Saved;
            }
        }
        self
    }

    /// Leave `Saved` for `Initial`, keeping the stored rows.
    pub fn reset(mut self) -> Self {
        if self.phase == Phase::Saved {
            self.phase = Phase::Initial;
        }
        self
    }
}

/// Pick the rows a request works on.
///
/// Precedence: own form state, then the parent form state, then the raw
/// submitted values, then the persisted configuration.
pub fn resolve_rows(
    own: Option<WorkingCopy>,
    parent: Option<WorkingCopy>,
    submitted: Option<Vec<Row>>,
    persisted: impl FnOnce() -> Vec<Row>,
) -> (WorkingCopy, RowSource) {
    if let Some(copy) = own {
        return (copy, RowSource::Own);
    }
    if let Some(copy) = parent {
        return (copy, RowSource::Parent);
    }
    if let Some(rows) = submitted {
        return (
            WorkingCopy {
                phase: Phase::Editing,
                rows,
            },
            RowSource::Submitted,
        );
    }
    (WorkingCopy::snapshot(persisted()), RowSource::Persisted)
}
