//! Parsing of row editor submissions.
//!
//! Row fields arrive as flat form pairs named `rows[<index>][<field>]`, both
//! from the regular form POST and inside the `values` map of AJAX callbacks.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::rows::{Row, Widget};

#[allow(clippy::expect_used)]
static ROW_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^rows\[(\d+)\]\[([a-z_]+)\]$").expect("row field pattern is valid")
});

/// Editor button that triggered a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorOp {
    AddRow,
    RemoveSelected,
    RemoveRow(usize),
    Save,
}

impl FromStr for EditorOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "add_row" => Ok(EditorOp::AddRow),
            "remove_selected" => Ok(EditorOp::RemoveSelected),
            "save" => Ok(EditorOp::Save),
            _ => s
                .strip_prefix("remove_row:")
                .and_then(|index| index.parse().ok())
                .map(EditorOp::RemoveRow)
                .ok_or_else(|| format!("unknown editor operation '{s}'")),
        }
    }
}

/// A decoded editor submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub op: Option<String>,
    pub form_build_id: Option<String>,
    pub parent_build_id: Option<String>,
    pub token: Option<String>,
    pub label: Option<String>,
    /// Row values keyed by their `rows[<index>]` position; `None` when the
    /// submission carried no rows.
    pub rows: Option<BTreeMap<usize, Row>>,
}

fn is_checked(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "off")
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

impl Submission {
    /// Decode form pairs. Fields unknown to `widget` are ignored.
    pub fn from_pairs<I>(widget: Widget, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut submission = Submission::default();
        let mut rows: BTreeMap<usize, Row> = BTreeMap::new();
        let mut saw_rows = false;

        for (name, value) in pairs {
            match name.as_str() {
                "op" => submission.op = non_empty(value),
                "form_build_id" => submission.form_build_id = non_empty(value),
                "parent_build_id" => submission.parent_build_id = non_empty(value),
                "_token" => submission.token = non_empty(value),
                "label" => submission.label = Some(value),
                _ => {
                    let Some(caps) = ROW_FIELD.captures(&name) else {
                        continue;
                    };
                    let Ok(index) = caps[1].parse::<usize>() else {
                        continue;
                    };
                    saw_rows = true;
                    let field = &caps[2];
                    let row = rows.entry(index).or_default();
                    if field == "remove" {
                        row.remove = is_checked(&value);
                    } else if widget.field_spec(field).is_some() {
                        row.values.insert(field.to_string(), Value::String(value));
                    }
                }
            }
        }

        if saw_rows {
            submission.rows = Some(rows);
        }
        submission
    }

    /// Decode the `values` map of an AJAX callback.
    pub fn from_values(widget: Widget, values: &serde_json::Map<String, Value>) -> Self {
        let pairs = values.iter().filter_map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "1".to_string(),
                Value::Bool(false) => "0".to_string(),
                _ => return None,
            };
            Some((name.clone(), text))
        });
        Self::from_pairs(widget, pairs)
    }

    /// The requested operation, if any was recognised.
    pub fn operation(&self) -> Result<Option<EditorOp>, String> {
        self.op.as_deref().map(str::parse).transpose()
    }
}
