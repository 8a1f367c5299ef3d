//! Widget row types and normalization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a row field is edited and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single line of text.
    Text,
    /// Multi-line text.
    LongText,
    /// Number in `[0, 1]`, relative to the map image.
    Coordinate,
    /// Managed file id while pending, public URL once promoted.
    Image,
}

/// A field of a widget row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, label, kind }
}

const EXECUTIVE_FIELDS: &[FieldSpec] = &[
    field("name", "Name", FieldKind::Text),
    field("title", "Title", FieldKind::Text),
    field("bio", "Biography", FieldKind::LongText),
    field("link", "Profile link", FieldKind::Text),
    field("image", "Portrait", FieldKind::Image),
];

const MAP_PIN_FIELDS: &[FieldSpec] = &[
    field("city", "City", FieldKind::Text),
    field("label", "Label", FieldKind::Text),
    field("x", "X position", FieldKind::Coordinate),
    field("y", "Y position", FieldKind::Coordinate),
];

const CARD_FIELDS: &[FieldSpec] = &[
    field("header", "Header", FieldKind::Text),
    field("body", "Body", FieldKind::LongText),
    field("link", "Link", FieldKind::Text),
    field("image", "Image", FieldKind::Image),
    field("image_mobile", "Mobile image", FieldKind::Image),
];

/// Widgets backed by an editable row collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    Executives,
    MapPins,
    Cards,
}

impl Widget {
    pub fn machine_name(self) -> &'static str {
        match self {
            Widget::Executives => "executives",
            Widget::MapPins => "map_pins",
            Widget::Cards => "cards",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Widget::Executives => "Executives",
            Widget::MapPins => "Map pins",
            Widget::Cards => "Cards",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Widget::Executives => EXECUTIVE_FIELDS,
            Widget::MapPins => MAP_PIN_FIELDS,
            Widget::Cards => CARD_FIELDS,
        }
    }

    /// Field that must be non-empty for a row to be kept.
    pub fn identifying_field(self) -> &'static str {
        match self {
            Widget::Executives => "name",
            Widget::MapPins => "city",
            Widget::Cards => "header",
        }
    }

    /// Template rendering the public widget.
    pub fn template(self) -> &'static str {
        match self {
            Widget::Executives => "blocks/executives.html",
            Widget::MapPins => "blocks/map-pins.html",
            Widget::Cards => "blocks/cards.html",
        }
    }

    pub fn field_spec(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.machine_name())
    }
}

impl FromStr for Widget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "executives" => Ok(Widget::Executives),
            "map_pins" | "map-pins" => Ok(Widget::MapPins),
            "cards" => Ok(Widget::Cards),
            other => Err(format!("unknown widget '{other}'")),
        }
    }
}

/// One row of a widget collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,

    /// Marked for removal by the editor. Never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remove: bool,
}

impl Row {
    /// Empty row with every widget field present.
    pub fn blank(widget: Widget) -> Self {
        Self {
            values: widget
                .fields()
                .iter()
                .map(|f| (f.name.to_string(), Value::String(String::new())))
                .collect(),
            remove: false,
        }
    }

    /// Text of a field; numbers are rendered as decimal text.
    pub fn text(&self, field: &str) -> String {
        match self.values.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }
}

/// A pending managed file reference (`"42"` or `42`).
pub fn pending_fid(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|fid| *fid > 0)
}

fn coordinate(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then(|| number.clamp(0.0, 1.0))
}

/// Normalize one row in place.
///
/// Unknown fields are dropped, text is trimmed, coordinates are clamped to
/// `[0, 1]` and non-numeric coordinates are removed.
pub fn normalize_row(widget: Widget, row: &mut Row) {
    row.values.retain(|name, _| widget.field_spec(name).is_some());

    for spec in widget.fields() {
        let Some(value) = row.values.get(spec.name) else {
            continue;
        };
        let normalized = match spec.kind {
            FieldKind::Text | FieldKind::LongText => match value {
                Value::String(s) => Some(Value::String(s.trim().to_string())),
                Value::Null => None,
                other => Some(Value::String(other.to_string())),
            },
            FieldKind::Coordinate => coordinate(value).and_then(|n| {
                serde_json::Number::from_f64(n).map(Value::Number)
            }),
            FieldKind::Image => match value {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(Value::String(s.trim().to_string())),
                Value::Number(_) => Some(value.clone()),
                _ => None,
            },
        };

        match normalized {
            Some(v) => {
                row.values.insert(spec.name.to_string(), v);
            }
            None => {
                row.values.remove(spec.name);
            }
        }
    }
}

/// Rows that may be persisted: normalized, without removed or unidentified rows.
pub fn normalize_rows(widget: Widget, rows: Vec<Row>) -> Vec<Row> {
    let key = widget.identifying_field();
    rows.into_iter()
        .filter(|row| !row.remove)
        .map(|mut row| {
            normalize_row(widget, &mut row);
            row
        })
        .filter(|row| !row.text(key).is_empty())
        .collect()
}
