//! Tera template rendering.
//!
//! The built-in templates are compiled into the binary. A directory of
//! overrides may replace any of them by name.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tera::{Tera, Value};
use tracing::debug;

/// Templates shipped with the service, by name.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "admin/row-editor.html",
        include_str!("../../templates/admin/row-editor.html"),
    ),
    (
        "admin/row-table.html",
        include_str!("../../templates/admin/row-table.html"),
    ),
    (
        "admin/api-settings.html",
        include_str!("../../templates/admin/api-settings.html"),
    ),
    (
        "blocks/executives.html",
        include_str!("../../templates/blocks/executives.html"),
    ),
    (
        "blocks/map-pins.html",
        include_str!("../../templates/blocks/map-pins.html"),
    ),
    (
        "blocks/cards.html",
        include_str!("../../templates/blocks/cards.html"),
    ),
];

/// Theme engine for rendering templates.
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Create an engine with the built-in templates.
    pub fn new() -> Result<Self> {
        Self::build(Tera::default())
    }

    /// Create an engine where templates in `dir` replace built-ins of the same name.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let pattern = dir.join("**/*.html");
        let pattern = pattern
            .to_str()
            .context("invalid template directory path")?;
        let tera = Tera::new(pattern).context("failed to load template overrides")?;
        debug!(
            count = tera.get_template_names().count(),
            dir = %dir.display(),
            "loaded template overrides"
        );
        Self::build(tera)
    }

    fn build(mut tera: Tera) -> Result<Self> {
        let present: Vec<String> = tera.get_template_names().map(str::to_string).collect();
        let builtin = BUILTIN_TEMPLATES
            .iter()
            .filter(|(name, _)| !present.iter().any(|p| p == name))
            .copied();
        tera.add_raw_templates(builtin)
            .context("failed to compile built-in templates")?;

        Self::register_filters(&mut tera);
        Ok(Self { tera })
    }

    fn register_filters(tera: &mut Tera) {
        // Map coordinates in [0, 1] as CSS percentages
        tera.register_filter(
            "percent",
            |value: &Value, _args: &HashMap<String, Value>| {
                let n = match value {
                    Value::Number(n) => n.as_f64().unwrap_or(0.0),
                    Value::String(s) => s.trim().parse().unwrap_or(0.0),
                    _ => 0.0,
                };
                Ok(Value::String(format!("{:.2}%", n.clamp(0.0, 1.0) * 100.0)))
            },
        );
    }

    /// Render a template.
    pub fn render(&self, template: &str, context: &tera::Context) -> Result<String> {
        self.tera
            .render(template, context)
            .with_context(|| format!("failed to render template {template}"))
    }
}

impl std::fmt::Debug for ThemeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeEngine").finish()
    }
}
