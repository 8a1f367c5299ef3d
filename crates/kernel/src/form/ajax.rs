//! AJAX responses for partial form rebuilds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered list of commands the client applies to the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AjaxResponse {
    pub commands: Vec<AjaxCommand>,
}

impl AjaxResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command to the response.
    pub fn command(mut self, command: AjaxCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Replace the element matched by `selector` with `html`.
    pub fn replace(self, selector: impl Into<String>, html: impl Into<String>) -> Self {
        self.command(AjaxCommand::Replace {
            selector: selector.into(),
            html: html.into(),
        })
    }

    /// Show inline messages above the element matched by `selector`.
    pub fn messages(self, selector: impl Into<String>, messages: Vec<String>) -> Self {
        self.command(AjaxCommand::Messages {
            selector: selector.into(),
            messages,
        })
    }

    /// Tell the client which build id to submit next.
    pub fn update_build_id(self, form_build_id: impl Into<String>) -> Self {
        self.command(AjaxCommand::UpdateBuildId {
            form_build_id: form_build_id.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Individual AJAX commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AjaxCommand {
    /// Replace an element.
    Replace { selector: String, html: String },

    /// Display status or error messages.
    Messages {
        selector: String,
        messages: Vec<String>,
    },

    /// Swap the hidden build id field.
    UpdateBuildId { form_build_id: String },
}

/// Request payload for the row editor AJAX callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AjaxRequest {
    /// The form build ID (identifies the form instance).
    pub form_build_id: String,

    /// The button that triggered the callback, e.g. `add_row` or `remove_row:2`.
    pub trigger: String,

    /// Current form values, keyed like the regular form fields.
    #[serde(default)]
    pub values: serde_json::Map<String, Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ajax_response_builder() {
        let response = AjaxResponse::new()
            .replace("#rows-wrapper", "<div id=\"rows-wrapper\"></div>")
            .update_build_id("form-abc");

        assert_eq!(response.commands.len(), 2);
        match &response.commands[0] {
            AjaxCommand::Replace { selector, html } => {
                assert_eq!(selector, "#rows-wrapper");
                assert!(html.starts_with("<div"));
            }
            other => panic!("expected Replace command, got {other:?}"),
        }
    }

    #[test]
    fn test_ajax_command_serialization() {
        let json = serde_json::to_value(AjaxCommand::Replace {
            selector: "#rows-wrapper".to_string(),
            html: "<p>x</p>".to_string(),
        })
        .unwrap();
        assert_eq!(json["command"], "replace");
        assert_eq!(json["selector"], "#rows-wrapper");

        let json = serde_json::to_value(AjaxCommand::UpdateBuildId {
            form_build_id: "b".to_string(),
        })
        .unwrap();
        assert_eq!(json["command"], "update_build_id");
    }

    #[test]
    fn test_ajax_request_values_default() {
        let req: AjaxRequest =
            serde_json::from_str(r#"{"form_build_id":"b","trigger":"add_row"}"#).unwrap();
        assert!(req.values.is_empty());
        assert!(AjaxResponse::new().is_empty());
    }
}
