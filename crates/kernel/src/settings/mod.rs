//! Upstream API settings edited on the admin configuration surface.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config_storage::{ConfigStorage, load_typed, names, save_typed};
use crate::form::ValidationError;

/// Persisted API settings (`meridian_api.settings`).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub endpoint_url: String,
    pub endpoint_label: String,
    pub api_key: String,
    /// Stored verbatim; never rendered back into the form.
    pub secret_token: String,
    pub logging_enabled: bool,
}

impl ApiSettings {
    /// Load the stored settings, or defaults when none are saved.
    pub async fn load(storage: &dyn ConfigStorage) -> Result<Self> {
        Ok(load_typed(storage, names::API_SETTINGS)
            .await?
            .unwrap_or_default())
    }

    /// Persist the settings.
    pub async fn save(&self, storage: &dyn ConfigStorage) -> Result<()> {
        save_typed(storage, names::API_SETTINGS, self).await
    }

    /// Label shown to consumers: the endpoint label, else the URL.
    pub fn display_endpoint(&self) -> &str {
        if self.endpoint_label.trim().is_empty() {
            self.endpoint_url.trim()
        } else {
            self.endpoint_label.trim()
        }
    }

    /// Check the settings before saving.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let endpoint = self.endpoint_url.trim();

        if endpoint.is_empty() {
            errors.push(ValidationError::field(
                "endpoint_url",
                "Endpoint URL is required.",
            ));
        } else {
            match Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
                _ => errors.push(ValidationError::field(
                    "endpoint_url",
                    "Endpoint URL must be an absolute http or https URL.",
                )),
            }
        }

        errors
    }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("endpoint_url", &self.endpoint_url)
            .field("endpoint_label", &self.endpoint_label)
            .field("logging_enabled", &self.logging_enabled)
            .finish_non_exhaustive()
    }
}

/// Settings form submission.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiSettingsSubmission {
    #[serde(rename = "_token")]
    pub token: String,
    pub endpoint_url: String,
    pub endpoint_label: String,
    pub api_key: String,
    pub secret_token: String,
    /// Checkbox: present when ticked.
    pub logging_enabled: Option<String>,
}

impl ApiSettingsSubmission {
    /// Apply the submission on top of the stored settings.
    ///
    /// Values are stored as submitted. An empty secret keeps the stored one.
    pub fn merge_into(self, stored: &ApiSettings) -> ApiSettings {
        let secret_token = if self.secret_token.is_empty() {
            stored.secret_token.clone()
        } else {
            self.secret_token
        };

        ApiSettings {
            endpoint_url: self.endpoint_url,
            endpoint_label: self.endpoint_label,
            api_key: self.api_key,
            secret_token,
            logging_enabled: self
                .logging_enabled
                .is_some_and(|v| !v.is_empty() && v != "0"),
        }
    }
}
