//! Promotion of temporary uploads to permanent, publicly addressable files.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::service::{FileRepository, FileStatus};
use super::storage::FileStorage;
use crate::clock::Clock;

/// A file that is permanent and has a public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotedAsset {
    pub fid: i64,
    pub url: String,
}

/// Why a promotion failed. `code` is an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct PromotionError {
    pub code: u16,
    pub message: String,
}

impl PromotionError {
    fn not_found() -> Self {
        Self {
            code: StatusCode::NOT_FOUND.as_u16(),
            message: "File not found.".to_string(),
        }
    }

    fn persist_failed() -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Unable to persist file.".to_string(),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Wire shape of a promotion result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PromotionResponse {
    Ok { url: String, fid: i64 },
    Error { message: String, code: u16 },
}

impl From<Result<PromotedAsset, PromotionError>> for PromotionResponse {
    fn from(result: Result<PromotedAsset, PromotionError>) -> Self {
        match result {
            Ok(asset) => PromotionResponse::Ok {
                url: asset.url,
                fid: asset.fid,
            },
            Err(e) => PromotionResponse::Error {
                message: e.message,
                code: e.code,
            },
        }
    }
}

/// Desktop and mobile variants of one image slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotedPair {
    pub desktop: Option<PromotedAsset>,
    pub mobile: Option<PromotedAsset>,
}

/// Marks files permanent and resolves their public URLs.
pub struct AssetPromoter {
    files: Arc<dyn FileRepository>,
    storage: Arc<dyn FileStorage>,
    clock: Arc<dyn Clock>,
}

impl AssetPromoter {
    pub fn new(
        files: Arc<dyn FileRepository>,
        storage: Arc<dyn FileStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            files,
            storage,
            clock,
        }
    }

    /// Promote one file. Promoting an already permanent file only resolves its URL.
    pub async fn promote(&self, fid: i64) -> Result<PromotedAsset, PromotionError> {
        let mut file = match self.files.load(fid).await {
            Ok(Some(file)) => file,
            Ok(None) => return Err(PromotionError::not_found()),
            Err(e) => {
                error!(fid = fid, error = %e, "failed to load file for promotion");
                return Err(PromotionError::persist_failed());
            }
        };

        if !file.is_permanent() {
            file.status = FileStatus::Permanent;
            file.changed = self.clock.timestamp();
            if let Err(e) = self.files.save(&file).await {
                error!(fid = fid, error = %e, "failed to persist promoted file");
                return Err(PromotionError::persist_failed());
            }
            debug!(fid = fid, uri = %file.uri, "file promoted to permanent");
        }

        Ok(PromotedAsset {
            fid,
            url: self.storage.public_url(&file.uri),
        })
    }

    /// Promote a desktop/mobile pair.
    ///
    /// The same fid in both slots is promoted once. A missing slot mirrors the
    /// other one. The first failure aborts the pair.
    pub async fn promote_pair(
        &self,
        desktop: Option<i64>,
        mobile: Option<i64>,
    ) -> Result<PromotedPair, PromotionError> {
        let pair = match (desktop, mobile) {
            (None, None) => PromotedPair::default(),
            (Some(d), Some(m)) if d == m => {
                let asset = self.promote(d).await?;
                PromotedPair {
                    desktop: Some(asset.clone()),
                    mobile: Some(asset),
                }
            }
            (Some(d), Some(m)) => {
                let desktop = self.promote(d).await?;
                let mobile = self.promote(m).await?;
                PromotedPair {
                    desktop: Some(desktop),
                    mobile: Some(mobile),
                }
            }
            (Some(fid), None) | (None, Some(fid)) => {
                let asset = self.promote(fid).await?;
                PromotedPair {
                    desktop: Some(asset.clone()),
                    mobile: Some(asset),
                }
            }
        };

        Ok(pair)
    }
}

impl std::fmt::Debug for AssetPromoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPromoter").finish()
    }
}
