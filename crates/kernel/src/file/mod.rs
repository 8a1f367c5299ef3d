//! Managed files and asset promotion.
//!
//! Uploads start out temporary. Saving a widget promotes the files it
//! references to permanent status and swaps the reference for a public URL.

pub mod promote;
pub mod service;
pub mod storage;

pub use promote::{AssetPromoter, PromotedAsset, PromotedPair, PromotionError, PromotionResponse};
pub use service::{FileRecord, FileRepository, FileStatus, PgFileRepository};
pub use storage::{FileStorage, LocalFileStorage};
