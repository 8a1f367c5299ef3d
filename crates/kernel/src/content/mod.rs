//! Content items: storage access and derived per-item fields.
//!
//! Items live in the `item` table with their bundle-specific fields in a
//! JSONB document. Several concepts (summary, theme, read time) have been
//! stored under different field names over the site's lifetime; the
//! [`fields`] module resolves them in a fixed order.

pub mod fields;
mod repository;

pub use repository::{ContentRepository, ItemFilter, PgContentRepository, StoredItem};
