//! Storage URI to public URL resolution.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

/// URI schemes served from the local uploads directory.
const LOCAL_SCHEMES: &[&str] = &["local://", "public://"];

/// File storage backend trait.
pub trait FileStorage: Send + Sync {
    /// Get the public URL for a stored file.
    fn public_url(&self, uri: &str) -> String;

    /// Get the storage scheme (e.g., "local").
    fn scheme(&self) -> &'static str;
}

/// Local filesystem storage.
pub struct LocalFileStorage {
    /// Base path for file storage.
    base_path: PathBuf,
    /// Base URL for public file access.
    base_url: String,
}

impl LocalFileStorage {
    /// Create a new local file storage.
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
        }
    }

    fn relative_path(uri: &str) -> &str {
        LOCAL_SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(scheme))
            .unwrap_or(uri)
    }

    /// Filesystem path for a storage URI.
    ///
    /// Rejects paths containing `..` components.
    pub fn path_for(&self, uri: &str) -> Result<PathBuf> {
        let path = LOCAL_SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(scheme))
            .context("invalid local URI, must start with local:// or public://")?;

        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!("directory traversal not allowed in storage URI");
        }
        Ok(self.base_path.join(path))
    }
}

impl FileStorage for LocalFileStorage {
    fn public_url(&self, uri: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            Self::relative_path(uri).trim_start_matches('/')
        )
    }

    fn scheme(&self) -> &'static str {
        "local"
    }
}

impl std::fmt::Debug for LocalFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStorage")
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url() {
        let storage = LocalFileStorage::new("/tmp/uploads", "https://example.com/files/");
        assert_eq!(
            storage.public_url("local://2026/02/abc123_test.jpg"),
            "https://example.com/files/2026/02/abc123_test.jpg"
        );
        assert_eq!(
            storage.public_url("public://team/ceo.png"),
            "https://example.com/files/team/ceo.png"
        );
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let storage = LocalFileStorage::new("/tmp/uploads", "/files");
        assert_eq!(
            storage.path_for("local://a/b.jpg").unwrap(),
            PathBuf::from("/tmp/uploads/a/b.jpg")
        );
        assert!(storage.path_for("local://../etc/passwd").is_err());
        assert!(storage.path_for("s3://bucket/x").is_err());
    }
}
