//! Local filesystem blob store
//!
//! Files are written under a root directory with ULID names and exposed
//! under a public URL path that the router serves statically.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{BlobStore, sanitized_extension};
use crate::error::AppError;

pub struct LocalBlobStore {
    /// Directory files are written to
    root: PathBuf,
    /// URL prefix, e.g. "/uploads"
    public_path: String,
}

impl LocalBlobStore {
    /// Create the store, making sure the root directory exists.
    pub async fn new(root: PathBuf, public_path: String) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AppError::Storage(format!("failed to create {}: {}", root.display(), e)))?;

        Ok(Self {
            root,
            public_path: public_path.trim_end_matches('/').to_string(),
        })
    }

    /// Map a URL produced by `store` back to its file.
    fn path_for_url(&self, url: &str) -> Result<PathBuf, AppError> {
        let file_name = url
            .strip_prefix(&self.public_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
            .ok_or_else(|| AppError::Storage(format!("not a local blob url: {}", url)))?;

        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, bytes: Vec<u8>, original_name: &str) -> Result<String, AppError> {
        let file_name = format!("{}{}", ulid::Ulid::new(), sanitized_extension(original_name));
        let path = self.root.join(&file_name);

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", path.display(), e)))?;

        Ok(format!("{}/{}", self.public_path, file_name))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let path = self.path_for_url(url)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
