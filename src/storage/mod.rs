//! Blob storage for thread media
//!
//! Attachments are written through the [`BlobStore`] trait:
//! - Local filesystem (served by the HTTP layer)
//! - Cloudflare R2 (public bucket behind a custom domain)

mod local;
mod r2;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::AppError;

pub use local::LocalBlobStore;
pub use r2::R2BlobStore;

/// Where uploaded media bytes live.
///
/// `store` returns a URL that can be used to fetch the blob back;
/// `delete` takes that same URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, original_name: &str) -> Result<String, AppError>;
    async fn delete(&self, url: &str) -> Result<(), AppError>;
}

/// Build the configured blob store backend.
pub async fn build_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, AppError> {
    match config.backend {
        StorageBackend::Local => {
            let store = LocalBlobStore::new(
                config.local.root.clone(),
                config.local.public_path.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        StorageBackend::R2 => Ok(Arc::new(R2BlobStore::new(&config.r2))),
    }
}

/// Lowercased extension of an uploaded file name, with the leading dot.
///
/// Anything that is not a short alphanumeric extension is dropped so
/// user-supplied names never reach storage keys.
pub(crate) fn sanitized_extension(original_name: &str) -> String {
    std::path::Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

pub(crate) fn build_r2_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_only()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_and_sanitized() {
        assert_eq!(sanitized_extension("Photo.JPG"), ".jpg");
        assert_eq!(sanitized_extension("archive.tar.gz"), ".gz");
        assert_eq!(sanitized_extension("noext"), "");
        assert_eq!(sanitized_extension("evil.p/h"), "");
        assert_eq!(sanitized_extension("weird.ext with space"), "");
    }
}
