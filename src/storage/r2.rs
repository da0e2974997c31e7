//! Media storage using Cloudflare R2
//!
//! Files are served via R2 Custom Domain (CDN).

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;

use super::{BlobStore, build_r2_http_client, sanitized_extension};
use crate::config::R2StorageConfig;
use crate::error::AppError;

/// Uploads media to Cloudflare R2 and returns public URLs.
pub struct R2BlobStore {
    /// S3-compatible client for R2
    client: S3Client,
    /// Media bucket name
    bucket: String,
    /// Public URL base (Custom Domain)
    /// e.g., "https://media.example.com"
    public_url: String,
}

impl R2BlobStore {
    pub fn new(config: &R2StorageConfig) -> Self {
        use aws_sdk_s3::config::BehaviorVersion;
        use aws_sdk_s3::config::{Credentials, Region};

        // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", config.account_id);

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "threadline-r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .http_client(build_r2_http_client())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .build();

        Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get public URL for an S3 key
    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }

    fn key_for_url<'a>(&self, url: &'a str) -> Result<&'a str, AppError> {
        url.strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::Storage(format!("not an R2 media url: {}", url)))
    }
}

fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".webp" => "image/webp",
        ".gif" => "image/gif",
        ".mp4" => "video/mp4",
        ".webm" => "video/webm",
        ".mov" => "video/quicktime",
        ".avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl BlobStore for R2BlobStore {
    async fn store(&self, bytes: Vec<u8>, original_name: &str) -> Result<String, AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        let extension = sanitized_extension(original_name);
        let key = format!("media/{}{}", ulid::Ulid::new(), extension);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type_for_extension(&extension))
            .cache_control("public, max-age=31536000") // 1 year
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;

        Ok(self.get_public_url(&key))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let key = self.key_for_url(url)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> R2BlobStore {
        R2BlobStore::new(&R2StorageConfig {
            bucket: "media".to_string(),
            public_url: "https://media.example.com/".to_string(),
            account_id: "account".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
        })
    }

    #[test]
    fn public_url_and_key_are_inverse() {
        let store = store();
        let url = store.get_public_url("media/01ABC.png");
        assert_eq!(url, "https://media.example.com/media/01ABC.png");
        assert_eq!(store.key_for_url(&url).unwrap(), "media/01ABC.png");
    }

    #[test]
    fn foreign_urls_are_rejected() {
        assert!(store().key_for_url("https://other.example.com/x.png").is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for_extension(".png"), "image/png");
        assert_eq!(content_type_for_extension(""), "application/octet-stream");
    }
}
