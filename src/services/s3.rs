use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{error, info};

use crate::config::S3Settings;
use crate::error::AppError;
use crate::services::blob_store::BlobStore;

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    pub bucket_name: String,
}

impl S3BlobStore {
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "manual_config",
        );

        let region = aws_sdk_s3::config::Region::new(settings.region.clone());

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials);

        if let Some(endpoint) = &settings.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self {
            client,
            bucket_name: settings.bucket_name.clone(),
        }
    }

    pub async fn ensure_bucket_exists(&self) -> Result<(), AppError> {
        let resp = self.client.head_bucket().bucket(&self.bucket_name).send().await;

        if resp.is_ok() {
            return Ok(());
        }

        info!(bucket = %self.bucket_name, "bucket does not exist, attempting to create it");
        self.client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket_name, error = ?e, "failed to create bucket");
                AppError::Storage(format!("Failed to create S3 bucket: {}", e))
            })?;

        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => {
                error!(key, error = ?e, "S3 head error");
                Err(AppError::Storage(format!("Failed to stat {} in S3: {}", key, e)))
            }
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(key, error = ?e, "S3 download error");
                AppError::Storage(format!("Failed to download {} from S3: {}", key, e))
            })?;

        let data = resp.body.collect().await.map_err(|e| {
            error!(key, error = ?e, "S3 body error");
            AppError::Storage("Failed to read S3 body".to_string())
        })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| {
                error!(key, error = ?e, "S3 upload error");
                AppError::Storage(format!("Failed to upload {} to S3: {}", key, e))
            })?;

        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(key, error = %e, "S3 delete error");
                AppError::Storage(format!("Failed to delete {} from S3", key))
            })?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    error!(prefix, error = ?e, "S3 list error");
                    AppError::Storage(format!("Failed to list {} in S3: {}", prefix, e))
                })?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}
