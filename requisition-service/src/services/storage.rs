//! Blob store for payment receipts and evidence files.
//!
//! The core never inspects file bytes; it records the metadata the caller
//! supplies and keeps the opaque handle. Blob writes are not transactional
//! with the database — see the compensation policy in the ledgers.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use service_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// Opaque handle to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle(pub String);

/// An uploaded file as the presentation layer hands it over: raw bytes
/// plus caller-supplied metadata.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub data: Vec<u8>,
    pub name: String,
    pub mime: String,
}

impl BlobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, data: Vec<u8>, content_type: &str) -> Result<BlobHandle, AppError>;
    async fn delete(&self, handle: &BlobHandle) -> Result<(), AppError>;
    fn url_for(&self, handle: &BlobHandle) -> String;
}

fn new_key(content_type: &str) -> String {
    let extension = match content_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "text/xml" | "application/xml" => "xml",
        _ => "bin",
    };
    format!("{}/{}.{}", Uuid::new_v4(), Uuid::new_v4(), extension)
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl BlobStore for LocalStorage {
    async fn put(&self, data: Vec<u8>, content_type: &str) -> Result<BlobHandle, AppError> {
        let key = new_key(content_type);
        let path = self.base_path.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(BlobHandle(key))
    }

    async fn delete(&self, handle: &BlobHandle) -> Result<(), AppError> {
        let path = self.base_path.join(handle.as_str());
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    fn url_for(&self, handle: &BlobHandle) -> String {
        format!("file://{}", self.base_path.join(handle.as_str()).display())
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn put(&self, data: Vec<u8>, content_type: &str) -> Result<BlobHandle, AppError> {
        let key = new_key(content_type);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("S3 upload failed: {}", e)))?;
        Ok(BlobHandle(key))
    }

    async fn delete(&self, handle: &BlobHandle) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(handle.as_str())
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("S3 delete failed: {}", e)))?;
        Ok(())
    }

    fn url_for(&self, handle: &BlobHandle) -> String {
        format!("s3://{}/{}", self.bucket, handle.as_str())
    }
}
