use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// An object read back from storage with the content type it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

// 1. StorageService Contract
/// StorageService
///
/// The blob-storage collaborator for uploaded documents. Content items only keep
/// the opaque handle returned by `store`; bytes are fetched back with `retrieve`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Called at startup in `Env::Local`
    /// to provision the MinIO bucket.
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError>;

    /// Stores `bytes` under `key` (sanitized) and returns the handle to persist.
    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Reads back an object previously returned by `store`.
    async fn retrieve(&self, handle: &str) -> Result<StoredObject, StorageError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// `StorageService` over the AWS SDK. Path-style addressing keeps it compatible
/// with MinIO and other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        let exists = self
            .client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .is_ok();
        if exists {
            return Ok(());
        }
        self.client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        tracing::info!(bucket = %self.bucket_name, "created storage bucket");
        Ok(())
    }

    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let handle = sanitize_key(key);
        if handle.is_empty() {
            return Err(StorageError::Backend("empty object key".to_string()));
        }
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&handle)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(handle)
    }

    async fn retrieve(&self, handle: &str) -> Result<StoredObject, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(handle)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound(handle.to_string())
                } else {
                    StorageError::Backend(service_error.to_string())
                }
            })?;
        let content_type = output
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(StoredObject {
            bytes: data.into_bytes().to_vec(),
            content_type,
        })
    }
}

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a client-supplied filename can never
/// address an object outside its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The In-Memory Implementation (tests, local runs)
/// InMemoryStorage
///
/// `StorageService` backed by a map. `new_failing` simulates an unavailable
/// backend for error-path tests.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    should_fail: bool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub fn new_failing() -> Self {
        Self {
            objects: RwLock::default(),
            should_fail: true,
        }
    }

    fn fail_if_requested(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "in-memory storage failure requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for InMemoryStorage {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        self.fail_if_requested()
    }

    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.fail_if_requested()?;
        let handle = sanitize_key(key);
        let object = StoredObject {
            bytes,
            content_type: content_type.to_string(),
        };
        self.objects.write().await.insert(handle.clone(), object);
        Ok(handle)
    }

    async fn retrieve(&self, handle: &str) -> Result<StoredObject, StorageError> {
        self.fail_if_requested()?;
        self.objects
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(handle.to_string()))
    }
}

/// StorageState
///
/// The shared handle to the storage service held in `AppState`.
pub type StorageState = Arc<dyn StorageService>;
