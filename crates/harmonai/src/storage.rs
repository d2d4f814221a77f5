//! Object storage for generated artifacts.
//!
//! Two backends:
//!
//! - [`S3Store`]: any S3-compatible bucket. Production default.
//! - [`FileStore`]: a local directory, for development without credentials.
//!
//! Layout of the filesystem backend:
//! ```text
//! {base_path}/
//! ├── objects/
//! │   └── 1b4e28ba-2fa1-11d2-883f-0016d3cca427.wav
//! └── metadata/
//!     └── 1b4e28ba-2fa1-11d2-883f-0016d3cca427.wav.json  # {content_type, size_bytes}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use harmonconf::{InfraConfig, StorageBackend, StorageConfig};
use serde::{Deserialize, Serialize};

/// Trait for artifact storage backends.
///
/// Keys are flat object names; the store never interprets them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `key`. The local file is left in place.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;

    /// Human-readable location, for logs and health output.
    fn describe(&self) -> String;
}

/// Build the store selected by `config.storage.backend`.
pub async fn from_config(config: &InfraConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::S3 => Ok(Arc::new(S3Store::connect(&config.storage).await?)),
        StorageBackend::Filesystem => Ok(Arc::new(FileStore::at_path(&config.paths.storage_dir)?)),
    }
}

/// S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint_url: String,
}

impl S3Store {
    /// Credentials come from the standard AWS environment chain.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            anyhow::bail!("S3 bucket not configured (set S3_BUCKET_NAME)");
        }

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(!config.virtual_addressing);
        if !config.endpoint_url.is_empty() {
            builder = builder.endpoint_url(&config.endpoint_url);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(
        name = "storage.s3.put",
        skip(self, path),
        fields(bucket = %self.bucket)
    )]
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {} for upload", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Upload of {} to bucket {} failed: {}",
                    key,
                    self.bucket,
                    DisplayErrorContext(e)
                )
            })?;

        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{} via {}", self.bucket, self.endpoint_url)
    }
}

/// Sidecar metadata written next to each object by [`FileStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub size_bytes: u64,
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a FileStore rooted at `path`, creating its directories.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            base_path: path.into(),
        };
        std::fs::create_dir_all(store.objects_dir())
            .context("failed to create objects directory")?;
        std::fs::create_dir_all(store.metadata_dir())
            .context("failed to create metadata directory")?;
        Ok(store)
    }

    fn objects_dir(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    fn metadata_dir(&self) -> PathBuf {
        self.base_path.join("metadata")
    }

    /// Where the object for `key` lives.
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.objects_dir().join(key)
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json", key))
    }

    /// Read back the metadata for `key`, if stored.
    pub fn inspect(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let path = self.metadata_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).context("failed to read metadata")?;
        let metadata = serde_json::from_str(&json).context("failed to parse metadata")?;
        Ok(Some(metadata))
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    #[tracing::instrument(name = "storage.fs.put", skip(self, path))]
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            anyhow::bail!("invalid object key: {:?}", key);
        }

        let size_bytes = tokio::fs::copy(path, self.object_path(key))
            .await
            .with_context(|| format!("failed to copy {} into store", path.display()))?;

        let metadata = ObjectMetadata {
            content_type: content_type.to_string(),
            size_bytes,
        };
        let json = serde_json::to_string_pretty(&metadata)?;
        tokio::fs::write(self.metadata_path(key), json)
            .await
            .context("failed to write metadata")?;

        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.base_path.display())
    }
}
