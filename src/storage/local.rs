//! Local filesystem bucket backend.
//!
//! Dev/test stand-in for the cloud bucket. Payloads live at `root/{key}`,
//! attributes in a JSON sidecar under `root/.attrs/{key}.json`. Writes go
//! through a temp file and an atomic rename; the etag is the base64 MD5 of
//! the payload, matching what the cloud backend reports.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::{BucketClient, BucketError, BucketResult, ByteStream, ObjectAttrs, WriteOptions};

const ATTRS_DIR: &str = ".attrs";

/// Sidecar record for one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAttrs {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: HashMap<String, String>,
    pub public: bool,
    pub etag: String,
    pub updated: DateTime<Utc>,
}

pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(ATTRS_DIR))?;
        Ok(Self { root })
    }

    fn ensure_key_safe(key: &str) -> BucketResult<()> {
        if key.is_empty() || key.starts_with('/') || key.contains("..") {
            return Err(BucketError::Backend(format!("invalid object key `{}`", key)));
        }
        Ok(())
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn attrs_path(&self, key: &str) -> PathBuf {
        self.root.join(ATTRS_DIR).join(format!("{}.json", key))
    }

    /// Full sidecar record, including fields the `BucketClient` surface does
    /// not expose (ACL, custom metadata). Used by tests and diagnostics.
    pub async fn stored_attrs(&self, key: &str) -> BucketResult<StoredAttrs> {
        Self::ensure_key_safe(key)?;
        let raw = fs::read(self.attrs_path(key)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BucketError::NotFound(key.to_string())
            } else {
                BucketError::Io(e)
            }
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| BucketError::Backend(format!("corrupt attrs sidecar for `{}`: {}", key, e)))
    }
}

fn map_not_found(err: io::Error, key: &str) -> BucketError {
    if err.kind() == ErrorKind::NotFound {
        BucketError::NotFound(key.to_string())
    } else {
        BucketError::Io(err)
    }
}

#[async_trait]
impl BucketClient for LocalBucket {
    async fn write(&self, key: &str, data: Bytes, opts: WriteOptions) -> BucketResult<()> {
        Self::ensure_key_safe(key)?;

        let file_path = self.data_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BucketError::Backend("object path has no parent".into()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BucketError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BucketError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BucketError::Io(err));
            }
        }

        let attrs = StoredAttrs {
            content_type: opts.content_type,
            cache_control: opts.cache_control,
            metadata: opts.metadata,
            public: opts.public,
            etag: general_purpose::STANDARD.encode(md5::compute(&data).0),
            updated: Utc::now(),
        };
        if let Some(attrs_parent) = self.attrs_path(key).parent() {
            fs::create_dir_all(attrs_parent).await?;
        }
        let encoded = serde_json::to_vec(&attrs)
            .map_err(|e| BucketError::Backend(format!("encoding attrs sidecar: {}", e)))?;
        fs::write(self.attrs_path(key), encoded).await?;

        Ok(())
    }

    async fn read(&self, key: &str) -> BucketResult<Bytes> {
        Self::ensure_key_safe(key)?;
        let data = fs::read(self.data_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, key: &str, start: u64, end: u64) -> BucketResult<ByteStream> {
        Self::ensure_key_safe(key)?;
        let mut file = File::open(self.data_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;

        file.seek(io::SeekFrom::Start(start)).await?;
        let bounded = tokio::io::AsyncReadExt::take(file, end - start + 1);
        Ok(Box::pin(ReaderStream::new(bounded)))
    }

    async fn attrs(&self, key: &str) -> BucketResult<ObjectAttrs> {
        let stored = self.stored_attrs(key).await?;
        let meta = fs::metadata(self.data_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;

        Ok(ObjectAttrs {
            size: meta.len(),
            content_type: stored.content_type,
            etag: Some(stored.etag),
            updated: Some(stored.updated),
        })
    }

    async fn exists(&self, key: &str) -> BucketResult<bool> {
        Self::ensure_key_safe(key)?;
        Ok(fs::try_exists(self.data_path(key)).await?)
    }

    async fn delete(&self, key: &str) -> BucketResult<()> {
        Self::ensure_key_safe(key)?;
        fs::remove_file(self.data_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;
        match fs::remove_file(self.attrs_path(key)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BucketError::Io(e)),
        }
    }
}
