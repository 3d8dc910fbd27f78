//! Bucket client abstraction.
//!
//! A `BucketClient` is a thin capability over a single remote object bucket:
//! write, full read, bounded streaming read, attribute fetch, existence check,
//! and delete. The adapter layer never talks to a concrete backend directly.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{collections::HashMap, io, pin::Pin};
use thiserror::Error;

pub mod gcs;
pub mod local;

/// Ordered chunk stream produced by bounded reads.
///
/// Chunks arrive in object-byte order; an `Err` item terminates the stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("bucket backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BucketResult<T> = Result<T, BucketError>;

/// Attributes stored alongside an object's payload.
#[derive(Debug, Clone)]
pub struct ObjectAttrs {
    /// Payload size in bytes.
    pub size: u64,

    /// Content type recorded at write time.
    pub content_type: Option<String>,

    /// Backend integrity tag (base64 MD5 for both backends here).
    pub etag: Option<String>,

    /// Last write time, when the backend reports one.
    pub updated: Option<DateTime<Utc>>,
}

/// Per-write settings carried into the backend.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// Caller-supplied custom metadata, already merged and stringified.
    pub metadata: HashMap<String, String>,
    /// Grant public read access to the written object.
    pub public: bool,
}

/// Capability over one bucket. Stateless from the caller's perspective and
/// safe for unlimited concurrent use.
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Write an object, replacing any previous version under the same key.
    async fn write(&self, key: &str, data: Bytes, opts: WriteOptions) -> BucketResult<()>;

    /// Download the full payload.
    async fn read(&self, key: &str) -> BucketResult<Bytes>;

    /// Open a chunk stream over the inclusive byte span `[start, end]`.
    async fn read_range(&self, key: &str, start: u64, end: u64) -> BucketResult<ByteStream>;

    /// Fetch object attributes without the payload.
    async fn attrs(&self, key: &str) -> BucketResult<ObjectAttrs>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> BucketResult<bool>;

    /// Delete an object. Deleting an absent key is a backend-level error;
    /// callers that need a distinguishable signal check existence first.
    async fn delete(&self, key: &str) -> BucketResult<()>;
}
