//! src/services/file_adapter.rs
//!
//! FileAdapter — the public storage contract the host application consumes:
//! create, delete, read, locate, stream, validate. The adapter composes a
//! `BucketClient` with the range protocol and the thumbnail pipeline; it
//! holds no mutable per-request state, so one instance is safely shared by
//! any number of in-flight requests.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::AdapterConfig;
use crate::models::context::AppContext;
use crate::models::stored_file::{DEFAULT_CONTENT_TYPE, StoredFile};
use crate::services::byte_range::{ByteRange, RangeError};
use crate::services::thumbnails::{self, ThumbnailError};
use crate::storage::{BucketClient, BucketError, ByteStream, ObjectAttrs, WriteOptions};

const MAX_FILENAME_LEN: usize = 128;

/// `encodeURIComponent`-equivalent escape set: everything except ASCII
/// alphanumerics and `- _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("filename `{filename}` invalid: {reason}")]
    InvalidFilename { filename: String, reason: String },
    #[error("upload of `{filename}` failed: {source}")]
    Upload {
        filename: String,
        source: BucketError,
    },
    /// A ranged read failed to open. Degrades to the not-found signal at the
    /// HTTP boundary regardless of the true cause, but stays distinguishable
    /// for callers.
    #[error("streaming `{filename}` failed: {source}")]
    Stream {
        filename: String,
        source: BucketError,
    },
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Bucket(#[from] BucketError),
}

pub type FileResult<T> = Result<T, FileError>;

/// A resolved partial read: the serviceable span, the content type to echo,
/// and the ordered chunk stream bounded to that span.
pub struct RangedStream {
    pub range: ByteRange,
    pub content_type: String,
    pub body: ByteStream,
}

/// A full-object read for requests that carry no `Range` header.
pub struct FullStream {
    pub attrs: ObjectAttrs,
    pub body: ByteStream,
}

/// The storage adapter facade.
///
/// Construction fixes the bucket handle and configuration for the process
/// lifetime; cloning shares both.
#[derive(Clone)]
pub struct FileAdapter {
    bucket: Arc<dyn BucketClient>,
    config: Arc<AdapterConfig>,
}

impl FileAdapter {
    pub fn new(bucket: Arc<dyn BucketClient>, config: AdapterConfig) -> Self {
        Self {
            bucket,
            config: Arc::new(config),
        }
    }

    /// Check a caller-supplied filename before it reaches any bucket
    /// operation. Pure; the reason distinguishes length from character-set
    /// violations.
    pub fn validate_filename(&self, filename: &str) -> FileResult<()> {
        let invalid = |reason: &str| FileError::InvalidFilename {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };

        if filename.chars().count() > MAX_FILENAME_LEN {
            return Err(invalid("too long"));
        }

        let mut chars = filename.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let rest_ok = chars.all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | ' ' | '~' | '_' | '-')
        });
        if !first_ok || !rest_ok {
            return Err(invalid("contains invalid characters"));
        }
        Ok(())
    }

    /// Upload the primary object, then trigger the thumbnail pipeline for
    /// image payloads when sizes are configured.
    ///
    /// The pipeline runs on a detached task after the primary write has
    /// succeeded; its failures are logged and never roll back or fail the
    /// upload.
    pub async fn create_file(&self, file: StoredFile) -> FileResult<()> {
        let opts = WriteOptions {
            content_type: Some(file.content_type_or_default().to_string()),
            cache_control: Some(self.config.cache_control.clone()),
            metadata: file.options.merged_metadata(),
            public: self.config.direct_access,
        };

        self.bucket
            .write(&file.filename, file.data.clone(), opts)
            .await
            .map_err(|source| FileError::Upload {
                filename: file.filename.clone(),
                source,
            })?;

        if !self.config.thumbnail_sizes.is_empty()
            && thumbnails::is_image(&file.filename, file.content_type.as_deref())
        {
            let bucket = Arc::clone(&self.bucket);
            let sizes = self.config.thumbnail_sizes.clone();
            tokio::spawn(async move {
                if let Err(err) = thumbnails::generate_thumbnails(bucket.as_ref(), &file, &sizes).await
                {
                    report_thumbnail_failure(&file.filename, &err);
                }
            });
        }

        Ok(())
    }

    /// Delete an object, signalling `NotFound` for absent names instead of
    /// surfacing an opaque backend failure.
    pub async fn delete_file(&self, filename: &str) -> FileResult<()> {
        if !self.bucket.exists(filename).await? {
            return Err(FileError::NotFound(filename.to_string()));
        }
        self.bucket.delete(filename).await?;
        Ok(())
    }

    /// Download the full payload.
    pub async fn get_file_data(&self, filename: &str) -> FileResult<bytes::Bytes> {
        if !self.bucket.exists(filename).await? {
            return Err(FileError::NotFound(filename.to_string()));
        }
        Ok(self.bucket.read(filename).await?)
    }

    /// Object attributes without the payload.
    pub async fn get_file_attrs(&self, filename: &str) -> FileResult<ObjectAttrs> {
        self.bucket.attrs(filename).await.map_err(|e| match e {
            BucketError::NotFound(_) => FileError::NotFound(filename.to_string()),
            other => FileError::Bucket(other),
        })
    }

    /// Where a file can be fetched from. Pure, no I/O.
    ///
    /// Direct access yields the public bucket URL; otherwise the location is
    /// scoped to the host's own file route with the filename
    /// percent-encoded.
    pub fn get_file_location(&self, ctx: &AppContext, filename: &str) -> String {
        if self.config.direct_access {
            format!(
                "https://storage.cloud.google.com/{}/{}",
                self.config.bucket_name, filename
            )
        } else {
            format!(
                "{}/files/{}/{}",
                ctx.mount,
                ctx.application_id,
                utf8_percent_encode(filename, URI_COMPONENT)
            )
        }
    }

    /// Resolve a ranged read: existence check, attribute fetch, range parse,
    /// then a bucket stream bounded to the span. Chunks arrive in object
    /// order; the HTTP layer turns this into a 206 response.
    pub async fn handle_file_stream(
        &self,
        filename: &str,
        range_header: &str,
    ) -> FileResult<RangedStream> {
        if !self.bucket.exists(filename).await? {
            return Err(FileError::NotFound(filename.to_string()));
        }

        let attrs = self.bucket.attrs(filename).await?;
        let range = ByteRange::parse(range_header, attrs.size)?;

        let body = self
            .bucket
            .read_range(filename, range.start, range.end)
            .await
            .map_err(|source| match source {
                BucketError::NotFound(_) => FileError::NotFound(filename.to_string()),
                other => FileError::Stream {
                    filename: filename.to_string(),
                    source: other,
                },
            })?;

        Ok(RangedStream {
            range,
            content_type: attrs
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body,
        })
    }

    /// Full-object stream for requests without a `Range` header (plain 200).
    pub async fn open_file_stream(&self, filename: &str) -> FileResult<FullStream> {
        if !self.bucket.exists(filename).await? {
            return Err(FileError::NotFound(filename.to_string()));
        }

        let attrs = self.bucket.attrs(filename).await?;
        let body: ByteStream = if attrs.size == 0 {
            Box::pin(futures::stream::empty())
        } else {
            self.bucket.read_range(filename, 0, attrs.size - 1).await?
        };

        Ok(FullStream { attrs, body })
    }

    /// Liveness probe against the backend; used by the readiness endpoint.
    pub async fn probe_bucket(&self) -> FileResult<()> {
        self.bucket.exists(".readyz-probe").await?;
        Ok(())
    }
}

fn report_thumbnail_failure(filename: &str, err: &ThumbnailError) {
    warn!(filename = %filename, error = %err, "thumbnail pipeline failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::LocalBucket;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io;
    use std::time::Duration;
    use tempfile::TempDir;

    fn adapter_config(direct_access: bool, sizes: &str) -> AdapterConfig {
        AdapterConfig {
            bucket_name: "unit-bucket".into(),
            cache_control: crate::config::DEFAULT_CACHE_CONTROL.into(),
            direct_access,
            thumbnail_sizes: thumbnails::ThumbSize::parse_list(sizes).unwrap(),
        }
    }

    fn local_adapter(dir: &TempDir, direct_access: bool, sizes: &str) -> FileAdapter {
        let bucket = LocalBucket::new(dir.path()).unwrap();
        FileAdapter::new(Arc::new(bucket), adapter_config(direct_access, sizes))
    }

    async fn collect(mut body: ByteStream) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[test]
    fn accepts_valid_filenames() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        for name in [
            "photo.jpg",
            "_hidden",
            "user@example.com",
            "My Photo ~ final-v2.png",
            "0start",
        ] {
            assert!(adapter.validate_filename(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn rejects_invalid_filenames_with_the_right_reason() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        let long = "a".repeat(129);
        match adapter.validate_filename(&long) {
            Err(FileError::InvalidFilename { reason, .. }) => assert_eq!(reason, "too long"),
            other => panic!("unexpected: {:?}", other.err()),
        }

        for name in ["", ".leading-dot", "-dash-first", "path/file.png", "emoji😀", "tab\tname"] {
            match adapter.validate_filename(name) {
                Err(FileError::InvalidFilename { reason, .. }) => {
                    assert_eq!(reason, "contains invalid characters", "{}", name)
                }
                other => panic!("`{}` unexpectedly {:?}", name, other.err()),
            }
        }

        // Exactly 128 characters is still fine.
        let edge = "a".repeat(128);
        assert!(adapter.validate_filename(&edge).is_ok());
    }

    #[test]
    fn locations_are_pure_and_switch_on_direct_access() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new("/parse", "app-1");

        let proxied = local_adapter(&dir, false, "");
        let url = proxied.get_file_location(&ctx, "my photo.png");
        assert_eq!(url, "/parse/files/app-1/my%20photo.png");
        assert_eq!(url, proxied.get_file_location(&ctx, "my photo.png"));

        let direct = local_adapter(&dir, true, "");
        assert_eq!(
            direct.get_file_location(&ctx, "my photo.png"),
            "https://storage.cloud.google.com/unit-bucket/my photo.png"
        );
    }

    #[tokio::test]
    async fn uploads_round_trip_exactly() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        let payload = Bytes::from((0..=255u8).collect::<Vec<_>>());
        adapter
            .create_file(StoredFile::new("blob.bin", payload.clone()))
            .await
            .unwrap();

        assert_eq!(adapter.get_file_data("blob.bin").await.unwrap(), payload);
    }

    #[tokio::test]
    async fn create_file_merges_metadata_and_honours_direct_access() {
        let dir = TempDir::new().unwrap();
        let bucket = Arc::new(LocalBucket::new(dir.path()).unwrap());
        let adapter = FileAdapter::new(bucket.clone(), adapter_config(false, ""));

        let options = crate::models::stored_file::UploadOptions {
            tags: HashMap::from([("owner".into(), json!("tags"))]),
            metadata: HashMap::from([
                ("owner".into(), json!("metadata")),
                ("cacheControl".into(), json!("no-store")),
            ]),
        };
        adapter
            .create_file(
                StoredFile::new("doc.txt", b"hello".to_vec())
                    .with_content_type("text/plain")
                    .with_options(options),
            )
            .await
            .unwrap();

        let stored = bucket.stored_attrs("doc.txt").await.unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
        // The computed cache-control wins over the caller's attempt.
        assert_eq!(
            stored.cache_control.as_deref(),
            Some(crate::config::DEFAULT_CACHE_CONTROL)
        );
        assert_eq!(stored.metadata.get("owner").unwrap(), "metadata");
        assert!(!stored.metadata.contains_key("cacheControl"));
        assert!(!stored.public);
    }

    #[tokio::test]
    async fn absent_files_are_not_found() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        assert!(matches!(
            adapter.delete_file("ghost.txt").await,
            Err(FileError::NotFound(_))
        ));
        assert!(matches!(
            adapter.get_file_data("ghost.txt").await,
            Err(FileError::NotFound(_))
        ));
        assert!(matches!(
            adapter.handle_file_stream("ghost.txt", "bytes=0-").await,
            Err(FileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_object() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        adapter
            .create_file(StoredFile::new("temp.txt", b"x".to_vec()))
            .await
            .unwrap();
        adapter.delete_file("temp.txt").await.unwrap();
        assert!(matches!(
            adapter.get_file_data("temp.txt").await,
            Err(FileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ranged_streams_deliver_the_exact_span_in_order() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        let payload: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        adapter
            .create_file(StoredFile::new("big.bin", payload.clone()))
            .await
            .unwrap();

        let ranged = adapter
            .handle_file_stream("big.bin", "bytes=0-99")
            .await
            .unwrap();
        assert_eq!(ranged.range.content_length(), 100);
        assert_eq!(ranged.range.content_range(), "bytes 0-99/1000");
        assert_eq!(collect(ranged.body).await.unwrap(), &payload[..100]);

        let tail = adapter
            .handle_file_stream("big.bin", "bytes=500-")
            .await
            .unwrap();
        assert_eq!(tail.range.end, 999);
        assert_eq!(tail.range.content_length(), 500);
        assert_eq!(collect(tail.body).await.unwrap(), &payload[500..]);
    }

    #[tokio::test]
    async fn full_streams_cover_the_whole_object() {
        let dir = TempDir::new().unwrap();
        let adapter = local_adapter(&dir, false, "");

        adapter
            .create_file(
                StoredFile::new("page.html", b"<html></html>".to_vec())
                    .with_content_type("text/html"),
            )
            .await
            .unwrap();

        let full = adapter.open_file_stream("page.html").await.unwrap();
        assert_eq!(full.attrs.size, 13);
        assert_eq!(full.attrs.content_type.as_deref(), Some("text/html"));
        assert_eq!(collect(full.body).await.unwrap(), b"<html></html>");
    }

    #[tokio::test]
    async fn image_uploads_produce_thumbnails_in_the_background() {
        let dir = TempDir::new().unwrap();
        let bucket = Arc::new(LocalBucket::new(dir.path()).unwrap());
        let adapter = FileAdapter::new(bucket.clone(), adapter_config(false, "4x0,0x5"));

        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(10, 10));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        adapter
            .create_file(StoredFile::new("photo.png", buf.into_inner()).with_content_type("image/png"))
            .await
            .unwrap();

        // The pipeline runs detached; wait for it to land.
        for _ in 0..100 {
            if bucket.exists("photo_thumb_0x5.png").await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(bucket.exists("photo_thumb_4x0.png").await.unwrap());
        assert!(bucket.exists("photo_thumb_0x5.png").await.unwrap());
        // The primary object keeps its non-public ACL.
        assert!(!bucket.stored_attrs("photo.png").await.unwrap().public);
        assert!(bucket.stored_attrs("photo_thumb_4x0.png").await.unwrap().public);
    }

    #[tokio::test]
    async fn non_images_and_disabled_pipelines_produce_no_derivatives() {
        let dir = TempDir::new().unwrap();
        let bucket = Arc::new(LocalBucket::new(dir.path()).unwrap());

        // Sizes configured, payload not an image.
        let adapter = FileAdapter::new(bucket.clone(), adapter_config(false, "4x0"));
        adapter
            .create_file(StoredFile::new("notes.txt", b"plain".to_vec()).with_content_type("text/plain"))
            .await
            .unwrap();
        assert!(!bucket.exists("notes_thumb_4x0.txt").await.unwrap());

        // Image payload, pipeline disabled.
        let disabled = FileAdapter::new(bucket.clone(), adapter_config(false, ""));
        disabled
            .create_file(StoredFile::new("pic.png", b"not checked".to_vec()).with_content_type("image/png"))
            .await
            .unwrap();
        assert!(!bucket.exists("pic_thumb_4x0.png").await.unwrap());
    }

    /// Bucket double whose range reads fail partway through the stream.
    struct FlakyBucket;

    #[async_trait]
    impl BucketClient for FlakyBucket {
        async fn write(&self, _: &str, _: Bytes, _: WriteOptions) -> crate::storage::BucketResult<()> {
            Ok(())
        }

        async fn read(&self, key: &str) -> crate::storage::BucketResult<Bytes> {
            Err(BucketError::NotFound(key.to_string()))
        }

        async fn read_range(
            &self,
            _: &str,
            _: u64,
            _: u64,
        ) -> crate::storage::BucketResult<ByteStream> {
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"first")),
                Err(io::Error::other("connection reset mid-stream")),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn attrs(&self, _: &str) -> crate::storage::BucketResult<ObjectAttrs> {
            Ok(ObjectAttrs {
                size: 1000,
                content_type: Some("application/octet-stream".into()),
                etag: None,
                updated: None,
            })
        }

        async fn exists(&self, _: &str) -> crate::storage::BucketResult<bool> {
            Ok(true)
        }

        async fn delete(&self, _: &str) -> crate::storage::BucketResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn mid_stream_failures_surface_as_an_error_item() {
        let adapter = FileAdapter::new(Arc::new(FlakyBucket), adapter_config(false, ""));

        let ranged = adapter
            .handle_file_stream("anything.bin", "bytes=0-99")
            .await
            .unwrap();

        let result = collect(ranged.body).await;
        assert!(result.is_err(), "stream error must terminate, not hang");
    }
}
