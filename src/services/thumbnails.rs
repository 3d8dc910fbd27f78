//! Thumbnail derivation pipeline.
//!
//! On image uploads the adapter hands the original payload here. Each
//! configured `WxH` size produces one derivative object next to the primary
//! one, named `{stem}_thumb_{size}{ext}`. Sizes are processed sequentially:
//! a derivative's upload completes before the next decode starts, which
//! bounds peak memory and backend write concurrency at one derivative.

use bytes::Bytes;
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::models::stored_file::StoredFile;
use crate::storage::{BucketClient, BucketError, WriteOptions};

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Bucket(#[from] BucketError),
}

/// One `WxH` target. A `0` component leaves that axis unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbSize {
    /// Original spec string, kept verbatim for derivative naming.
    pub spec: String,
    pub width: u32,
    pub height: u32,
}

impl ThumbSize {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (raw_w, raw_h) = spec
            .split_once('x')
            .ok_or_else(|| format!("size `{}` is not of the form WxH", spec))?;
        let width: u32 = raw_w
            .parse()
            .map_err(|_| format!("size `{}` has a non-numeric width", spec))?;
        let height: u32 = raw_h
            .parse()
            .map_err(|_| format!("size `{}` has a non-numeric height", spec))?;
        Ok(Self {
            spec: spec.to_string(),
            width,
            height,
        })
    }

    /// Parse a comma-separated size list. An empty string yields no sizes,
    /// which disables the pipeline.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Whether an upload should enter the pipeline: explicit content type wins,
/// otherwise the MIME type is sniffed from the filename extension.
pub fn is_image(filename: &str, content_type: Option<&str>) -> bool {
    content_type
        .filter(|ct| !ct.is_empty())
        .or_else(|| mime_guess::from_path(filename).first_raw())
        .is_some_and(|ct| ct.starts_with("image/"))
}

/// Derivative object name: the size marker is inserted before the extension.
pub fn thumbnail_object_name(filename: &str, size: &ThumbSize) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_thumb_{}.{}", stem, size.spec, ext),
        None => format!("{}_thumb_{}", stem, size.spec),
    }
}

/// Run the whole pipeline for one upload.
///
/// Sizes run in configured order; a failing size aborts the remaining ones.
/// Callers treat the result as a side channel — it never feeds back into the
/// primary upload's outcome.
pub async fn generate_thumbnails(
    bucket: &dyn BucketClient,
    file: &StoredFile,
    sizes: &[ThumbSize],
) -> Result<(), ThumbnailError> {
    for size in sizes {
        generate_thumbnail(bucket, file, size).await?;
    }
    Ok(())
}

async fn generate_thumbnail(
    bucket: &dyn BucketClient,
    file: &StoredFile,
    size: &ThumbSize,
) -> Result<(), ThumbnailError> {
    let name = thumbnail_object_name(&file.filename, size);

    let format = image::guess_format(&file.data)?;
    let original = image::load_from_memory(&file.data)?;

    let resized = match (size.width, size.height) {
        (0, 0) => original,
        (w, 0) => original.resize(w, u32::MAX, FilterType::Lanczos3),
        (0, h) => original.resize(u32::MAX, h, FilterType::Lanczos3),
        (w, h) => original.resize_to_fill(w, h, FilterType::Lanczos3),
    };

    let mut encoded = Cursor::new(Vec::new());
    resized.write_to(&mut encoded, format)?;

    let content_type = file.content_type.clone().or_else(|| {
        mime_guess::from_path(&file.filename)
            .first_raw()
            .map(str::to_string)
    });

    // Derivatives are always publicly readable, independent of the primary
    // object's access mode, and carry the caller merge without the computed
    // cache-control override.
    let opts = WriteOptions {
        content_type,
        cache_control: None,
        metadata: file.options.merged_metadata(),
        public: true,
    };

    bucket.write(&name, Bytes::from(encoded.into_inner()), opts).await?;

    debug!(
        original = %file.filename,
        derivative = %name,
        width = resized.width(),
        height = resized.height(),
        "wrote thumbnail"
    );
    Ok(())
}
