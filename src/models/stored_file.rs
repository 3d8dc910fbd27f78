//! Represents one file upload and its caller-supplied options.

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

/// Content type recorded when the caller supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Keys carried as first-class object attributes rather than custom metadata.
const RESERVED_KEYS: [&str; 2] = ["cacheControl", "contentType"];

/// A file handed to the adapter for upload.
///
/// Transient: created per request and dropped once the upload returns; the
/// bucket is the system of record.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Identifier, unique within the bucket namespace. Must pass filename
    /// validation before reaching any bucket operation.
    pub filename: String,

    /// Raw payload.
    pub data: Bytes,

    /// MIME type; falls back to [`DEFAULT_CONTENT_TYPE`] at write time.
    pub content_type: Option<String>,

    /// Caller-supplied tag/metadata mappings.
    pub options: UploadOptions,
}

/// Two independent, loosely-typed key/value mappings supplied by the caller.
///
/// Both are opaque to the adapter; they are merged by simple override, not
/// interpreted as a schema.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub tags: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
}

impl StoredFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            content_type: None,
            options: UploadOptions::default(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Effective content type for the primary object.
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

impl UploadOptions {
    /// Merge tags and metadata into one stringified mapping, metadata winning
    /// on key collision. `cacheControl` and `contentType` are stripped: those
    /// travel as first-class attributes, so the stored object always carries
    /// exactly one value for each.
    pub fn merged_metadata(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for (key, value) in self.tags.iter().chain(self.metadata.iter()) {
            merged.insert(key.clone(), stringify(value));
        }
        for reserved in RESERVED_KEYS {
            merged.remove(reserved);
        }
        merged
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
