//! HTTP handlers for file upload, download, streaming, and deletion.
//! Bodies stream through the adapter to avoid buffering whole objects in
//! memory; storage concerns stay behind `FileAdapter`.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{context::AppContext, stored_file::StoredFile},
    services::{
        byte_range::RangeError,
        file_adapter::{FileError, RangedStream},
    },
    storage::ObjectAttrs,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;

/// PUT `/files/{app_id}/{filename}` — upload a file.
///
/// The response carries the location the host should hand to clients, which
/// is the direct bucket URL or the proxied route depending on configuration.
pub async fn upload_file(
    State(state): State<AppState>,
    Path((app_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.adapter.validate_filename(&filename)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let mut file = StoredFile::new(filename.clone(), body);
    file.content_type = content_type;
    state.adapter.create_file(file).await?;

    let ctx = AppContext::new(state.mount.clone(), app_id);
    let location = state.adapter.get_file_location(&ctx, &filename);
    Ok((StatusCode::CREATED, Json(json!({ "url": location }))))
}

/// GET `/files/{app_id}/{filename}` — download a file.
///
/// With a `Range` header this is a 206 partial-content response streamed
/// from the bucket; without one the whole object streams back as a 200.
pub async fn get_file(
    State(state): State<AppState>,
    Path((_app_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.adapter.validate_filename(&filename)?;

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    match range_header {
        Some(raw) => match state.adapter.handle_file_stream(&filename, raw).await {
            Ok(ranged) => Ok(partial_content_response(ranged)),
            Err(FileError::Range(RangeError::Unsatisfiable { total_size, .. })) => {
                Ok(unsatisfiable_response(total_size))
            }
            Err(err) => Err(err.into()),
        },
        None => {
            let full = state.adapter.open_file_stream(&filename).await?;
            let mut response = Response::new(Body::from_stream(full.body));
            *response.status_mut() = StatusCode::OK;
            set_object_headers(response.headers_mut(), &full.attrs);
            Ok(response)
        }
    }
}

/// HEAD `/files/{app_id}/{filename}` — same headers as GET but no body.
pub async fn head_file(
    State(state): State<AppState>,
    Path((_app_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    state.adapter.validate_filename(&filename)?;

    let attrs = state.adapter.get_file_attrs(&filename).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &attrs);
    Ok(response)
}

/// DELETE `/files/{app_id}/{filename}` — delete a file.
pub async fn delete_file(
    State(state): State<AppState>,
    Path((_app_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.adapter.validate_filename(&filename)?;
    state.adapter.delete_file(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn partial_content_response(ranged: RangedStream) -> Response {
    let mut response = Response::new(Body::from_stream(ranged.body));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&ranged.range.content_length().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) = HeaderValue::from_str(&ranged.range.content_range()) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&ranged.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    response
}

fn unsatisfiable_response(total_size: u64) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total_size)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

fn set_object_headers(headers: &mut HeaderMap, attrs: &ObjectAttrs) {
    let content_type = attrs
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&attrs.size.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = attrs.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Some(updated) = attrs.updated {
        if let Ok(value) = HeaderValue::from_str(&updated.to_rfc2822()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
