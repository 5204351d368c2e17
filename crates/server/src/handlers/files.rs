//! File upload, download and lookup endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use depot_core::{FileRecord, FileResponse};
use depot_storage::{StorageError, StorageResult};
use futures::SinkExt;
use futures::channel::mpsc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::sync::CancellationToken;

/// Multipart field carrying the file content.
pub const FILE_FIELD: &str = "file";

/// Optional multipart field overriding the part's filename.
pub const NAME_FIELD: &str = "name";

/// Body parts buffered between the request and the content store.
const UPLOAD_CHANNEL_DEPTH: usize = 8;

/// RFC 5987 `attr-char`: everything outside it is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

fn bad_multipart(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    tracing::debug!(error = %e, "malformed multipart body");
    ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
}

fn too_large() -> ApiError {
    ApiError::PayloadTooLarge("upload exceeds the maximum allowed size".to_string())
}

/// POST /v1/files - Upload a file as `multipart/form-data`.
///
/// The `file` part is streamed into the content store as it arrives. A
/// `name` part sent before it replaces the part's filename.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FileResponse>)> {
    let mut name_override: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(NAME_FIELD) => {
                name_override = Some(field.text().await.map_err(bad_multipart)?);
            }
            Some(FILE_FIELD) => {
                let name = name_override
                    .take()
                    .or_else(|| field.file_name().map(str::to_owned))
                    .unwrap_or_default();
                let record = store_field(&state, &name, field).await?;
                tracing::info!(
                    external_id = %record.external_id,
                    size = record.size,
                    "upload complete"
                );
                return Ok((StatusCode::CREATED, Json(FileResponse::from(&record))));
            }
            other => {
                tracing::debug!(field = ?other, "ignoring multipart field");
            }
        }
    }

    Err(ApiError::BadRequest(format!(
        "multipart body has no '{FILE_FIELD}' field"
    )))
}

/// Pump one multipart field into the write path through a bounded channel.
async fn store_field(state: &AppState, name: &str, mut field: Field<'_>) -> ApiResult<FileRecord> {
    let (mut tx, rx) = mpsc::channel::<StorageResult<Bytes>>(UPLOAD_CHANNEL_DEPTH);

    // Resolves to true if the body hit the upload size limit.
    let pump = async move {
        loop {
            let (item, over_limit) = match field.chunk().await {
                Ok(Some(bytes)) => (Ok(bytes), false),
                Ok(None) => return false,
                Err(e) => {
                    let over_limit = e.status() == StatusCode::PAYLOAD_TOO_LARGE;
                    (Err(StorageError::UploadStream(e.body_text())), over_limit)
                }
            };
            let failed = item.is_err();
            // A send error means the write path stopped reading.
            if tx.send(item).await.is_err() || failed {
                return over_limit;
            }
        }
    };

    let (over_limit, result) = tokio::join!(pump, state.files.save_file(name, Box::pin(rx)));
    match result {
        Err(_) if over_limit => Err(too_large()),
        other => other,
    }
}

/// GET /v1/files/{external_id} - Download a file's content.
pub async fn download_file(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Response> {
    // Dropping this handler (client disconnect, request timeout) cancels the fetch.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let (record, data) = state.files.retrieve_file(&external_id, &cancel).await?;

    Ok((
        StatusCode::OK,
        [
            (
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (CONTENT_LENGTH, HeaderValue::from(data.len())),
            (CONTENT_DISPOSITION, content_disposition(&record.name)?),
        ],
        Body::from(data),
    )
        .into_response())
}

/// GET /v1/files/{external_id}/metadata - Look up a file's record.
pub async fn get_file_metadata(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<FileResponse>> {
    let record = state.files.find_file(&external_id).await?;
    Ok(Json(FileResponse::from(&record)))
}

/// Build an `attachment` disposition with an ASCII fallback and an RFC 5987
/// encoded UTF-8 name.
fn content_disposition(name: &str) -> ApiResult<HeaderValue> {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let encoded = utf8_percent_encode(name, ATTR_CHAR);

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .map_err(|_| ApiError::Internal("internal error".to_string()))
}
