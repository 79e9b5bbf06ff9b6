use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use mime::Mime;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::state::AppState;

fn multipart_err(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// `POST /api/media`
///
/// Stores the first `file` part and returns its public URL.
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type: Mime = field
            .content_type()
            .and_then(|ct| ct.parse().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);
        let data = field.bytes().await.map_err(multipart_err)?;

        let url = state.media.store(data, &content_type).await?;
        tracing::info!(user = %user, %url, "media uploaded");
        return Ok((StatusCode::CREATED, Json(json!({ "url": url }))));
    }
    Err(ApiError::bad_request("multipart field 'file' is required"))
}
