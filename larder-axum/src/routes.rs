use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::BytesMut;
use larder_auth::{extract_bearer_token, Claims};
use larder_blob::{
    AssetError, AssetLocator, OpenedFile, SlotKind, UploadRequest, ValidationReason,
};
use larder_core::LarderError;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{AssetState, LarderAxumError};

type HandlerResult<T> = Result<T, LarderAxumError>;

pub fn asset_router() -> Router<AssetState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/assets", get(list_assets))
        .route("/assets/reclaim", post(reclaim_orphans))
        .route("/assets/cv/link", post(mint_cv_link))
        .route(
            "/assets/{slot}",
            get(get_asset).post(upload_asset).delete(delete_asset),
        )
        .route("/uploads/{file}", get(public_file))
        .route("/download/{file}", get(download))
        .fallback(|| async { LarderAxumError::from(LarderError::not_found("Route not found")) })
}

fn require_admin(state: &AssetState, headers: &HeaderMap) -> HandlerResult<Claims> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_bearer_token(header);
    Ok(state.tokens.authorize_admin(token.as_deref())?)
}

fn multipart_error(err: MultipartError) -> LarderAxumError {
    let message = err.body_text();
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        LarderError::payload_too_large(message).into()
    } else {
        LarderError::bad_request(message).into()
    }
}

/// Pull the `file` field out of the form, stopping as soon as it outgrows
/// the slot's ceiling.
async fn read_upload(
    slot: SlotKind,
    multipart: &mut Multipart,
    max_bytes: u64,
) -> HandlerResult<UploadRequest> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = field.file_name().map(str::to_string);

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            let size_bytes = (buf.len() + chunk.len()) as u64;
            if size_bytes > max_bytes {
                let reason = ValidationReason::TooLarge {
                    size_bytes,
                    max_bytes,
                };
                return Err(AssetError::validation(slot, reason).into());
            }
            buf.extend_from_slice(&chunk);
        }

        let request = UploadRequest::new(slot, mime_type, buf.freeze());
        return Ok(match file_name {
            Some(name) => request.with_original_name(name),
            None => request,
        });
    }

    Err(LarderError::bad_request("Missing 'file' field")
        .with_errors(json!({ "file": ["required"] }))
        .into())
}

async fn upload_asset(
    State(state): State<AssetState>,
    Path(slot): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> HandlerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let slot: SlotKind = slot.parse()?;
    let mut multipart = multipart.map_err(|r| LarderError::bad_request(r.body_text()))?;

    let max_bytes = state.coordinator.config().max_bytes(slot);
    let request = read_upload(slot, &mut multipart, max_bytes).await?;
    let locator = state.coordinator.upload(request).await?;

    Ok(Json(json!({ "url": locator.url })))
}

async fn delete_asset(
    State(state): State<AssetState>,
    Path(slot): Path<String>,
    headers: HeaderMap,
) -> HandlerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let slot: SlotKind = slot.parse()?;
    state.coordinator.remove(slot).await?;
    Ok(Json(json!({ "success": true })))
}

fn url_of(locator: Option<&AssetLocator>) -> Value {
    locator.map_or(Value::Null, |l| Value::String(l.url.clone()))
}

async fn list_assets(State(state): State<AssetState>) -> HandlerResult<Json<Value>> {
    let assets = state.coordinator.all().await?;
    let slots: Map<String, Value> = SlotKind::ALL
        .into_iter()
        .map(|slot| (slot.as_str().to_string(), url_of(assets.slot(slot))))
        .collect();
    Ok(Json(Value::Object(slots)))
}

async fn get_asset(
    State(state): State<AssetState>,
    Path(slot): Path<String>,
) -> HandlerResult<Json<Value>> {
    let slot: SlotKind = slot.parse()?;
    let current = state.coordinator.current(slot).await?;
    Ok(Json(json!({
        "slot": slot.as_str(),
        "url": url_of(current.as_ref()),
    })))
}

async fn mint_cv_link(
    State(state): State<AssetState>,
    headers: HeaderMap,
) -> HandlerResult<Json<Value>> {
    let claims = require_admin(&state, &headers)?;

    let locator = state
        .coordinator
        .current(SlotKind::Cv)
        .await?
        .ok_or_else(|| LarderError::not_found("No CV has been uploaded"))?;
    let file = locator
        .local_path()
        .and_then(|p| p.strip_prefix("private/"))
        .ok_or_else(|| LarderError::general_error("CV is not stored as a private file"))?;

    let issued = state.tokens.issue_download(&claims.sub, file)?;
    tracing::info!(file = %file, expires_at = %issued.expires_at, "minted download link");

    Ok(Json(json!({
        "url": format!("{}?token={}", locator.url, issued.token),
        "expiresAt": issued.expires_at.to_rfc3339(),
    })))
}

async fn reclaim_orphans(
    State(state): State<AssetState>,
    headers: HeaderMap,
) -> HandlerResult<Json<Value>> {
    require_admin(&state, &headers)?;
    let reclaimed = state.coordinator.reclaim_orphans().await?;
    Ok(Json(json!({ "reclaimed": reclaimed })))
}

/// Fixed-name branding files. The content type comes from the registry,
/// since the file on disk carries no extension.
async fn public_file(
    State(state): State<AssetState>,
    Path(file): Path<String>,
) -> HandlerResult<Response> {
    let not_found = || LarderError::not_found(format!("No such file: {file}"));

    let slot = SlotKind::for_public_file(&file).ok_or_else(not_found)?;
    let locator = state.coordinator.current(slot).await?.ok_or_else(not_found)?;
    let path = locator.local_path().ok_or_else(not_found)?;
    let opened = state
        .coordinator
        .disk()
        .open(path)
        .await?
        .ok_or_else(not_found)?;

    let content_type = locator
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    stream_file(opened, content_type, None, "no-cache")
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    token: Option<String>,
}

/// Token-gated read of a private file. The token is checked before any
/// filesystem access; a valid token for a missing file is a 404.
async fn download(
    State(state): State<AssetState>,
    Path(file): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> HandlerResult<Response> {
    state.tokens.authorize_download(query.token.as_deref(), &file)?;

    let relative_path = format!("private/{file}");
    let opened = state
        .coordinator
        .disk()
        .open(&relative_path)
        .await?
        .ok_or_else(|| LarderError::not_found(format!("No such file: {file}")))?;

    let current = state.coordinator.current(SlotKind::Cv).await?;
    let content_type = download_content_type(current.as_ref(), &relative_path);
    stream_file(opened, &content_type, Some(file.as_str()), "private, no-store")
}

/// The type recorded at upload time for the current CV; anything older is
/// guessed from its name.
fn download_content_type(current: Option<&AssetLocator>, relative_path: &str) -> String {
    current
        .filter(|locator| locator.local_path() == Some(relative_path))
        .and_then(|locator| locator.content_type.clone())
        .unwrap_or_else(|| {
            mime_guess::from_path(relative_path)
                .first_or_octet_stream()
                .to_string()
        })
}

fn stream_file(
    opened: OpenedFile,
    content_type: &str,
    attachment: Option<&str>,
    cache_control: &'static str,
) -> HandlerResult<Response> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, opened.size_bytes)
        .header(header::CACHE_CONTROL, cache_control);

    if let Ok(value) = HeaderValue::from_str(content_type) {
        builder = builder.header(header::CONTENT_TYPE, value);
    }
    if let Some(name) = attachment {
        let disposition = format!("attachment; filename=\"{name}\"");
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            builder = builder.header(header::CONTENT_DISPOSITION, value);
        }
    }

    builder
        .body(Body::from_stream(opened.stream))
        .map_err(|e| LarderAxumError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_blob::AssetHandle;

    #[test]
    fn download_type_prefers_the_recorded_one() {
        let current = AssetLocator::new(
            "/download/cv-1.pdf",
            AssetHandle::Local {
                path: "private/cv-1.pdf".to_string(),
            },
        )
        .with_content_type("application/pdf");

        assert_eq!(
            download_content_type(Some(&current), "private/cv-1.pdf"),
            "application/pdf"
        );
        assert_eq!(
            download_content_type(Some(&current), "private/cv-0.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(
            download_content_type(None, "private/cv-0.odt"),
            "application/vnd.oasis.opendocument.text"
        );
        assert_eq!(download_content_type(None, "private/cv-0"), "application/octet-stream");
    }
}
