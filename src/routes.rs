//! HTTP handlers and the admin gate middleware.

use std::{collections::HashMap, slice, sync::Arc};

use axum::{
    Json,
    extract::{Multipart, Path, Request, State},
    http::{Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::{
    error::AppError,
    ordering::{self, EventImage, ORDER_TAG_PREFIX},
    session,
    state::AppState,
    store::StoreError,
};

/// Per-file upload ceiling.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Fixed delay before reporting a failed login.
const FAILED_LOGIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    public_id: String,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    images: Vec<String>,
}

/// Gates non-GET requests behind the admin session cookie.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() != Method::GET {
        let token = session::cookie_token(request.headers()).ok_or(AppError::Unauthorized)?;
        if !state.sessions.validate(&token) {
            return Err(AppError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.events.all())
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(no): Path<String>,
) -> Result<Response, AppError> {
    let event = state
        .events
        .find(&no)
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    Ok(Json(event).into_response())
}

/// Cached, ordered image list for an event. Falls back to a stale cache entry
/// when the media store rate-limits us; without one the 429 is passed on.
pub async fn get_event_images(
    State(state): State<Arc<AppState>>,
    Path(no): Path<String>,
) -> Result<Json<Vec<EventImage>>, AppError> {
    if let Some(images) = state.cache.get(&no) {
        return Ok(Json(images));
    }

    match state.store.search(&no).await {
        Ok(resources) => {
            let images = ordering::sort_by_order(resources);
            state.cache.set(&no, images.clone());
            Ok(Json(images))
        }
        Err(StoreError::Throttled) => match state.cache.get_stale(&no) {
            Some(images) => {
                warn!(event = %no, "Serving stale images, image host is rate limiting");
                Ok(Json(images))
            }
            None => Err(AppError::Throttled),
        },
        Err(err) => Err(err.into()),
    }
}

/// Multipart upload of one or more files into an event's folder.
///
/// Files upload concurrently; the first failure aborts the batch and already
/// uploaded files stay in the store (no rollback).
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    Path(no): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload body: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read {file_name}: {e}")))?;

        if bytes.len() > MAX_FILE_BYTES {
            return Err(AppError::Validation(format!(
                "{file_name} exceeds the 10 MiB upload limit"
            )));
        }

        files.push((file_name, bytes));
    }

    if files.is_empty() {
        return Err(AppError::Validation("No files provided".to_string()));
    }

    let uploads = files.into_iter().map(|(file_name, bytes)| {
        let store = state.store.clone();
        let no = no.clone();
        async move { store.upload(&no, &file_name, bytes.to_vec()).await }
    });

    let uploaded = try_join_all(uploads).await?;
    state.cache.invalidate(&no);

    let images: Vec<EventImage> = uploaded
        .into_iter()
        .map(|image| EventImage {
            public_id: image.public_id,
            secure_url: image.secure_url,
        })
        .collect();

    info!(event = %no, count = images.len(), "Uploaded event images");
    Ok(Json(json!({ "images": images })).into_response())
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(no): Path<String>,
    Json(request): Json<DeleteRequest>,
) -> Result<Response, AppError> {
    if request.public_id.is_empty() {
        return Err(AppError::Validation("No public ID provided".to_string()));
    }

    state.store.destroy(&request.public_id).await?;
    state.cache.invalidate(&no);

    info!(event = %no, public_id = %request.public_id, "Deleted event image");
    Ok(Json(json!({ "success": true })).into_response())
}

/// Applies a full target ordering to an event's image set.
///
/// Every requested id must exist in the store's current set; otherwise the
/// whole request is rejected before any tag is touched. Stale order tags are
/// pruned before the new position tag is written, so each image ends up with
/// exactly one `order_<position>` tag. Tag writes run concurrently per image.
pub async fn reorder_images(
    State(state): State<Arc<AppState>>,
    Path(no): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Response, AppError> {
    if request.images.is_empty() {
        return Err(AppError::Validation("No images provided".to_string()));
    }

    let current = state.store.search(&no).await?;
    let tags_by_id: HashMap<&str, &Vec<String>> = current
        .iter()
        .map(|image| (image.public_id.as_str(), &image.tags))
        .collect();

    for id in &request.images {
        if !tags_by_id.contains_key(id.as_str()) {
            return Err(AppError::NotFound(format!(
                "Image {id} is not part of event {no}"
            )));
        }
    }

    let writes = request.images.iter().enumerate().map(|(position, id)| {
        let store = state.store.clone();
        let stale_tags: Vec<String> = tags_by_id[id.as_str()]
            .iter()
            .filter(|tag| tag.starts_with(ORDER_TAG_PREFIX))
            .cloned()
            .collect();

        async move {
            for tag in &stale_tags {
                store.remove_tag(tag, slice::from_ref(id)).await?;
            }
            store.add_tag(&ordering::order_tag(position), slice::from_ref(id)).await
        }
    });

    try_join_all(writes).await?;
    state.cache.invalidate(&no);

    info!(event = %no, count = request.images.len(), "Reordered event images");
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let digest = hex::encode(Sha256::digest(request.password.trim().as_bytes()));

    if digest != state.config.admin_password_hash {
        // Blunt brute-force probing with a fixed delay.
        sleep(FAILED_LOGIN_DELAY).await;
        return Err(AppError::Unauthorized);
    }

    let token = state.sessions.issue();
    let cookie = session::session_cookie(&token, state.config.secure_cookies);

    info!("Admin session issued");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
        .into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    state.sessions.revoke();

    (
        [(
            header::SET_COOKIE,
            session::clear_cookie(state.config.secure_cookies),
        )],
        Json(json!({ "success": true })),
    )
        .into_response()
}
