//! Image endpoints: random slideshow pick, thumbnails, raw bytes, uploads
//! and admin mutations.

use crate::{
    errors::AppError,
    handlers::extractors::{CurrentSession, RequestOrigin},
    models::{image::Image, session::Role},
    services::{
        access_control::{AccessError, resolve_eligible_images},
        paths::{self, UPLOADS_URL_PREFIX},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct RandomImageQuery {
    pub folder: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub folder: String,
    pub url: String,
    pub thumbnail: String,
}

impl ImagePayload {
    fn new(image: &Image, origin: &RequestOrigin) -> Self {
        let path = format!("{}{}", UPLOADS_URL_PREFIX, paths::encode_path(&image.id));
        let thumbnail = format!(
            "/api/images/{}/thumbnail",
            paths::encode_component(&image.id)
        );
        Self {
            id: image.id.clone(),
            filename: image.filename().to_string(),
            url: origin.url(&path),
            thumbnail: origin.url(&thumbnail),
            folder: image.folder.clone(),
            path,
        }
    }
}

/// `GET /api/random-image?folder=`
pub async fn random_image(
    State(state): State<AppState>,
    current: CurrentSession,
    origin: RequestOrigin,
    Query(query): Query<RandomImageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let images = state.index.get_all_images(false).await;
    let requester = current.requester();
    let pool = resolve_eligible_images(&images, &requester, query.folder.as_deref())?;
    let image = state
        .selector
        .select(&pool)
        .ok_or(AccessError::NoImagesFound)?;

    debug!(image = %image.id, pool = pool.len(), "serving random image");
    Ok(Json(json!({
        "success": true,
        "image": ImagePayload::new(&image, &origin),
    })))
}

/// `GET /api/images/{id}/thumbnail`
pub async fn image_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.images.thumbnail(&id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    ))
}

/// `GET /uploads/{*path}`
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (file, len, content_type) = state.images.open(&path).await?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        body,
    ))
}

/// `POST /api/upload` (multipart, field `images`)
///
/// Files are stored one by one. When some fail after others were stored,
/// the answer is 207 listing both, the way batch deletion reports.
pub async fn upload_images(
    State(state): State<AppState>,
    current: CurrentSession,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    current.require_roles(&[Role::Admin, Role::Guest])?;

    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut first_error: Option<AppError> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                errors.push(format!("Upload interrupted: {}", err.body_text()));
                if first_error.is_none() {
                    first_error = Some(err.into());
                }
                break;
            }
        };
        if field.name() != Some("images") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let stream = field.map_err(io::Error::other);
        match state.images.upload_stream(&original_name, stream).await {
            Ok(file) => files.push(file),
            Err(err) => {
                warn!("failed to store upload {}: {}", original_name, err);
                errors.push(format!("{}: {}", original_name, err));
                if first_error.is_none() {
                    first_error = Some(err.into());
                }
            }
        }
    }

    if files.is_empty() {
        return Err(first_error.unwrap_or_else(|| AppError::bad_request("No files uploaded")));
    }
    info!(count = files.len(), failed = errors.len(), "upload complete");
    if !errors.is_empty() {
        return Ok((
            StatusCode::MULTI_STATUS,
            Json(json!({
                "success": false,
                "message": format!("Uploaded {} image(s), {} failed", files.len(), errors.len()),
                "files": files,
                "errors": errors,
            })),
        ));
    }
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Images uploaded successfully",
            "files": files,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

/// `DELETE /api/images?path=`
pub async fn delete_image(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Image path is required"))?;
    let id = state.images.delete(&path).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Image deleted successfully",
        "path": id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// `DELETE /api/images/batch`. Answers 207 when some deletions failed.
pub async fn batch_delete_images(
    State(state): State<AppState>,
    current: CurrentSession,
    WithRejection(Json(request), _): WithRejection<Json<BatchDeleteRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let result = state.images.batch_delete(&request.paths).await?;
    let status = if result.failed_count > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    let message = format!(
        "Deleted {} image(s), {} failed",
        result.deleted_count, result.failed_count
    );
    Ok((
        status,
        Json(json!({
            "success": result.failed_count == 0,
            "message": message,
            "deletedCount": result.deleted_count,
            "failedCount": result.failed_count,
            "errors": result.errors,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub path: Option<String>,
    pub angle: Option<i32>,
}

/// `POST /api/images/rotate`
pub async fn rotate_image(
    State(state): State<AppState>,
    current: CurrentSession,
    WithRejection(Json(request), _): WithRejection<Json<RotateRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let path = request
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Image path is required"))?;
    let angle = request.angle.unwrap_or(90);
    let id = state.images.rotate(&path, angle).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Image rotated {} degrees", angle),
        "path": id,
    })))
}
