//! Folder endpoints. The tree and thumbnails are public for the slideshow;
//! listing and mutation are admin-only.

use crate::{
    errors::AppError, handlers::extractors::CurrentSession,
    handlers::image_handlers::PathQuery, state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::json;

/// `GET /api/folders`
pub async fn folder_structure(State(state): State<AppState>) -> impl IntoResponse {
    let folders = state.folders.structure().await;
    Json(json!({ "success": true, "folders": folders }))
}

/// `GET /api/folders/{path}/thumbnail`
pub async fn folder_thumbnail(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.folders.thumbnail(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes.as_ref().clone(),
    ))
}

/// `GET /api/admin/folders?path=`
pub async fn list_folder(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let listing = state
        .folders
        .list(query.path.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(json!({
        "success": true,
        "currentPath": listing.current_path,
        "folders": listing.folders,
        "files": listing.files,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default, alias = "path")]
    pub parent: String,
    #[serde(default)]
    pub name: String,
}

/// `POST /api/admin/folders`
pub async fn create_folder(
    State(state): State<AppState>,
    current: CurrentSession,
    WithRejection(Json(request), _): WithRejection<Json<CreateFolderRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    if request.name.trim().is_empty() {
        return Err(AppError::bad_request("Folder name is required"));
    }
    let folder = state.folders.create(&request.parent, &request.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Folder created successfully",
            "folder": folder,
        })),
    ))
}

/// `DELETE /api/admin/folders?path=`
pub async fn delete_folder(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Folder path is required"))?;
    let deleted = state.folders.delete(&path).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Folder deleted successfully",
        "path": deleted,
    })))
}
