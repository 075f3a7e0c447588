//! Access account administration and PIN sessions.

use crate::{
    errors::AppError,
    handlers::extractors::{ClientAddr, CurrentSession, removal_cookie, session_cookie},
    models::account::AccountSummary,
    services::account_store::AccountInput,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::{WithRejection, cookie::CookieJar};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pin: String,
    #[serde(default)]
    pub assigned_folders: Vec<String>,
}

impl From<AccountRequest> for AccountInput {
    fn from(request: AccountRequest) -> Self {
        Self {
            name: request.name,
            pin: request.pin,
            assigned_folders: request.assigned_folders,
        }
    }
}

/// `GET /api/access-accounts`
pub async fn list_accounts(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let accounts = state.accounts.list().await;
    Ok(Json(json!({ "success": true, "accounts": accounts })))
}

/// `POST /api/access-accounts`
pub async fn create_account(
    State(state): State<AppState>,
    current: CurrentSession,
    WithRejection(Json(request), _): WithRejection<Json<AccountRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let account = state.accounts.create(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "account": account })),
    ))
}

/// `PUT /api/access-accounts/{id}`
pub async fn update_account(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
    WithRejection(Json(request), _): WithRejection<Json<AccountRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    let account = state.accounts.update(&id, request.into()).await?;
    Ok(Json(json!({ "success": true, "account": account })))
}

/// `DELETE /api/access-accounts/{id}`
pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    current.require_admin()?;
    state.accounts.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Account deleted successfully",
    })))
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    #[serde(default)]
    pub pin: String,
}

/// `POST /api/auth/pin`
pub async fn pin_login(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    current: CurrentSession,
    jar: CookieJar,
    WithRejection(Json(request), _): WithRejection<Json<PinRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.pin_auth.authenticate(&client, &request.pin).await?;

    let stored = account.clone();
    let id = state
        .sessions
        .rotate(current.id, move |s| s.access_account = Some(stored));
    let jar = jar.add(session_cookie(id, state.sessions.max_age()));

    Ok((
        jar,
        Json(json!({ "success": true, "account": account })),
    ))
}

/// `GET /api/auth/session`
pub async fn pin_session_status(current: CurrentSession) -> impl IntoResponse {
    let account: Option<AccountSummary> = current
        .session
        .as_ref()
        .and_then(|s| s.access_account.clone());
    Json(json!({
        "success": true,
        "authenticated": account.is_some(),
        "account": account,
    }))
}

/// `DELETE /api/auth/session`. Drops the PIN account; a role login held by
/// the same session survives.
pub async fn clear_pin_session(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
) -> impl IntoResponse {
    let Some(id) = current.id else {
        return (jar.remove(removal_cookie()), Json(json!({ "success": true })));
    };

    if current.role().is_some() {
        state.sessions.upsert(Some(id), |s| s.access_account = None);
        return (jar, Json(json!({ "success": true })));
    }

    state.sessions.destroy(&id);
    info!("cleared PIN session");
    (jar.remove(removal_cookie()), Json(json!({ "success": true })))
}
