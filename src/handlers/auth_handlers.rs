//! Role logins: admin password, QR-code guest uploads, slideshow displays.

use crate::{
    errors::AppError,
    handlers::extractors::{CurrentSession, removal_cookie, session_cookie},
    models::session::Role,
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::{WithRejection, cookie::CookieJar};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// Compare against the configured admin password, which is either plain
/// text or a bcrypt hash.
pub fn verify_admin_password(configured: &str, candidate: &str) -> bool {
    if configured.starts_with("$2") {
        bcrypt::verify(candidate, configured).unwrap_or_else(|err| {
            warn!("admin password hash could not be checked: {}", err);
            false
        })
    } else {
        configured == candidate
    }
}

fn grant_role(state: &AppState, current: &CurrentSession, jar: CookieJar, role: Role) -> CookieJar {
    let now = Utc::now();
    let id = state.sessions.rotate(current.id, |s| {
        s.role = Some(role);
        s.login_time = Some(now);
    });
    jar.add(session_cookie(id, state.sessions.max_age()))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    if request.password.is_empty() {
        return Err(AppError::bad_request("Password is required"));
    }

    let configured = state.config.admin_password.clone();
    let candidate = request.password;
    let valid = task::spawn_blocking(move || verify_admin_password(&configured, &candidate))
        .await
        .map_err(|err| AppError::internal(format!("password check failed: {}", err)))?;
    if !valid {
        warn!("failed admin login");
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "Invalid password",
        ));
    }

    let jar = grant_role(&state, &current, jar, Role::Admin);
    info!("admin logged in");
    Ok((
        jar,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "role": Role::Admin,
        })),
    ))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(id) = current.id {
        state.sessions.destroy(&id);
    }
    (
        jar.remove(removal_cookie()),
        Json(json!({ "success": true, "message": "Logged out" })),
    )
}

/// `GET /api/auth/status`
pub async fn auth_status(current: CurrentSession) -> impl IntoResponse {
    let session = current.session.as_ref();
    Json(json!({
        "authenticated": current.role().is_some(),
        "role": current.role(),
        "loginTime": session.and_then(|s| s.login_time),
    }))
}

/// `GET /qr-upload`: guest session for event uploads.
pub async fn qr_upload(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
) -> impl IntoResponse {
    // an admin scanning the code keeps their role
    if current.role() == Some(Role::Admin) {
        return (jar, Redirect::to("/upload"));
    }
    let jar = grant_role(&state, &current, jar, Role::Guest);
    info!("guest session granted via QR code");
    (jar, Redirect::to("/upload"))
}

/// `GET /slideshow-login`
pub async fn slideshow_login(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
) -> impl IntoResponse {
    if current.role() == Some(Role::Admin) {
        return (jar, Redirect::to("/slideshow"));
    }
    let jar = grant_role(&state, &current, jar, Role::Slideshow);
    (jar, Redirect::to("/slideshow"))
}
