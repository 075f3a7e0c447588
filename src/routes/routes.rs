//! Route table for the photo frame API.
//!
//! ## Structure
//! - **Health**: `GET /healthz`, `GET /api/health`, `GET /readyz`
//! - **Slideshow (public)**
//!   - `GET /api/random-image`, `GET /api/images/random`: random pick, `?folder=`
//!   - `GET /api/images/{id}/thumbnail`, `GET /uploads/{*path}`
//!   - `GET /api/folders`, `GET /api/folders/{path}/thumbnail`
//! - **Uploads (admin or guest)**: `POST /api/upload`
//! - **Admin**
//!   - `DELETE /api/images?path=`, `DELETE /api/images/batch`, `POST /api/images/rotate`
//!   - `GET|POST|DELETE /api/admin/folders`
//!   - `GET|POST /api/access-accounts`, `PUT|DELETE /api/access-accounts/{id}`
//! - **Auth**
//!   - `POST /api/auth/pin`, `GET|DELETE /api/auth/session`
//!   - `POST /api/auth/login`, `POST /api/auth/logout`, `GET /api/auth/status`
//!   - `GET /qr-upload`, `GET /slideshow-login`
//!
//! Ids and folder paths inside a single `{segment}` are percent-encoded, so
//! `family/a.jpg` travels as `family%2Fa.jpg`.

use crate::{
    handlers::{
        account_handlers::{
            clear_pin_session, create_account, delete_account, list_accounts, pin_login,
            pin_session_status, update_account,
        },
        auth_handlers::{auth_status, login, logout, qr_upload, slideshow_login},
        folder_handlers::{
            create_folder, delete_folder, folder_structure, folder_thumbnail, list_folder,
        },
        health_handlers::{healthz, readyz},
        image_handlers::{
            batch_delete_images, delete_image, image_thumbnail, random_image, rotate_image,
            serve_upload, upload_images,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

/// Files accepted in one upload request.
pub const MAX_FILES_PER_UPLOAD: u64 = 20;

/// Build the router. `max_upload_bytes` is the per-file limit; the upload
/// route accepts bodies up to [`MAX_FILES_PER_UPLOAD`] times that.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let upload_body_limit =
        usize::try_from(max_upload_bytes.saturating_mul(MAX_FILES_PER_UPLOAD)).unwrap_or(usize::MAX);

    Router::new()
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/api/health", get(healthz))
        .route("/readyz", get(readyz))
        // slideshow
        .route("/api/random-image", get(random_image))
        .route("/api/images/random", get(random_image))
        .route("/api/images/{id}/thumbnail", get(image_thumbnail))
        .route("/uploads/{*path}", get(serve_upload))
        .route("/api/folders", get(folder_structure))
        .route("/api/folders/{path}/thumbnail", get(folder_thumbnail))
        // uploads
        .route(
            "/api/upload",
            post(upload_images).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        // admin: images and folders
        .route("/api/images", delete(delete_image))
        .route("/api/images/batch", delete(batch_delete_images))
        .route("/api/images/rotate", post(rotate_image))
        .route(
            "/api/admin/folders",
            get(list_folder).post(create_folder).delete(delete_folder),
        )
        // admin: access accounts
        .route("/api/access-accounts", get(list_accounts).post(create_account))
        .route(
            "/api/access-accounts/{id}",
            put(update_account).delete(delete_account),
        )
        // auth
        .route("/api/auth/pin", post(pin_login))
        .route(
            "/api/auth/session",
            get(pin_session_status).delete(clear_pin_session),
        )
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/status", get(auth_status))
        .route("/qr-upload", get(qr_upload))
        .route("/slideshow-login", get(slideshow_login))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, services::account_store::AccountInput};
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{Value, json};
    use std::{io::Cursor, net::SocketAddr, path::Path};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CLIENT: ([u8; 4], u16) = ([198, 51, 100, 7], 40000);

    async fn setup(dir: &TempDir) -> (Router, AppState) {
        setup_with(dir, false).await
    }

    async fn setup_with(dir: &TempDir, trust_proxy: bool) -> (Router, AppState) {
        let config = AppConfig {
            content_dir: dir.path().join("uploads"),
            data_dir: dir.path().join("data"),
            trust_proxy,
            ..AppConfig::default()
        };
        let state = AppState::new(config);
        state.prepare_storage().await.unwrap();
        let app = routes(state.config.max_upload_bytes).with_state(state.clone());
        (app, state)
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 120, 60])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn write_png(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, png_bytes()).unwrap();
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .extension(ConnectInfo(SocketAddr::from(CLIENT)));
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .expect("session cookie")
            .to_string()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn admin_cookie(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "password": "admin123" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    #[tokio::test]
    async fn empty_library_reports_no_images() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let response = app.oneshot(get("/api/random-image", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NO_IMAGES_FOUND");
    }

    #[tokio::test]
    async fn random_image_returns_urls() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup(&dir).await;
        write_png(&state.config.content_dir, "family/a b.png");

        let response = app
            .clone()
            .oneshot(get("/api/images/random", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["image"]["id"], "family/a b.png");
        assert_eq!(body["image"]["folder"], "family");
        assert_eq!(body["image"]["path"], "/uploads/family/a%20b.png");
        assert_eq!(body["image"]["url"], "http://localhost/uploads/family/a%20b.png");
        assert_eq!(
            body["image"]["thumbnail"],
            "http://localhost/api/images/family%2Fa%20b.png/thumbnail"
        );

        let raw = app
            .clone()
            .oneshot(get("/uploads/family/a%20b.png", None))
            .await
            .unwrap();
        assert_eq!(raw.status(), StatusCode::OK);
        assert_eq!(raw.headers()[header::CONTENT_TYPE], "image/png");

        let thumb = app
            .oneshot(get("/api/images/family%2Fa%20b.png/thumbnail", None))
            .await
            .unwrap();
        assert_eq!(thumb.status(), StatusCode::OK);
        assert_eq!(thumb.headers()[header::CONTENT_TYPE], "image/jpeg");
    }

    #[tokio::test]
    async fn pin_session_restricts_the_slideshow() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup(&dir).await;
        write_png(&state.config.content_dir, "family/a.png");
        write_png(&state.config.content_dir, "family/2023/b.png");
        write_png(&state.config.content_dir, "familyreunion/c.png");
        state
            .accounts
            .create(AccountInput {
                name: "Grandma".into(),
                pin: "2468".into(),
                assigned_folders: vec!["family".into()],
            })
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/pin", json!({ "pin": "2468" }), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        assert_eq!(json_body(response).await["account"]["name"], "Grandma");

        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(get("/api/random-image", Some(&cookie)))
                .await
                .unwrap();
            let body = json_body(response).await;
            let folder = body["image"]["folder"].as_str().unwrap().to_string();
            assert!(folder == "family" || folder == "family/2023", "{folder}");
        }

        let response = app
            .clone()
            .oneshot(get("/api/random-image?folder=familyreunion", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "FOLDER_EMPTY");

        let status = app
            .oneshot(get("/api/auth/session", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(json_body(status).await["authenticated"], true);
    }

    #[tokio::test]
    async fn admin_routes_require_a_session() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let response = app
            .clone()
            .oneshot(get("/api/access-accounts", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "AUTH_REQUIRED");

        let guest = app.clone().oneshot(get("/qr-upload", None)).await.unwrap();
        assert_eq!(guest.status(), StatusCode::SEE_OTHER);
        assert_eq!(guest.headers()[header::LOCATION], "/upload");
        let cookie = session_cookie(&guest);

        let response = app
            .oneshot(get("/api/access-accounts", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn admin_manages_accounts() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let wrong = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "password": "nope" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let cookie = admin_cookie(&app).await;
        let account = json!({ "name": "Kitchen", "pin": "1357", "assignedFolders": ["misc"] });

        let created = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/access-accounts",
                account.clone(),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let id = json_body(created).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let duplicate = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/access-accounts",
                account,
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(duplicate).await["code"], "DUPLICATE_PIN");

        let deleted = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                &format!("/api/access-accounts/{}", id),
                json!({}),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = app
            .oneshot(json_request(
                "DELETE",
                &format!("/api/access-accounts/{}", id),
                json!({}),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["code"], "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test]
    async fn repeated_wrong_pins_lock_the_client() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        for expected in [4, 3, 2, 1, 0] {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/auth/pin", json!({ "pin": "9999" }), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = json_body(response).await;
            assert_eq!(body["code"], "INVALID_PIN");
            assert_eq!(body["attemptsRemaining"], expected);
        }

        let response = app
            .oneshot(json_request("POST", "/api/auth/pin", json!({ "pin": "9999" }), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["remainingTime"], 15);
    }

    async fn wrong_pin_via(app: &Router, forwarded_for: &str) -> Response {
        let mut request = json_request("POST", "/api/auth/pin", json!({ "pin": "9999" }), None);
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        app.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn forged_forwarded_for_is_ignored_by_default() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        for i in 0..5 {
            let response = wrong_pin_via(&app, &format!("10.9.0.{i}")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = wrong_pin_via(&app, "10.9.0.99").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_the_appended_hop() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup_with(&dir, true).await;

        for i in 0..5 {
            let response = wrong_pin_via(&app, &format!("10.9.0.{i}, 203.0.113.5")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = wrong_pin_via(&app, "10.9.0.99, 203.0.113.5").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // another client behind the same proxy is unaffected
        let response = wrong_pin_via(&app, "10.9.0.99, 203.0.113.6").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_keeps_the_error_envelope() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn login_issues_a_fresh_session_id() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let guest = app.clone().oneshot(get("/qr-upload", None)).await.unwrap();
        let planted = session_cookie(&guest);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "password": "admin123" }),
                Some(&planted),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let admin = session_cookie(&response);
        assert_ne!(admin, planted);

        let response = app
            .clone()
            .oneshot(get("/api/access-accounts", Some(&planted)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get("/api/access-accounts", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pin_login_issues_a_fresh_session_id() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup(&dir).await;
        state
            .accounts
            .create(AccountInput {
                name: "Grandma".into(),
                pin: "2468".into(),
                assigned_folders: vec!["family".into()],
            })
            .await
            .unwrap();

        let slideshow = app.clone().oneshot(get("/slideshow-login", None)).await.unwrap();
        let planted = session_cookie(&slideshow);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/pin",
                json!({ "pin": "2468" }),
                Some(&planted),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fresh = session_cookie(&response);
        assert_ne!(fresh, planted);

        let old = app
            .clone()
            .oneshot(get("/api/auth/session", Some(&planted)))
            .await
            .unwrap();
        assert_eq!(json_body(old).await["authenticated"], false);

        let status = app
            .oneshot(get("/api/auth/status", Some(&fresh)))
            .await
            .unwrap();
        assert_eq!(json_body(status).await["role"], "slideshow");
    }

    fn multipart_upload(files: &[(&str, Vec<u8>)], cookie: &str) -> Request<Body> {
        let boundary = "photoframeboundary";
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .into_bytes(),
            );
            body.extend(bytes);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").into_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn partial_upload_reports_stored_and_failed_files() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup(&dir).await;
        let guest = app.clone().oneshot(get("/qr-upload", None)).await.unwrap();
        let cookie = session_cookie(&guest);

        let request = multipart_upload(
            &[
                ("first.png", png_bytes()),
                ("notes.txt", b"not an image".to_vec()),
            ],
            &cookie,
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["files"].as_array().unwrap().len(), 1);
        assert_eq!(body["files"][0]["originalname"], "first.png");
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().starts_with("notes.txt"));
        assert_eq!(state.index.get_all_images(true).await.len(), 1);

        let request = multipart_upload(&[("notes.txt", b"not an image".to_vec())], &cookie);
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn guest_upload_is_served_next() {
        let dir = TempDir::new().unwrap();
        let (app, _) = setup(&dir).await;

        let guest = app.clone().oneshot(get("/qr-upload", None)).await.unwrap();
        let cookie = session_cookie(&guest);

        let boundary = "photoframeboundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"party.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend(png_bytes());
        body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(header::COOKIE, &cookie)
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = json_body(response).await;
        assert_eq!(uploaded["files"][0]["originalname"], "party.png");

        let response = app.oneshot(get("/api/random-image", None)).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["image"]["folder"], "evento");
        assert_eq!(body["image"]["id"], uploaded["files"][0]["id"]);
    }

    #[tokio::test]
    async fn folder_tree_is_public() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup(&dir).await;
        write_png(&state.config.content_dir, "vacation/x.png");

        let response = app.oneshot(get("/api/folders", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let vacation = body["folders"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["path"] == "vacation")
            .unwrap()
            .clone();
        assert_eq!(vacation["imageCount"], 1);
    }
}
