//! Request extractors shared by the handlers: the caller's session, their
//! client address and the public origin the request arrived on.

use crate::{
    errors::AppError,
    models::session::{Role, Session},
    services::{
        access_control::RequesterContext,
        session_store::{SESSION_COOKIE_NAME, SessionLookup},
    },
    state::AppState,
};
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::{convert::Infallible, net::SocketAddr};
use uuid::Uuid;

/// The session referenced by the request cookie, if it is still alive.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    /// Id from the cookie when it names a live session.
    pub id: Option<Uuid>,
    pub session: Option<Session>,
    /// The cookie named a session that has just been expired.
    pub expired: bool,
}

impl CurrentSession {
    pub fn requester(&self) -> RequesterContext {
        RequesterContext::from_session(self.session.as_ref())
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().and_then(|s| s.role)
    }

    /// Fail with 401 when there is no role session and 403 when the role is
    /// not one of `roles`.
    pub fn require_roles(&self, roles: &[Role]) -> Result<Role, AppError> {
        let Some(role) = self.role() else {
            let err = if self.expired {
                AppError::session_expired()
            } else {
                AppError::auth_required()
            };
            return Err(err.with_extra("redirect", "/login"));
        };
        if roles.contains(&role) {
            Ok(role)
        } else {
            Err(AppError::forbidden())
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_roles(&[Role::Admin]).map(|_| ())
    }
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(id) = jar
            .get(SESSION_COOKIE_NAME)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
        else {
            return Ok(Self {
                id: None,
                session: None,
                expired: false,
            });
        };

        Ok(match state.sessions.lookup(&id) {
            SessionLookup::Active(session) => Self {
                id: Some(id),
                session: Some(session),
                expired: false,
            },
            SessionLookup::Expired => Self {
                id: None,
                session: None,
                expired: true,
            },
            SessionLookup::Missing => Self {
                id: None,
                session: None,
                expired: false,
            },
        })
    }
}

/// Client address used as the rate limiting key.
///
/// The socket peer address, or, behind a trusted reverse proxy, the
/// `X-Forwarded-For` entry that proxy appended. Entries to its left are
/// supplied by the client and never used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.trust_proxy {
            if let Some(hop) = last_forwarded_hop(&parts.headers) {
                return Ok(Self(hop));
            }
        }
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(addr))
    }
}

fn last_forwarded_hop(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// `scheme://host` the client used, for building absolute image URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin(pub String);

impl RequestOrigin {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let scheme = header_str(header::HeaderName::from_static("x-forwarded-proto"))
            .unwrap_or("http")
            .to_string();
        let host = header_str(header::HOST)
            .map(String::from)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        Ok(Self(format!("{}://{}", scheme, host)))
    }
}

/// The HTTP-only session cookie for `id`.
pub fn session_cookie(id: Uuid, max_age: chrono::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, id.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE_NAME).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_proxy_appended_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 10.9.0.1 , 203.0.113.9 "),
        );
        assert_eq!(last_forwarded_hop(&headers).as_deref(), Some("203.0.113.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(last_forwarded_hop(&headers).as_deref(), Some("203.0.113.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.9.0.1, "));
        assert_eq!(last_forwarded_hop(&headers), None);
        assert_eq!(last_forwarded_hop(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(Uuid::nil(), chrono::Duration::hours(24));
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
    }

    #[test]
    fn anonymous_callers_need_auth() {
        let current = CurrentSession {
            id: None,
            session: None,
            expired: true,
        };
        let err = current.require_admin().unwrap_err();
        assert_eq!(err.code, "SESSION_EXPIRED");
        assert_eq!(current.requester(), RequesterContext::Unauthenticated);
    }
}
