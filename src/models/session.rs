//! Server-side session records.

use crate::models::account::AccountSummary;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role granted by one of the login flows.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Password login; full management access.
    Admin,
    /// QR-code login; may upload photos.
    #[serde(rename = "invitado")]
    Guest,
    /// Kiosk login for the slideshow display.
    Slideshow,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Guest => write!(f, "invitado"),
            Role::Slideshow => write!(f, "slideshow"),
        }
    }
}

/// State attached to a session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Set by the role-based login flows.
    pub role: Option<Role>,

    /// When the role was granted.
    pub login_time: Option<DateTime<Utc>>,

    /// Set by a successful PIN authentication.
    pub access_account: Option<AccountSummary>,

    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            role: None,
            login_time: None,
            access_account: None,
            created_at: now,
        }
    }

    /// A session with a role is "authenticated" in the admin/guest sense.
    pub fn is_authenticated(&self) -> bool {
        self.role.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let started = self.login_time.unwrap_or(self.created_at);
        now - started > max_age
    }
}
