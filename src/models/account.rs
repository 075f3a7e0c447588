//! PIN-gated guest identities ("access accounts").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A guest profile identified by a PIN, restricted to a set of folders.
///
/// Persisted as one element of the accounts JSON array; field names are
/// camelCase on disk and over the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessAccount {
    /// Opaque unique identifier (`acc_<uuid>`).
    pub id: String,

    /// Display name shown in the admin UI.
    pub name: String,

    /// 4 to 6 ASCII digits, unique across all accounts.
    pub pin: String,

    /// Folders (relative to the content root) this account may view.
    #[serde(default)]
    pub assigned_folders: Vec<String>,

    pub created_at: DateTime<Utc>,

    /// Updated on every successful PIN authentication.
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

/// The part of an account that is stored in a session and echoed to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub assigned_folders: Vec<String>,
}

impl From<&AccessAccount> for AccountSummary {
    fn from(account: &AccessAccount) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            assigned_folders: account.assigned_folders.clone(),
        }
    }
}
