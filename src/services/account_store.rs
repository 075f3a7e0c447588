//! src/services/account_store.rs
//!
//! AccountStore: PIN access accounts persisted as one JSON array file.
//! The file is re-read on every operation and rewritten wholesale on every
//! mutation (temp file + rename). Writers are serialized by an async mutex.

use crate::models::account::AccessAccount;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

pub const PIN_MIN_LEN: usize = 4;
pub const PIN_MAX_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Name and PIN are required")]
    MissingFields,
    #[error("PIN must be 4 to 6 digits")]
    InvalidPinFormat,
    #[error("PIN already exists")]
    DuplicatePin,
    #[error("Account not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type AccountResult<T> = Result<T, AccountError>;

/// Fields accepted from the admin UI when creating or updating an account.
#[derive(Debug, Clone)]
pub struct AccountInput {
    pub name: String,
    pub pin: String,
    pub assigned_folders: Vec<String>,
}

pub struct AccountStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the data directory and an empty accounts file if missing.
    pub async fn init(&self) -> AccountResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::metadata(&self.path).await.is_err() {
            self.save(&[]).await?;
        }
        Ok(())
    }

    /// Load every account for reading. A missing, unreadable or unparsable
    /// file reads as empty.
    async fn load(&self) -> Vec<AccessAccount> {
        self.load_strict().await.unwrap_or_else(|err| {
            warn!("could not load {}: {}", self.path.display(), err);
            Vec::new()
        })
    }

    /// Load every account before a rewrite. Only a missing file reads as
    /// empty; anything else is an error so existing accounts are never
    /// overwritten with an empty list.
    async fn load_strict(&self) -> AccountResult<Vec<AccessAccount>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AccountError::Io(err)),
        };
        Ok(serde_json::from_str(&data)?)
    }

    async fn save(&self, accounts: &[AccessAccount]) -> AccountResult<()> {
        let json = serde_json::to_vec_pretty(accounts)?;
        let tmp_path = self.path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        fs::write(&tmp_path, json).await?;
        if let Err(err) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AccountError::Io(err));
        }
        debug!(count = accounts.len(), "saved access accounts");
        Ok(())
    }

    pub async fn list(&self) -> Vec<AccessAccount> {
        self.load().await
    }

    pub async fn create(&self, input: AccountInput) -> AccountResult<AccessAccount> {
        let input = validate(input)?;
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_strict().await?;

        if accounts.iter().any(|account| account.pin == input.pin) {
            return Err(AccountError::DuplicatePin);
        }

        let account = AccessAccount {
            id: format!("acc_{}", Uuid::new_v4().simple()),
            name: input.name,
            pin: input.pin,
            assigned_folders: input.assigned_folders,
            created_at: Utc::now(),
            last_accessed: None,
        };
        accounts.push(account.clone());
        self.save(&accounts).await?;
        Ok(account)
    }

    pub async fn update(&self, id: &str, input: AccountInput) -> AccountResult<AccessAccount> {
        let input = validate(input)?;
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_strict().await?;

        let index = accounts
            .iter()
            .position(|account| account.id == id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;

        if accounts
            .iter()
            .any(|account| account.pin == input.pin && account.id != id)
        {
            return Err(AccountError::DuplicatePin);
        }

        let account = &mut accounts[index];
        account.name = input.name;
        account.pin = input.pin;
        account.assigned_folders = input.assigned_folders;
        let updated = account.clone();

        self.save(&accounts).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> AccountResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load_strict().await?;
        let before = accounts.len();
        accounts.retain(|account| account.id != id);
        if accounts.len() == before {
            return Err(AccountError::NotFound(id.to_string()));
        }
        self.save(&accounts).await
    }

    /// Find the account holding `pin` and stamp its `last_accessed`. The file
    /// is only rewritten when an account matched, which implies it loaded.
    pub async fn authenticate(&self, pin: &str) -> AccountResult<Option<AccessAccount>> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load().await;
        let Some(account) = accounts.iter_mut().find(|account| account.pin == pin) else {
            return Ok(None);
        };
        account.last_accessed = Some(Utc::now());
        let found = account.clone();
        self.save(&accounts).await?;
        Ok(Some(found))
    }
}

/// True for 4 to 6 ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    (PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

fn validate(input: AccountInput) -> AccountResult<AccountInput> {
    let name = input.name.trim().to_string();
    let pin = input.pin.trim().to_string();
    if name.is_empty() || pin.is_empty() {
        return Err(AccountError::MissingFields);
    }
    if !is_valid_pin(&pin) {
        return Err(AccountError::InvalidPinFormat);
    }
    let assigned_folders = input
        .assigned_folders
        .into_iter()
        .map(|folder| folder.trim().trim_matches('/').to_string())
        .filter(|folder| !folder.is_empty())
        .collect();
    Ok(AccountInput {
        name,
        pin,
        assigned_folders,
    })
}
