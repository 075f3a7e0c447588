//! PIN authentication: rate limit check, account lookup, bookkeeping.

use crate::{
    models::account::AccountSummary,
    services::{
        account_store::{AccountError, AccountStore},
        rate_limiter::{RateLimitStatus, RateLimiter},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PinAuthError {
    #[error("Too many failed attempts. Try again in {remaining_minutes} minutes.")]
    RateLimited { remaining_minutes: i64 },
    #[error("PIN is required")]
    MissingPin,
    #[error("Invalid PIN")]
    InvalidPin { attempts_remaining: u32 },
    #[error(transparent)]
    Store(#[from] AccountError),
}

#[derive(Clone)]
pub struct PinAuthenticator {
    accounts: Arc<AccountStore>,
    limiter: Arc<RateLimiter>,
}

impl PinAuthenticator {
    pub fn new(accounts: Arc<AccountStore>, limiter: Arc<RateLimiter>) -> Self {
        Self { accounts, limiter }
    }

    /// Authenticate `client` with `pin`.
    ///
    /// The rate limit is checked before anything else. Every non-empty PIN
    /// spends one attempt before the account file is consulted, so parallel
    /// guesses cannot outrun the limit. A miss reports how many attempts
    /// remain, zero once the next try will be refused.
    pub async fn authenticate(&self, client: &str, pin: &str) -> Result<AccountSummary, PinAuthError> {
        if let RateLimitStatus::Locked { remaining_minutes } = self.limiter.check(client) {
            warn!(client = %client, "rate limit exceeded for PIN login");
            return Err(PinAuthError::RateLimited { remaining_minutes });
        }

        let pin = pin.trim();
        if pin.is_empty() {
            return Err(PinAuthError::MissingPin);
        }

        let attempts_remaining = match self.limiter.try_begin(client) {
            RateLimitStatus::Allowed { attempts_remaining } => attempts_remaining,
            RateLimitStatus::Locked { remaining_minutes } => {
                warn!(client = %client, "rate limit exceeded for PIN login");
                return Err(PinAuthError::RateLimited { remaining_minutes });
            }
        };

        match self.accounts.authenticate(pin).await? {
            Some(account) => {
                self.limiter.record_success(client);
                info!(client = %client, account = %account.name, "PIN authentication succeeded");
                Ok(AccountSummary::from(&account))
            }
            None => {
                warn!(client = %client, attempts_remaining, "failed PIN attempt");
                Err(PinAuthError::InvalidPin { attempts_remaining })
            }
        }
    }
}
