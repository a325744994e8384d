//! Lock state of an account.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    account::{Account, verify_password},
    error::FactorError,
    store::{Store, account_key, get_json, set_json},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    Allowed,
    Locked,
}

#[derive(Clone)]
pub struct AccountGuard {
    store: Arc<dyn Store>,
}

impl AccountGuard {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Read-only gate: locked accounts must not receive a new session.
    #[must_use]
    pub const fn check_entry(account: &Account) -> EntryDecision {
        if account.locked {
            EntryDecision::Locked
        } else {
            EntryDecision::Allowed
        }
    }

    /// # Errors
    /// `StoreUnavailable` when the store cannot be read.
    pub async fn load(&self, username: &str) -> Result<Option<Account>, FactorError> {
        get_json(self.store.as_ref(), &account_key(username)).await
    }

    /// Persist an account record without expiry.
    ///
    /// # Errors
    /// `StoreUnavailable` when the store cannot be written.
    pub async fn save(&self, account: &Account) -> Result<(), FactorError> {
        set_json(
            self.store.as_ref(),
            &account_key(&account.username),
            account,
            None,
        )
        .await
    }

    /// Set `locked` and persist. Locking a locked account changes nothing.
    ///
    /// # Errors
    /// `StoreUnavailable` when the store cannot be written.
    #[instrument(skip_all, fields(username = %account.username))]
    pub async fn lock(&self, account: &mut Account) -> Result<(), FactorError> {
        account.locked = true;
        self.save(account).await?;
        info!("Account locked");
        Ok(())
    }

    /// Clear `locked` when `supplied` matches the recovery password. A
    /// mismatch leaves the account untouched and returns `false`.
    ///
    /// # Errors
    /// `StoreUnavailable` when the store cannot be written.
    #[instrument(skip_all, fields(username = %account.username))]
    pub async fn unlock(
        &self,
        account: &mut Account,
        supplied: &SecretString,
    ) -> Result<bool, FactorError> {
        if !verify_password(supplied, &account.password_hash) {
            info!("Unlock rejected");
            return Ok(false);
        }
        account.locked = false;
        self.save(account).await?;
        info!("Account unlocked");
        Ok(true)
    }
}
