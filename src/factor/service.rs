//! `MusicFactor`: the entry point the HTTP layer talks to.

use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};

use super::{
    account::{Account, hash_password, valid_username, verify_password},
    builder::SessionBuilder,
    catalog::CatalogAdapter,
    decoy::DecoySelector,
    error::FactorError,
    evaluator::{ReplayGrant, StepEvaluator, StepOutcome, StepResponse},
    guard::{AccountGuard, EntryDecision},
    session::Prompt,
    store::{Store, session_key},
    track::{EnrolledSongSet, Track},
};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_STEP_GRACE_SECONDS: u64 = 2;

#[derive(Clone, Debug)]
pub struct FactorConfig {
    session_ttl_seconds: u64,
    step_timeout_seconds: u64,
    step_grace_seconds: u64,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            step_timeout_seconds: DEFAULT_STEP_TIMEOUT_SECONDS,
            step_grace_seconds: DEFAULT_STEP_GRACE_SECONDS,
        }
    }
}

impl FactorConfig {
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_step_timeout_seconds(mut self, seconds: u64) -> Self {
        self.step_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_step_grace_seconds(mut self, seconds: u64) -> Self {
        self.step_grace_seconds = seconds;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Wall-clock budget for one step: the client timer plus network grace.
    #[must_use]
    pub fn step_deadline(&self) -> Duration {
        Duration::from_secs(
            self.step_timeout_seconds
                .saturating_add(self.step_grace_seconds),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    UnknownAccount,
    Locked,
    Challenge(Prompt),
}

#[derive(Clone)]
pub struct MusicFactor {
    store: Arc<dyn Store>,
    catalog: Arc<dyn CatalogAdapter>,
    guard: AccountGuard,
    builder: SessionBuilder,
    evaluator: StepEvaluator,
}

impl MusicFactor {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn CatalogAdapter>,
        config: &FactorConfig,
    ) -> Self {
        let decoys = DecoySelector::new(catalog.clone());
        let guard = AccountGuard::new(store.clone());
        let builder = SessionBuilder::new(decoys.clone(), store.clone(), config.session_ttl());
        let evaluator = StepEvaluator::new(
            store.clone(),
            guard.clone(),
            decoys,
            config.session_ttl(),
            config.step_deadline(),
        );
        Self {
            store,
            catalog,
            guard,
            builder,
            evaluator,
        }
    }

    /// Create an unlocked account.
    ///
    /// # Errors
    /// `InvalidUsername`, `InvalidEnrollment`, `InvalidPassword`,
    /// `AccountExists` or `StoreUnavailable`.
    #[instrument(skip(self, songs, password))]
    pub async fn enroll(
        &self,
        username: &str,
        songs: Vec<Track>,
        password: &SecretString,
    ) -> Result<(), FactorError> {
        if !valid_username(username) {
            return Err(FactorError::InvalidUsername);
        }
        let songs = EnrolledSongSet::new(songs)?;
        if self.guard.load(username).await?.is_some() {
            return Err(FactorError::AccountExists);
        }
        let account = Account::new(username, songs, password)?;
        self.guard.save(&account).await?;
        info!("Account enrolled");
        Ok(())
    }

    /// Replace the enrolled songs, and optionally the recovery password, of an
    /// unlocked account. Any session in progress is discarded.
    ///
    /// # Errors
    /// `UnknownAccount`, `AccountLocked`, `InvalidCredentials`,
    /// `InvalidEnrollment`, `InvalidPassword` or `StoreUnavailable`.
    #[instrument(skip(self, current_password, songs, new_password))]
    pub async fn re_enroll(
        &self,
        username: &str,
        current_password: &SecretString,
        songs: Vec<Track>,
        new_password: Option<&SecretString>,
    ) -> Result<(), FactorError> {
        let mut account = self
            .guard
            .load(username)
            .await?
            .ok_or(FactorError::UnknownAccount)?;
        if AccountGuard::check_entry(&account) == EntryDecision::Locked {
            return Err(FactorError::AccountLocked);
        }
        if !verify_password(current_password, &account.password_hash) {
            return Err(FactorError::InvalidCredentials);
        }

        account.songs = EnrolledSongSet::new(songs)?;
        if let Some(password) = new_password {
            account.password_hash = hash_password(password)?;
        }

        self.guard.save(&account).await?;
        self.store.delete(&session_key(username)).await?;
        info!("Account re-enrolled");
        Ok(())
    }

    /// Gate on the lock bit, then build a fresh session and its first prompt.
    ///
    /// # Errors
    /// `CatalogUnavailable` or `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn start_session(&self, username: &str) -> Result<StartOutcome, FactorError> {
        let Some(account) = self.guard.load(username).await? else {
            return Ok(StartOutcome::UnknownAccount);
        };
        if AccountGuard::check_entry(&account) == EntryDecision::Locked {
            return Ok(StartOutcome::Locked);
        }

        let built = self.builder.build(&account).await?;
        let prompt = self
            .evaluator
            .present(username, built.session, &account)
            .await?;
        Ok(StartOutcome::Challenge(prompt))
    }

    /// Judge one response. Clients that ran out of time send
    /// [`StepResponse::timed_out`].
    ///
    /// # Errors
    /// See [`StepEvaluator::evaluate`].
    pub async fn respond(
        &self,
        username: &str,
        response: StepResponse,
    ) -> Result<StepOutcome, FactorError> {
        self.evaluator.evaluate(username, response).await
    }

    /// # Errors
    /// See [`StepEvaluator::replay`].
    pub async fn replay(&self, username: &str) -> Result<ReplayGrant, FactorError> {
        self.evaluator.replay(username).await
    }

    /// Clear the lock with the recovery password. Unknown accounts simply do
    /// not unlock.
    ///
    /// # Errors
    /// `StoreUnavailable`.
    #[instrument(skip(self, password))]
    pub async fn unlock(&self, username: &str, password: &SecretString) -> Result<bool, FactorError> {
        let Some(mut account) = self.guard.load(username).await? else {
            return Ok(false);
        };
        self.guard.unlock(&mut account, password).await
    }

    /// Catalog search for enrollment. A blank term never reaches the catalog.
    ///
    /// # Errors
    /// `CatalogUnavailable`.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<Track>, FactorError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        self.catalog.search(term).await
    }

    /// # Errors
    /// `StoreUnavailable` when the store does not answer.
    pub async fn ping(&self) -> Result<(), FactorError> {
        self.store.ping().await
    }
}
