//! Step evaluation: the per-session state machine.
//!
//! A session is `AwaitingResponse` while its record exists. `Completed` and
//! `Failed` both delete the record, so a later response finds nothing and is
//! answered with `NoActiveSession`, never with a second lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::{
    account::Account,
    decoy::DecoySelector,
    error::FactorError,
    guard::{AccountGuard, EntryDecision},
    session::{Prompt, Session, VerificationStep},
    store::{Store, get_json, session_key, set_json},
    track::{Track, normalize_title},
};

/// Guess submitted on behalf of a client that ran out of time. The NUL byte
/// keeps it from ever normalizing to a catalog title.
pub const TIMEOUT_SENTINEL: &str = "\u{0}timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResponse {
    Guess(String),
    NotMine,
}

impl StepResponse {
    #[must_use]
    pub fn timed_out() -> Self {
        Self::Guess(TIMEOUT_SENTINEL.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Next(Prompt),
    Completed,
    Failed,
}

#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayGrant {
    pub preview: Option<String>,
    pub replays_remaining: u8,
}

/// Whether `response` is the correct answer for `step`.
///
/// A decoy is only passed by disowning it; naming it, even correctly, fails.
/// A real step is only passed by its normalized title.
#[must_use]
pub fn judge(step: &VerificationStep, response: &StepResponse) -> bool {
    match (step, response) {
        (VerificationStep::Decoy { .. }, StepResponse::NotMine) => true,
        (VerificationStep::Real { track }, StepResponse::Guess(guess)) => {
            normalize_title(guess) == track.normalized_title()
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct StepEvaluator {
    store: Arc<dyn Store>,
    guard: AccountGuard,
    decoys: DecoySelector,
    session_ttl: Duration,
    step_deadline: Duration,
}

impl StepEvaluator {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        guard: AccountGuard,
        decoys: DecoySelector,
        session_ttl: Duration,
        step_deadline: Duration,
    ) -> Self {
        Self {
            store,
            guard,
            decoys,
            session_ttl,
            step_deadline,
        }
    }

    /// Prompt for the session's current step with fresh options. Distractors
    /// avoid the decoy and every enrolled song.
    ///
    /// # Errors
    /// `CatalogUnavailable` when options cannot be built, `NoActiveSession`
    /// when the session is exhausted.
    pub async fn prompt(&self, session: &Session, account: &Account) -> Result<Prompt, FactorError> {
        let target = session
            .current_step()
            .ok_or(FactorError::NoActiveSession)?
            .track();
        let avoid: Vec<&Track> = account
            .songs
            .tracks()
            .iter()
            .chain(session.decoy())
            .collect();
        let options = self.decoys.build_options_avoiding(target, &avoid).await?;
        Prompt::for_session(session, &options).ok_or(FactorError::NoActiveSession)
    }

    /// Load the live session and its unlocked account. A session past its
    /// window is dropped and reported as missing.
    async fn load(&self, username: &str) -> Result<(Session, Account), FactorError> {
        let key = session_key(username);
        let Some(session) = get_json::<Session>(self.store.as_ref(), &key).await? else {
            return Err(FactorError::NoActiveSession);
        };

        if session.remaining_ttl(Utc::now(), self.session_ttl).is_none() {
            self.store.delete(&key).await?;
            return Err(FactorError::NoActiveSession);
        }

        let Some(account) = self.guard.load(username).await? else {
            self.store.delete(&key).await?;
            return Err(FactorError::NoActiveSession);
        };

        if AccountGuard::check_entry(&account) == EntryDecision::Locked {
            // stale session left behind by a lock; drop it, do not lock again
            self.store.delete(&key).await?;
            return Err(FactorError::AccountLocked);
        }

        Ok((session, account))
    }

    /// Re-persist an updated session for what is left of its window.
    async fn persist(
        &self,
        username: &str,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<(), FactorError> {
        let key = session_key(username);
        let Some(ttl) = session.remaining_ttl(now, self.session_ttl) else {
            self.store.delete(&key).await?;
            return Err(FactorError::NoActiveSession);
        };
        set_json(self.store.as_ref(), &key, session, Some(ttl)).await
    }

    /// Build the prompt for the current step, then start its clock and
    /// persist. When the catalog fails the session is persisted with the
    /// prompt still pending, so the next call delivers it without judging
    /// anything.
    ///
    /// # Errors
    /// `CatalogUnavailable`, `NoActiveSession` when the window closed, or
    /// `StoreUnavailable`.
    pub async fn present(
        &self,
        username: &str,
        mut session: Session,
        account: &Account,
    ) -> Result<Prompt, FactorError> {
        match self.prompt(&session, account).await {
            Ok(prompt) => {
                let now = Utc::now();
                session.begin_step(now);
                self.persist(username, &session, now).await?;
                Ok(prompt)
            }
            Err(err) => {
                warn!("Could not build prompt: {err}");
                self.persist(username, &session, Utc::now()).await?;
                Err(err)
            }
        }
    }

    /// Consume one response for `username`'s session.
    ///
    /// A response that arrives after the step deadline is replaced by
    /// [`TIMEOUT_SENTINEL`] before it is judged. When the previous prompt
    /// could not be delivered, the response is not judged: the pending prompt
    /// is delivered instead.
    ///
    /// # Errors
    /// `NoActiveSession` when there is no live session, `AccountLocked` when
    /// the account is locked, `CatalogUnavailable` when the next prompt cannot
    /// be built (the accepted answer is kept), `StoreUnavailable` on
    /// persistence failure.
    #[instrument(skip(self, response))]
    pub async fn evaluate(
        &self,
        username: &str,
        response: StepResponse,
    ) -> Result<StepOutcome, FactorError> {
        let (mut session, mut account) = self.load(username).await?;

        if session.prompt_pending() {
            debug!("Delivering pending prompt");
            return self
                .present(username, session, &account)
                .await
                .map(StepOutcome::Next);
        }

        let response = if session.step_expired(Utc::now(), self.step_deadline) {
            debug!("Step deadline passed, judging as timeout");
            StepResponse::timed_out()
        } else {
            response
        };

        let step = session.current_step().ok_or(FactorError::NoActiveSession)?;
        if !judge(step, &response) {
            self.guard.lock(&mut account).await?;
            self.store.delete(&session_key(username)).await?;
            info!("Verification failed");
            return Ok(StepOutcome::Failed);
        }

        session.advance();
        if session.is_exhausted() {
            self.store.delete(&session_key(username)).await?;
            info!("Verification completed");
            return Ok(StepOutcome::Completed);
        }

        self.present(username, session, &account)
            .await
            .map(StepOutcome::Next)
    }

    /// Spend one replay on the current step.
    ///
    /// # Errors
    /// `NoActiveSession`, `AccountLocked`, `ReplayBudgetExhausted` or
    /// `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn replay(&self, username: &str) -> Result<ReplayGrant, FactorError> {
        let (mut session, _) = self.load(username).await?;
        let now = Utc::now();
        let preview = session.take_replay(now)?;
        self.persist(username, &session, now).await?;
        Ok(ReplayGrant {
            preview,
            replays_remaining: session.replays_remaining(),
        })
    }
}
