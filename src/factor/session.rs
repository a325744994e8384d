//! Verification sessions: the ordered step sequence and its bookkeeping.
//!
//! The decoy's position is structural (a `Decoy` variant in `steps`), so no
//! index arithmetic is needed to find "which real song is at this step".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use super::{error::FactorError, track::Track};

/// Replays granted to every freshly built session.
pub const INITIAL_REPLAYS: u8 = 3;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationStep {
    Real { track: Track },
    Decoy { track: Track },
}

impl VerificationStep {
    #[must_use]
    pub fn track(&self) -> &Track {
        match self {
            Self::Real { track } | Self::Decoy { track } => track,
        }
    }

    #[must_use]
    pub const fn is_decoy(&self) -> bool {
        matches!(self, Self::Decoy { .. })
    }
}

/// Per-account progress through one verification attempt.
///
/// Fields are private so that `current_index` can only move forward by one
/// and `replays_remaining` can only move down.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    current_index: usize,
    steps: Vec<VerificationStep>,
    replays_remaining: u8,
    created_at: DateTime<Utc>,
    step_started_at: DateTime<Utc>,
    /// Current step accepted no answer yet because its prompt never reached
    /// the client. The step clock is stopped until [`Session::begin_step`].
    #[serde(default)]
    prompt_pending: bool,
}

impl Session {
    #[must_use]
    pub fn new(steps: Vec<VerificationStep>, now: DateTime<Utc>) -> Self {
        Self {
            current_index: 0,
            steps,
            replays_remaining: INITIAL_REPLAYS,
            created_at: now,
            step_started_at: now,
            prompt_pending: true,
        }
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn steps(&self) -> &[VerificationStep] {
        &self.steps
    }

    #[must_use]
    pub const fn replays_remaining(&self) -> u8 {
        self.replays_remaining
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `None` once every step has been answered.
    #[must_use]
    pub fn current_step(&self) -> Option<&VerificationStep> {
        self.steps.get(self.current_index)
    }

    /// The session's single decoy track.
    #[must_use]
    pub fn decoy(&self) -> Option<&Track> {
        self.steps
            .iter()
            .find(|step| step.is_decoy())
            .map(VerificationStep::track)
    }

    /// Move to the next step. Its clock stays stopped until the prompt is
    /// delivered.
    pub fn advance(&mut self) {
        if !self.is_exhausted() {
            self.current_index += 1;
            self.prompt_pending = true;
        }
    }

    /// The prompt for the current step went out: start its clock.
    pub fn begin_step(&mut self, now: DateTime<Utc>) {
        self.prompt_pending = false;
        self.step_started_at = now;
    }

    #[must_use]
    pub const fn prompt_pending(&self) -> bool {
        self.prompt_pending
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.steps.len()
    }

    /// One-based position of the current step.
    #[must_use]
    pub const fn progress(&self) -> usize {
        self.current_index + 1
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.steps.len()
    }

    /// Spend one replay and restart the step clock, returning the preview of
    /// the current step.
    ///
    /// # Errors
    /// `NoActiveSession` when every step is answered, `ReplayBudgetExhausted`
    /// when no replay is left.
    pub fn take_replay(&mut self, now: DateTime<Utc>) -> Result<Option<String>, FactorError> {
        let preview = self
            .current_step()
            .ok_or(FactorError::NoActiveSession)?
            .track()
            .preview_ref
            .clone();
        if self.replays_remaining == 0 {
            return Err(FactorError::ReplayBudgetExhausted);
        }
        self.replays_remaining -= 1;
        self.step_started_at = now;
        Ok(preview)
    }

    /// True when more than `budget` has elapsed since the current step began.
    /// A step whose prompt is still pending never expires.
    #[must_use]
    pub fn step_expired(&self, now: DateTime<Utc>, budget: Duration) -> bool {
        if self.prompt_pending {
            return false;
        }
        let elapsed = now.signed_duration_since(self.step_started_at);
        elapsed.to_std().is_ok_and(|elapsed| elapsed > budget)
    }

    /// What is left of `ttl` measured from `created_at`, or `None` when the
    /// window has closed.
    #[must_use]
    pub fn remaining_ttl(&self, now: DateTime<Utc>, ttl: Duration) -> Option<Duration> {
        let elapsed = now
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or_default();
        ttl.checked_sub(elapsed).filter(|left| !left.is_zero())
    }
}

/// A multiple-choice answer. Preview references are deliberately absent so a
/// client cannot match the prompt audio to an option.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SongOption {
    pub id: String,
    pub title: String,
    pub artist: String,
}

impl From<&Track> for SongOption {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
        }
    }
}

/// What the client sees for the step at `current_index`.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub preview: Option<String>,
    pub options: Vec<SongOption>,
    pub progress: usize,
    pub total: usize,
    pub replays_remaining: u8,
}

impl Prompt {
    /// Prompt for the session's current step. `None` when exhausted.
    #[must_use]
    pub fn for_session(session: &Session, options: &[Track]) -> Option<Self> {
        let step = session.current_step()?;
        Some(Self {
            preview: step.track().preview_ref.clone(),
            options: options.iter().map(SongOption::from).collect(),
            progress: session.progress(),
            total: session.total(),
            replays_remaining: session.replays_remaining(),
        })
    }
}
