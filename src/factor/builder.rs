//! Session construction.

use chrono::Utc;
use rand::{Rng, seq::SliceRandom};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

use super::{
    account::Account,
    decoy::DecoySelector,
    error::FactorError,
    session::{Session, VerificationStep},
    store::{Store, session_key, set_json},
    track::{EnrolledSongSet, Track},
};

/// A freshly persisted session and the track its first prompt plays.
#[derive(Debug, Clone)]
pub struct BuiltSession {
    pub session: Session,
    pub prompt: Track,
}

/// Shuffle the enrolled songs and splice `decoy` in at a uniformly random
/// slot in `0..=len`.
pub fn assemble_steps<R: Rng + ?Sized>(
    songs: &EnrolledSongSet,
    decoy: Track,
    rng: &mut R,
) -> Vec<VerificationStep> {
    let mut steps: Vec<VerificationStep> = songs
        .tracks()
        .iter()
        .map(|track| VerificationStep::Real {
            track: track.clone(),
        })
        .collect();
    steps.shuffle(rng);
    let slot = rng.gen_range(0..=steps.len());
    steps.insert(slot, VerificationStep::Decoy { track: decoy });
    steps
}

#[derive(Clone)]
pub struct SessionBuilder {
    decoys: DecoySelector,
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(decoys: DecoySelector, store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { decoys, store, ttl }
    }

    /// Build and persist a session for `account`, superseding any prior one.
    ///
    /// # Errors
    /// `CatalogUnavailable` when no decoy can be chosen, `StoreUnavailable`
    /// when the session cannot be written.
    #[instrument(skip_all, fields(username = %account.username))]
    pub async fn build(&self, account: &Account) -> Result<BuiltSession, FactorError> {
        let decoy = self.decoys.pick_decoy(&account.songs).await?;

        let steps = {
            let mut rng = rand::thread_rng();
            assemble_steps(&account.songs, decoy, &mut rng)
        };
        let session = Session::new(steps, Utc::now());

        let prompt = session
            .current_step()
            .map(|step| step.track().clone())
            .ok_or_else(|| FactorError::Internal("built an empty session".to_string()))?;

        set_json(
            self.store.as_ref(),
            &session_key(&account.username),
            &session,
            Some(self.ttl),
        )
        .await?;

        debug!("Session built with {} steps", session.total());

        Ok(BuiltSession { session, prompt })
    }
}
