//! Decoy and distractor selection.
//!
//! Both operations draw from the catalog's popular-track pool. An empty pool
//! after filtering is fatal for the caller: a decoy or an option list is never
//! padded with something that could be the right answer.

use rand::{Rng, seq::SliceRandom};
use std::{collections::HashSet, sync::Arc};
use tracing::{instrument, warn};

use super::{
    catalog::CatalogAdapter,
    error::FactorError,
    track::{EnrolledSongSet, Track},
};

/// Number of wrong answers offered next to the target.
pub const DISTRACTOR_COUNT: usize = 4;

/// Choose one playable track whose title matches none of the enrolled songs.
///
/// # Errors
/// `CatalogUnavailable` when nothing survives the filter.
pub fn choose_decoy<R: Rng + ?Sized>(
    pool: &[Track],
    excluding: &EnrolledSongSet,
    rng: &mut R,
) -> Result<Track, FactorError> {
    let candidates: Vec<&Track> = pool
        .iter()
        .filter(|track| {
            track.preview_ref.is_some()
                && !track.normalized_title().is_empty()
                && !excluding.contains_song(track)
        })
        .collect();
    candidates
        .choose(rng)
        .map(|track| (*track).clone())
        .ok_or_else(|| FactorError::CatalogUnavailable("no decoy candidates".to_string()))
}

/// Pick [`DISTRACTOR_COUNT`] tracks with pairwise-distinct titles that match
/// neither `target` nor anything in `avoid`, add `target`, and shuffle.
///
/// # Errors
/// `CatalogUnavailable` when the pool cannot supply enough distractors.
pub fn assemble_options<R: Rng + ?Sized>(
    target: &Track,
    avoid: &[&Track],
    pool: &[Track],
    rng: &mut R,
) -> Result<Vec<Track>, FactorError> {
    let mut seen: HashSet<String> = avoid.iter().map(|track| track.normalized_title()).collect();
    seen.insert(target.normalized_title());

    let mut candidates: Vec<&Track> = pool.iter().collect();
    candidates.shuffle(rng);

    let mut options = Vec::with_capacity(DISTRACTOR_COUNT + 1);
    for candidate in candidates {
        if options.len() == DISTRACTOR_COUNT {
            break;
        }
        let title = candidate.normalized_title();
        if title.is_empty() || !seen.insert(title) {
            continue;
        }
        options.push(candidate.clone());
    }

    if options.len() < DISTRACTOR_COUNT {
        return Err(FactorError::CatalogUnavailable(format!(
            "only {} distractors available",
            options.len()
        )));
    }

    options.push(target.clone());
    options.shuffle(rng);
    Ok(options)
}

#[derive(Clone)]
pub struct DecoySelector {
    catalog: Arc<dyn CatalogAdapter>,
}

impl DecoySelector {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogAdapter>) -> Self {
        Self { catalog }
    }

    async fn pool(&self) -> Result<Vec<Track>, FactorError> {
        let pool = self.catalog.top_tracks().await?;
        if pool.is_empty() {
            warn!("Catalog returned an empty popular-track pool");
            return Err(FactorError::CatalogUnavailable(
                "empty track pool".to_string(),
            ));
        }
        Ok(pool)
    }

    /// One decoy guaranteed not to be any of the user's songs.
    ///
    /// # Errors
    /// `CatalogUnavailable` when the catalog errors or the filtered pool is empty.
    #[instrument(skip_all)]
    pub async fn pick_decoy(&self, excluding: &EnrolledSongSet) -> Result<Track, FactorError> {
        let pool = self.pool().await?;
        let mut rng = rand::thread_rng();
        choose_decoy(&pool, excluding, &mut rng)
    }

    /// Five shuffled options for `target`, none of the four distractors
    /// sharing a title with `excluding`.
    ///
    /// # Errors
    /// `CatalogUnavailable` when the catalog errors or cannot fill the list.
    pub async fn build_options(
        &self,
        target: &Track,
        excluding: &Track,
    ) -> Result<Vec<Track>, FactorError> {
        self.build_options_avoiding(target, &[excluding]).await
    }

    /// Like [`Self::build_options`] with several excluded titles.
    ///
    /// # Errors
    /// `CatalogUnavailable` when the catalog errors or cannot fill the list.
    #[instrument(skip_all)]
    pub async fn build_options_avoiding(
        &self,
        target: &Track,
        avoid: &[&Track],
    ) -> Result<Vec<Track>, FactorError> {
        let pool = self.pool().await?;
        let mut rng = rand::thread_rng();
        assemble_options(target, avoid, &pool, &mut rng)
    }
}
