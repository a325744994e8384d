//! Track records and the enrolled song set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

use super::error::FactorError;

/// Number of songs a user enrolls.
pub const ENROLLED_SONG_COUNT: usize = 5;

/// Normalize a title (or a guess) for "same song" comparisons.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// A catalog track. Identity is `id`; song equality is by normalized title.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_ref: Option<String>,
}

impl Track {
    #[must_use]
    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    /// Catalog re-queries may return a different id for the same song, so
    /// this compares titles, not ids.
    #[must_use]
    pub fn same_song(&self, other: &Self) -> bool {
        self.normalized_title() == other.normalized_title()
    }
}

/// Exactly five distinct tracks, immutable once built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<Track>", into = "Vec<Track>")]
pub struct EnrolledSongSet(Vec<Track>);

impl EnrolledSongSet {
    /// Validate and wrap an enrollment.
    ///
    /// # Errors
    /// Returns `InvalidEnrollment` when the count is not five, a title is
    /// blank, or two tracks share an id or a normalized title.
    pub fn new(songs: Vec<Track>) -> Result<Self, FactorError> {
        if songs.len() != ENROLLED_SONG_COUNT {
            return Err(FactorError::InvalidEnrollment(format!(
                "expected {ENROLLED_SONG_COUNT} songs, got {}",
                songs.len()
            )));
        }

        let mut titles = HashSet::with_capacity(ENROLLED_SONG_COUNT);
        let mut ids = HashSet::with_capacity(ENROLLED_SONG_COUNT);
        for song in &songs {
            let title = song.normalized_title();
            if title.is_empty() {
                return Err(FactorError::InvalidEnrollment(
                    "song title must not be blank".to_string(),
                ));
            }
            if !titles.insert(title) || !ids.insert(song.id.as_str()) {
                return Err(FactorError::InvalidEnrollment(format!(
                    "duplicate song: {}",
                    song.title
                )));
            }
        }

        Ok(Self(songs))
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.0
    }

    /// True when `track` is one of the enrolled songs (by normalized title).
    #[must_use]
    pub fn contains_song(&self, track: &Track) -> bool {
        self.0.iter().any(|song| song.same_song(track))
    }
}

impl TryFrom<Vec<Track>> for EnrolledSongSet {
    type Error = FactorError;

    fn try_from(songs: Vec<Track>) -> Result<Self, Self::Error> {
        Self::new(songs)
    }
}

impl From<EnrolledSongSet> for Vec<Track> {
    fn from(set: EnrolledSongSet) -> Self {
        set.0
    }
}

#[cfg(test)]
pub(crate) fn track(id: &str, title: &str) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        preview_ref: Some(format!("https://cdn.test/{id}.mp3")),
    }
}

#[cfg(test)]
pub(crate) fn enrolled(titles: [&str; ENROLLED_SONG_COUNT]) -> EnrolledSongSet {
    let songs = titles
        .iter()
        .enumerate()
        .map(|(idx, title)| track(&format!("song-{idx}"), title))
        .collect();
    match EnrolledSongSet::new(songs) {
        Ok(set) => set,
        Err(err) => panic!("invalid test enrollment: {err}"),
    }
}
