//! Music catalog adapter.
//!
//! The factor only needs two queries from a catalog: free-text search (for
//! enrollment) and a pool of popular tracks (for decoys and distractors).
//! [`DeezerCatalog`] implements both against the public Deezer API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{Instrument, debug, info_span, instrument, warn};
use url::Url;

use super::{error::FactorError, track::Track};

pub const DEFAULT_CATALOG_URL: &str = "https://api.deezer.com";
const SEARCH_LIMIT: &str = "10";
const CHART_LIMIT: &str = "100";
const TOP_CACHE_TTL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Free-text search. An empty result is not an error.
    async fn search(&self, term: &str) -> Result<Vec<Track>, FactorError>;

    /// Popular tracks used as the decoy and distractor pool.
    async fn top_tracks(&self) -> Result<Vec<Track>, FactorError>;
}

#[derive(Deserialize, Debug)]
struct DeezerPage {
    #[serde(default)]
    data: Vec<DeezerTrack>,
    #[serde(default)]
    error: Option<DeezerError>,
}

#[derive(Deserialize, Debug)]
struct DeezerError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct DeezerTrack {
    id: u64,
    title: String,
    #[serde(default)]
    preview: Option<String>,
    #[serde(default)]
    artist: Option<DeezerArtist>,
}

#[derive(Deserialize, Debug)]
struct DeezerArtist {
    name: String,
}

impl From<DeezerTrack> for Track {
    fn from(track: DeezerTrack) -> Self {
        Self {
            id: track.id.to_string(),
            title: track.title,
            artist: track.artist.map(|artist| artist.name).unwrap_or_default(),
            preview_ref: track.preview.filter(|preview| !preview.trim().is_empty()),
        }
    }
}

/// Decode a Deezer list response. Deezer reports errors with HTTP 200 and an
/// `error` object, so the body decides.
fn parse_page(body: &str) -> Result<Vec<Track>, FactorError> {
    let page: DeezerPage = serde_json::from_str(body)
        .map_err(|err| FactorError::CatalogUnavailable(format!("invalid catalog response: {err}")))?;
    if let Some(error) = page.error {
        return Err(FactorError::CatalogUnavailable(format!(
            "catalog error: {}",
            error.message
        )));
    }
    Ok(page.data.into_iter().map(Track::from).collect())
}

#[derive(Debug)]
struct TopCache {
    tracks: Vec<Track>,
    fetched_at: Instant,
}

impl TopCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < TOP_CACHE_TTL
    }
}

#[derive(Debug)]
pub struct DeezerCatalog {
    client: Client,
    base_url: Url,
    top_cache: RwLock<Option<TopCache>>,
}

impl DeezerCatalog {
    /// Build a catalog client; every request is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid catalog URL: {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build catalog HTTP client")?;

        Ok(Self {
            client,
            base_url,
            top_cache: RwLock::new(None),
        })
    }

    async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Track>, FactorError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| FactorError::CatalogUnavailable(format!("invalid catalog path: {err}")))?;

        let span = info_span!("catalog.fetch", catalog.path = path);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .instrument(span)
            .await
            .map_err(|err| FactorError::CatalogUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FactorError::CatalogUnavailable(format!(
                "catalog returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| FactorError::CatalogUnavailable(err.to_string()))?;

        parse_page(&body)
    }
}

#[async_trait]
impl CatalogAdapter for DeezerCatalog {
    #[instrument(skip(self))]
    async fn search(&self, term: &str) -> Result<Vec<Track>, FactorError> {
        self.fetch("search", &[("q", term), ("limit", SEARCH_LIMIT)])
            .await
    }

    #[instrument(skip(self))]
    async fn top_tracks(&self) -> Result<Vec<Track>, FactorError> {
        if let Some(cache) = self.top_cache.read().await.as_ref() {
            if cache.is_fresh() {
                return Ok(cache.tracks.clone());
            }
        }

        match self.fetch("chart/0/tracks", &[("limit", CHART_LIMIT)]).await {
            Ok(tracks) => {
                debug!("Fetched {} popular tracks", tracks.len());
                let mut cache = self.top_cache.write().await;
                *cache = Some(TopCache {
                    tracks: tracks.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(tracks)
            }
            Err(err) => {
                // fall back to the last known pool
                let cache = self.top_cache.read().await;
                if let Some(stale) = cache.as_ref().filter(|cache| !cache.tracks.is_empty()) {
                    warn!("Catalog refresh failed, serving stale pool: {err}");
                    Ok(stale.tracks.clone())
                } else {
                    Err(err)
                }
            }
        }
    }
}
