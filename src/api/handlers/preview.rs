//! Audio preview relay.
//!
//! Browsers fetch previews through the service so the catalog CDN never sees
//! the client directly. Only URLs on the configured host suffix are relayed.

use super::{ErrorBody, bad_request};
use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Query},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Json, Response},
};
use reqwest::{Client, redirect::Policy};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{Instrument, error, info_span};
use url::Url;
use utoipa::IntoParams;

const INVALID_PREVIEW_URL: &str = "invalid_preview_url";
const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";

#[derive(Debug, Clone)]
pub struct PreviewRelay {
    client: Client,
    host_suffix: String,
}

impl PreviewRelay {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host_suffix: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .context("Failed to build preview HTTP client")?;
        Ok(Self {
            client,
            host_suffix: host_suffix.trim().trim_start_matches('.').to_lowercase(),
        })
    }

    /// Parse `raw` and accept it only if it points at the allowed host.
    #[must_use]
    pub fn allowed(&self, raw: &str) -> Option<Url> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_lowercase();
        let on_suffix = host == self.host_suffix
            || host
                .strip_suffix(&self.host_suffix)
                .is_some_and(|prefix| prefix.ends_with('.'));
        on_suffix.then_some(url)
    }
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct PreviewQuery {
    /// Preview URL as returned in a prompt
    url: Option<String>,
}

fn upstream_error() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            error: UPSTREAM_UNAVAILABLE.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path= "/v1/preview",
    params(PreviewQuery),
    responses (
        (status = 200, description = "Preview audio", content_type = "audio/mpeg"),
        (status = 400, description = "Missing or foreign preview URL", body = ErrorBody),
        (status = 502, description = "Preview host failed", body = ErrorBody),
    ),
    tag= "session"
)]
pub async fn preview(
    relay: Extension<Arc<PreviewRelay>>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    let Some(url) = query.url.as_deref().and_then(|raw| relay.allowed(raw)) else {
        return bad_request(INVALID_PREVIEW_URL);
    };

    let span = info_span!("preview.fetch", preview.host = url.host_str().unwrap_or_default());
    let response = match relay.client.get(url).send().instrument(span).await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            error!("Preview host returned {}", response.status());
            return upstream_error();
        }
        Err(err) => {
            error!("Preview fetch failed: {err}");
            return upstream_error();
        }
    };

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("audio/mpeg"));

    match response.bytes().await {
        Ok(body) => (
            [
                (CONTENT_TYPE, content_type),
                (CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("Preview body read failed: {err}");
            upstream_error()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Router, response::Redirect, routing::get};
    use tokio::net::TcpListener;

    fn relay() -> PreviewRelay {
        PreviewRelay::new("dzcdn.net", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn allows_only_configured_host_suffix() {
        let relay = relay();
        assert!(
            relay
                .allowed("https://cdns-preview-d.dzcdn.net/stream/c-abc.mp3")
                .is_some()
        );
        assert!(relay.allowed("https://dzcdn.net/a.mp3").is_some());
        assert!(relay.allowed("https://evildzcdn.net/a.mp3").is_none());
        assert!(relay.allowed("https://dzcdn.net.evil.com/a.mp3").is_none());
        assert!(relay.allowed("file:///etc/passwd").is_none());
        assert!(relay.allowed("not a url").is_none());
    }

    #[test]
    fn suffix_is_normalized() {
        let relay = PreviewRelay::new(" .DZCDN.net ", Duration::from_secs(1)).unwrap();
        assert!(relay.allowed("https://a.dzcdn.net/x.mp3").is_some());
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let router = Router::new()
            .route("/moved.mp3", get(|| async { Redirect::temporary("/audio.mp3") }))
            .route("/audio.mp3", get(|| async { "audio" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let relay = Arc::new(PreviewRelay::new("127.0.0.1", Duration::from_secs(1)).unwrap());

        let direct = preview(
            Extension(relay.clone()),
            Query(PreviewQuery {
                url: Some(format!("http://{addr}/audio.mp3")),
            }),
        )
        .await;
        assert_eq!(direct.status(), StatusCode::OK);
        assert_eq!(
            direct.headers().get(CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let moved = preview(
            Extension(relay),
            Query(PreviewQuery {
                url: Some(format!("http://{addr}/moved.mp3")),
            }),
        )
        .await;
        assert_eq!(moved.status(), StatusCode::BAD_GATEWAY);
    }
}
