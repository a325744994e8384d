use crate::{cli::telemetry, factor::MusicFactor};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::{ApiDoc, openapi};

use handlers::{catalog, enroll, health, preview, session, unlock};

/// HTTP-layer settings that are not part of the factor itself.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    preview_host: String,
    preview_timeout: Duration,
    frontend_origin: Option<String>,
}

impl ApiConfig {
    #[must_use]
    pub fn new(preview_host: String) -> Self {
        Self {
            preview_host,
            preview_timeout: Duration::from_secs(5),
            frontend_origin: None,
        }
    }

    #[must_use]
    pub fn with_preview_timeout(mut self, timeout: Duration) -> Self {
        self.preview_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_frontend_origin(mut self, origin: Option<String>) -> Self {
        self.frontend_origin = origin;
        self
    }
}

/// Build the application router.
///
/// # Errors
/// Returns an error if the frontend origin is invalid or the preview client
/// cannot be built.
pub fn router(factor: Arc<MusicFactor>, config: &ApiConfig) -> Result<Router> {
    let relay = Arc::new(preview::PreviewRelay::new(
        &config.preview_host,
        config.preview_timeout,
    )?);

    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/v1/enroll", post(enroll::enroll))
        .route("/v1/enroll/update", post(enroll::update))
        .route("/v1/session/start", post(session::start))
        .route("/v1/session/respond", post(session::respond))
        .route("/v1/session/replay", post(session::replay))
        .route("/v1/unlock", post(unlock::unlock))
        .route("/v1/catalog/search", get(catalog::search))
        .route("/v1/preview", get(preview::preview))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()));

    if let Some(origin) = &config.frontend_origin {
        let cors = CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(AllowOrigin::exact(frontend_origin(origin)?));
        app = app.layer(cors);
    }

    Ok(app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(factor))
            .layer(Extension(relay)),
    ))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, factor: MusicFactor, config: ApiConfig) -> Result<()> {
    let app = router(Arc::new(factor), &config)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_url)
        .with_context(|| format!("Invalid frontend origin: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::factor::{
        FactorConfig, FactorError, Track, catalog::CatalogAdapter, store::MemoryStore,
    };
    use async_trait::async_trait;
    use axum::{body::to_bytes, http::StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct StaticCatalog;

    #[async_trait]
    impl CatalogAdapter for StaticCatalog {
        async fn search(&self, term: &str) -> Result<Vec<Track>, FactorError> {
            Ok(vec![Track {
                id: "1".to_string(),
                title: term.to_string(),
                artist: "Someone".to_string(),
                preview_ref: None,
            }])
        }

        async fn top_tracks(&self) -> Result<Vec<Track>, FactorError> {
            Ok(["P", "Q", "R", "S", "T", "U", "V"]
                .iter()
                .map(|title| Track {
                    id: (*title).to_string(),
                    title: (*title).to_string(),
                    artist: "Chart".to_string(),
                    preview_ref: Some(format!("https://cdn.dzcdn.net/{title}.mp3")),
                })
                .collect())
        }
    }

    fn app() -> Router {
        let factor = MusicFactor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticCatalog),
            &FactorConfig::default(),
        );
        router(Arc::new(factor), &ApiConfig::new("dzcdn.net".to_string())).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn enrollment(username: &str) -> Value {
        let songs: Vec<Value> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|title| json!({"id": title, "title": title, "artist": "Me"}))
            .collect();
        json!({"username": username, "songs": songs, "password": "recovery-pass"})
    }

    #[tokio::test]
    async fn health_reports_store_and_request_id() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-app"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["store"], "ok");
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn enroll_then_conflict() {
        let app = app();
        let (status, body) = call(&app, post_json("/v1/enroll", &enrollment("alice"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"created": true}));

        let (status, body) = call(&app, post_json("/v1/enroll", &enrollment("alice"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"error": "account_exists"}));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/session/start")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "invalid_request"}));
    }

    #[tokio::test]
    async fn start_unknown_user_reports_missing() {
        let app = app();
        let (status, body) =
            call(&app, post_json("/v1/session/start", &json!({"username": "ghost"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"exists": false}));
    }

    #[tokio::test]
    async fn wrong_answer_locks_then_unlock_restores() {
        let app = app();
        call(&app, post_json("/v1/enroll", &enrollment("bob"))).await;

        let (status, body) =
            call(&app, post_json("/v1/session/start", &json!({"username": "bob"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exists"], true);
        assert_eq!(body["locked"], false);
        assert_eq!(body["total"], 6);
        assert_eq!(body["options"].as_array().map(Vec::len), Some(5));

        let (status, body) = call(
            &app,
            post_json(
                "/v1/session/respond",
                &json!({"username": "bob", "timedOut": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": false}));

        let (status, body) = call(
            &app,
            post_json(
                "/v1/session/respond",
                &json!({"username": "bob", "notMine": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"error": "no_active_session"}));

        let (_, body) =
            call(&app, post_json("/v1/session/start", &json!({"username": "bob"}))).await;
        assert_eq!(body, json!({"exists": true, "locked": true}));

        let (_, body) = call(
            &app,
            post_json(
                "/v1/unlock",
                &json!({"username": "bob", "password": "recovery-pass"}),
            ),
        )
        .await;
        assert_eq!(body, json!({"unlocked": true}));
    }

    #[tokio::test]
    async fn replay_budget_runs_out() {
        let app = app();
        call(&app, post_json("/v1/enroll", &enrollment("carol"))).await;
        call(&app, post_json("/v1/session/start", &json!({"username": "carol"}))).await;

        for left in [2, 1, 0] {
            let (status, body) =
                call(&app, post_json("/v1/session/replay", &json!({"username": "carol"}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["replaysRemaining"], left);
        }
        let (status, body) =
            call(&app, post_json("/v1/session/replay", &json!({"username": "carol"}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({"error": "replay_budget_exhausted"}));
    }

    #[tokio::test]
    async fn search_and_preview_validation() {
        let app = app();
        let (status, body) = call(
            &app,
            Request::get("/v1/catalog/search?q=queen")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tracks"][0]["title"], "queen");

        let (status, body) = call(
            &app,
            Request::get("/v1/catalog/search").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"tracks": []}));

        let (status, body) = call(
            &app,
            Request::get("/v1/preview?url=https://example.com/a.mp3")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "invalid_preview_url"}));
    }

    #[test]
    fn frontend_origin_strips_path() {
        let origin = frontend_origin("https://login.example.com:8443/app/").unwrap();
        assert_eq!(origin, "https://login.example.com:8443");
        assert!(frontend_origin("not a url").is_err());
    }
}
