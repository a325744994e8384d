use super::{ErrorBody, error_response};
use crate::factor::{MusicFactor, Track};
use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(IntoParams, Deserialize, Debug)]
pub struct SearchQuery {
    /// Free-text search term
    #[serde(default)]
    q: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SearchResults {
    tracks: Vec<Track>,
}

#[utoipa::path(
    get,
    path= "/v1/catalog/search",
    params(SearchQuery),
    responses (
        (status = 200, description = "Matching tracks, possibly none", body = SearchResults),
        (status = 503, description = "Catalog unavailable", body = ErrorBody),
    ),
    tag= "enrollment"
)]
pub async fn search(
    factor: Extension<Arc<MusicFactor>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    match factor.search(&query.q).await {
        Ok(tracks) => Json(SearchResults { tracks }).into_response(),
        Err(err) => error_response(&err),
    }
}
