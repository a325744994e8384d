use super::{ErrorBody, INVALID_REQUEST, bad_request, error_response};
use crate::factor::MusicFactor;
use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct UnlockRequest {
    username: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Unlocked {
    unlocked: bool,
}

#[utoipa::path(
    post,
    path= "/v1/unlock",
    request_body = UnlockRequest,
    responses (
        (status = 200, description = "Whether the account is now unlocked", body = Unlocked),
        (status = 503, description = "Store unavailable", body = ErrorBody),
    ),
    tag= "session"
)]
pub async fn unlock(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<UnlockRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };

    let password = SecretString::from(request.password);
    match factor.unlock(&request.username, &password).await {
        Ok(unlocked) => Json(Unlocked { unlocked }).into_response(),
        Err(err) => error_response(&err),
    }
}
