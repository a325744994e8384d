use super::{ErrorBody, INVALID_REQUEST, bad_request, error_response};
use crate::factor::{MusicFactor, Track};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    username: String,
    songs: Vec<Track>,
    password: String,
}

#[derive(ToSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnrollmentRequest {
    username: String,
    current_password: String,
    songs: Vec<Track>,
    #[serde(default)]
    new_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Created {
    created: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Updated {
    updated: bool,
}

#[utoipa::path(
    post,
    path= "/v1/enroll",
    request_body = EnrollRequest,
    responses (
        (status = 201, description = "Account created", body = Created),
        (status = 400, description = "Invalid username, songs or password", body = ErrorBody),
        (status = 409, description = "Username already taken", body = ErrorBody),
        (status = 503, description = "Store unavailable", body = ErrorBody),
    ),
    tag= "enrollment"
)]
pub async fn enroll(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<EnrollRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };

    debug!("Enrolling {}", request.username);

    let password = SecretString::from(request.password);
    match factor
        .enroll(&request.username, request.songs, &password)
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(Created { created: true })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path= "/v1/enroll/update",
    request_body = UpdateEnrollmentRequest,
    responses (
        (status = 200, description = "Songs (and optionally the recovery password) replaced", body = Updated),
        (status = 400, description = "Invalid songs or password", body = ErrorBody),
        (status = 401, description = "Current recovery password does not match", body = ErrorBody),
        (status = 404, description = "Unknown account", body = ErrorBody),
        (status = 423, description = "Account locked", body = ErrorBody),
    ),
    tag= "enrollment"
)]
pub async fn update(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<UpdateEnrollmentRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };

    let current = SecretString::from(request.current_password);
    let new_password = request.new_password.map(SecretString::from);
    match factor
        .re_enroll(
            &request.username,
            &current,
            request.songs,
            new_password.as_ref(),
        )
        .await
    {
        Ok(()) => Json(Updated { updated: true }).into_response(),
        Err(err) => error_response(&err),
    }
}
