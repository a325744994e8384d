use super::{ErrorBody, INVALID_REQUEST, bad_request, error_response};
use crate::factor::{
    MusicFactor, StartOutcome, StepOutcome, StepResponse, evaluator::ReplayGrant,
    session::SongOption,
};
use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UsernameRequest {
    username: String,
}

/// A step answer. Exactly one of `guess` or `notMine` is expected, unless
/// `timedOut` is set, in which case both are ignored.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    username: String,
    #[serde(default)]
    guess: Option<String>,
    #[serde(default)]
    not_mine: bool,
    #[serde(default)]
    timed_out: bool,
}

impl RespondRequest {
    fn response(&self) -> Option<StepResponse> {
        if self.timed_out {
            return Some(StepResponse::timed_out());
        }
        match (&self.guess, self.not_mine) {
            (Some(guess), false) => Some(StepResponse::Guess(guess.clone())),
            (None, true) => Some(StepResponse::NotMine),
            _ => None,
        }
    }
}

/// `{exists:false}`, `{exists:true, locked:true}`, or a prompt with
/// `exists:true, locked:false`.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<SongOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replays_remaining: Option<u8>,
}

impl From<StartOutcome> for ChallengeResponse {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::UnknownAccount => Self::default(),
            StartOutcome::Locked => Self {
                exists: true,
                locked: Some(true),
                ..Self::default()
            },
            StartOutcome::Challenge(prompt) => Self {
                exists: true,
                locked: Some(false),
                preview: prompt.preview,
                options: Some(prompt.options),
                progress: Some(prompt.progress),
                total: Some(prompt.total),
                replays_remaining: Some(prompt.replays_remaining),
            },
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum RespondResponse {
    Next(ChallengeResponse),
    Finished { success: bool },
}

impl From<StepOutcome> for RespondResponse {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Next(prompt) => Self::Next(StartOutcome::Challenge(prompt).into()),
            StepOutcome::Completed => Self::Finished { success: true },
            StepOutcome::Failed => Self::Finished { success: false },
        }
    }
}

#[utoipa::path(
    post,
    path= "/v1/session/start",
    request_body = UsernameRequest,
    responses (
        (status = 200, description = "First prompt, or why there is none", body = ChallengeResponse),
        (status = 503, description = "Catalog or store unavailable, retry later", body = ErrorBody),
    ),
    tag= "session"
)]
pub async fn start(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<UsernameRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };

    match factor.start_session(&request.username).await {
        Ok(outcome) => Json(ChallengeResponse::from(outcome)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path= "/v1/session/respond",
    request_body = RespondRequest,
    responses (
        (status = 200, description = "Next prompt, or the final verdict", body = RespondResponse),
        (status = 400, description = "Neither or both of guess and notMine given", body = ErrorBody),
        (status = 409, description = "No active session", body = ErrorBody),
        (status = 423, description = "Account locked", body = ErrorBody),
        (status = 503, description = "Catalog or store unavailable, retry later", body = ErrorBody),
    ),
    tag= "session"
)]
pub async fn respond(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<RespondRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };
    let Some(response) = request.response() else {
        return bad_request(INVALID_REQUEST);
    };

    match factor.respond(&request.username, response).await {
        Ok(outcome) => Json(RespondResponse::from(outcome)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path= "/v1/session/replay",
    request_body = UsernameRequest,
    responses (
        (status = 200, description = "Current preview replayed", body = ReplayGrant),
        (status = 409, description = "No active session", body = ErrorBody),
        (status = 429, description = "Replay budget exhausted", body = ErrorBody),
    ),
    tag= "session"
)]
pub async fn replay(
    factor: Extension<Arc<MusicFactor>>,
    payload: Option<Json<UsernameRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request(INVALID_REQUEST);
    };

    match factor.replay(&request.username).await {
        Ok(grant) => Json(grant).into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::factor::session::Prompt;
    use serde_json::json;

    fn request(value: serde_json::Value) -> RespondRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn respond_request_requires_exactly_one_answer() {
        assert_eq!(
            request(json!({"username": "a", "guess": "Song"})).response(),
            Some(StepResponse::Guess("Song".to_string()))
        );
        assert_eq!(
            request(json!({"username": "a", "notMine": true})).response(),
            Some(StepResponse::NotMine)
        );
        assert_eq!(request(json!({"username": "a"})).response(), None);
        assert_eq!(
            request(json!({"username": "a", "guess": "x", "notMine": true})).response(),
            None
        );
        assert_eq!(
            request(json!({"username": "a", "timedOut": true})).response(),
            Some(StepResponse::timed_out())
        );
    }

    #[test]
    fn outcomes_serialize_to_wire_shapes() {
        let unknown = serde_json::to_value(ChallengeResponse::from(StartOutcome::UnknownAccount))
            .unwrap();
        assert_eq!(unknown, json!({"exists": false}));

        let locked =
            serde_json::to_value(ChallengeResponse::from(StartOutcome::Locked)).unwrap();
        assert_eq!(locked, json!({"exists": true, "locked": true}));

        let done = serde_json::to_value(RespondResponse::from(StepOutcome::Completed)).unwrap();
        assert_eq!(done, json!({"success": true}));
        let failed = serde_json::to_value(RespondResponse::from(StepOutcome::Failed)).unwrap();
        assert_eq!(failed, json!({"success": false}));

        let prompt = Prompt {
            preview: Some("https://cdn.test/a.mp3".to_string()),
            options: Vec::new(),
            progress: 2,
            total: 6,
            replays_remaining: 3,
        };
        let next = serde_json::to_value(RespondResponse::from(StepOutcome::Next(prompt))).unwrap();
        assert_eq!(
            next,
            json!({
                "exists": true,
                "locked": false,
                "preview": "https://cdn.test/a.mp3",
                "options": [],
                "progress": 2,
                "total": 6,
                "replaysRemaining": 3
            })
        );
    }
}
