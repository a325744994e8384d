pub mod catalog;
pub mod enroll;
pub mod health;
pub mod preview;
pub mod session;
pub mod unlock;

use crate::factor::FactorError;
use axum::{
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

/// Error body shared by every endpoint. Failure bodies never say which step
/// or which song went wrong.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) const INVALID_REQUEST: &str = "invalid_request";

/// Seconds a client should wait before retrying a retryable failure.
const RETRY_AFTER_SECONDS: &str = "1";

pub(crate) fn status_for(err: &FactorError) -> StatusCode {
    match err {
        FactorError::CatalogUnavailable(_) | FactorError::StoreUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        FactorError::NoActiveSession | FactorError::AccountExists => StatusCode::CONFLICT,
        FactorError::AccountLocked => StatusCode::LOCKED,
        FactorError::UnknownAccount => StatusCode::NOT_FOUND,
        FactorError::InvalidEnrollment(_)
        | FactorError::InvalidUsername
        | FactorError::InvalidPassword => StatusCode::BAD_REQUEST,
        FactorError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        FactorError::ReplayBudgetExhausted => StatusCode::TOO_MANY_REQUESTS,
        FactorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: &FactorError) -> Response {
    match err {
        FactorError::StoreUnavailable(_) | FactorError::Internal(_) => error!("{err}"),
        FactorError::CatalogUnavailable(_) => warn!("{err}"),
        _ => debug!("{err}"),
    }
    let mut response = (
        status_for(err),
        Json(ErrorBody {
            error: err.code().to_string(),
        }),
    )
        .into_response();
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
    }
    response
}

pub(crate) fn bad_request(code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: code.to_string(),
        }),
    )
        .into_response()
}
