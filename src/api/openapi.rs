use super::handlers::{ErrorBody, catalog, enroll, health, preview, session, unlock};
use crate::factor::{
    Track,
    evaluator::ReplayGrant,
    session::{Prompt, SongOption},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "mufa",
        description = "Music recognition authentication factor",
    ),
    paths(
        health::health,
        enroll::enroll,
        enroll::update,
        session::start,
        session::respond,
        session::replay,
        unlock::unlock,
        catalog::search,
        preview::preview,
    ),
    components(schemas(
        ErrorBody,
        Track,
        SongOption,
        Prompt,
        ReplayGrant,
        health::Health,
        enroll::EnrollRequest,
        enroll::UpdateEnrollmentRequest,
        enroll::Created,
        enroll::Updated,
        session::UsernameRequest,
        session::RespondRequest,
        session::ChallengeResponse,
        session::RespondResponse,
        unlock::UnlockRequest,
        unlock::Unlocked,
        catalog::SearchResults,
    )),
    tags(
        (name = "health", description = "Service and store health"),
        (name = "enrollment", description = "Song enrollment and catalog search"),
        (name = "session", description = "Verification sessions, replay and unlock"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
