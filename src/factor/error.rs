//! Error taxonomy for the music factor.
//!
//! A wrong guess or a missed decoy is NOT an error: it is the `Failed` outcome
//! of the step evaluator. Everything here is a condition that stops the request
//! before (or instead of) reaching a verification verdict.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactorError {
    /// Decoy or option generation cannot proceed. Retryable.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    /// The referenced session expired, completed, or failed already.
    #[error("no active session")]
    NoActiveSession,
    #[error("account locked")]
    AccountLocked,
    /// Persistence layer unreachable. Never a verification outcome.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("unknown account")]
    UnknownAccount,
    #[error("account already exists")]
    AccountExists,
    #[error("invalid enrollment: {0}")]
    InvalidEnrollment(String),
    #[error("invalid username")]
    InvalidUsername,
    #[error("invalid password")]
    InvalidPassword,
    /// Supplied recovery password does not match.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("replay budget exhausted")]
    ReplayBudgetExhausted,
    #[error("internal error: {0}")]
    Internal(String),
}

impl FactorError {
    /// Stable snake_case code used in API error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable(_) => "catalog_unavailable",
            Self::NoActiveSession => "no_active_session",
            Self::AccountLocked => "account_locked",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::UnknownAccount => "unknown_account",
            Self::AccountExists => "account_exists",
            Self::InvalidEnrollment(_) => "invalid_enrollment",
            Self::InvalidUsername => "invalid_username",
            Self::InvalidPassword => "invalid_password",
            Self::InvalidCredentials => "invalid_credentials",
            Self::ReplayBudgetExhausted => "replay_budget_exhausted",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CatalogUnavailable(_) | Self::StoreUnavailable(_)
        )
    }
}
