//! # mufa (music factor authentication)
//!
//! A "something-you-recognize" authentication factor. Users enroll five songs
//! and a recovery password; to authenticate they identify short previews of
//! their songs and reject one decoy. A single wrong answer locks the account
//! until the recovery password is supplied.
//!
//! - [`factor`] holds the session protocol, the lockout state machine, and the
//!   catalog and store seams.
//! - [`api`] exposes it over HTTP with an `OpenAPI` document.
//! - [`cli`] parses configuration and starts the server.

pub mod api;
pub mod cli;
pub mod factor;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
