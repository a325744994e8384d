//! Music-recognition authentication factor.
//!
//! A user enrolls five songs and a recovery password. To authenticate they
//! step through six short previews: their five songs in random order plus one
//! decoy spliced in at a random position. Each real song must be named; the
//! decoy must be disowned. Any wrong answer, a naming of the decoy, or a
//! missed step deadline locks the account until the recovery password is
//! supplied.
//!
//! Flow: [`guard::AccountGuard`] gates entry, [`builder::SessionBuilder`]
//! creates the session, [`evaluator::StepEvaluator`] consumes one response per
//! call and asks [`decoy::DecoySelector`] for the next options. All state
//! lives in a [`store::Store`]; [`service::MusicFactor`] ties them together.

pub mod account;
pub mod builder;
pub mod catalog;
pub mod decoy;
pub mod error;
pub mod evaluator;
pub mod guard;
pub mod service;
pub mod session;
pub mod store;
pub mod track;

pub use error::FactorError;
pub use evaluator::{StepOutcome, StepResponse};
pub use service::{FactorConfig, MusicFactor, StartOutcome};
pub use track::Track;
