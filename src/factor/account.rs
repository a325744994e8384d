//! Account records and recovery password hashing.
//!
//! The recovery password is Argon2id-hashed; verification goes through the
//! PHC verifier, which compares digests in constant time.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{error::FactorError, track::EnrolledSongSet};

pub const MIN_PASSWORD_LEN: usize = 8;

/// An enrolled user. Only `locked` changes after creation; `songs` and
/// `password_hash` are replaced wholesale by re-enrollment.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub songs: EnrolledSongSet,
    pub password_hash: String,
    pub locked: bool,
}

impl Account {
    /// Build a fresh, unlocked account.
    ///
    /// # Errors
    /// Returns `InvalidUsername` or `InvalidPassword` on bad input, or
    /// `Internal` if hashing itself fails.
    pub fn new(
        username: &str,
        songs: EnrolledSongSet,
        password: &SecretString,
    ) -> Result<Self, FactorError> {
        if !valid_username(username) {
            return Err(FactorError::InvalidUsername);
        }
        Ok(Self {
            username: username.to_string(),
            songs,
            password_hash: hash_password(password)?,
            locked: false,
        })
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("songs", &"***")
            .field("password_hash", &"***")
            .field("locked", &self.locked)
            .finish()
    }
}

/// Usernames are store keys, so keep them to a safe character set.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._-]{1,64}$").is_ok_and(|re| re.is_match(username))
}

/// Hash a recovery password into a PHC string.
///
/// # Errors
/// Returns `InvalidPassword` when shorter than [`MIN_PASSWORD_LEN`].
pub fn hash_password(password: &SecretString) -> Result<String, FactorError> {
    let plain = password.expose_secret();
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(FactorError::InvalidPassword);
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| FactorError::Internal(format!("failed to hash password: {err}")))
}

/// Check a supplied password against a stored PHC hash. A malformed hash
/// never verifies.
#[must_use]
pub fn verify_password(supplied: &SecretString, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(supplied.expose_secret().as_bytes(), &parsed)
        .is_ok()
}
