//! Bearer session tokens.
//!
//! A token reads `<user id>:<secret>:<salt>` with both secrets base64 encoded.
//! Only the argon2 hash of secret and salt is ever stored.

use crate::{
    model::{
        Id,
        user::{Identity, UserMarker},
    },
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const SESSION_SECRET_LEN: usize = 24;
pub const SESSION_SALT_LEN: usize = 18;
pub const SESSION_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing session token failed: {0}")]
pub struct SessionTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id in session token")]
    InvalidUserId,
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The secret has the wrong length")]
    InvalidSecretLength,
    #[error("The salt has the wrong length")]
    InvalidSaltLength,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub user_id: Id<UserMarker>,
    pub secret: [u8; SESSION_SECRET_LEN],
    pub salt: [u8; SESSION_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionTokenHash(pub Box<[u8; SESSION_HASH_LEN]>);

/// A logged in user, as stored next to the session's token hash.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub identity: Identity,
    pub token_hash: SessionTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

impl SessionToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            secret: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let secret = Base64Display::new(&self.secret, &BASE64_STANDARD);
        let salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{secret}:{salt}")
    }

    pub fn hash(&self) -> Result<SessionTokenHash, SessionTokenHashError> {
        let mut hash = Box::new([0; SESSION_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.secret, &self.salt, &mut *hash)
            .map_err(SessionTokenHashError)?;

        Ok(SessionTokenHash(hash))
    }
}

impl FromStr for SessionToken {
    type Err = SessionTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(user_id_part), Some(secret_part), Some(salt_part)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Self::Err::NotEnoughParts);
        };

        let user_id = user_id_part
            .parse()
            .map_err(|_| Self::Err::InvalidUserId)?;
        let secret = BASE64_STANDARD
            .decode(secret_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSecretLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            secret,
            salt,
        })
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("user_id", &self.user_id)
            .field("secret", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for SessionTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The session token hash had an invalid length")]
pub struct InvalidSessionTokenHashError;

impl TryFrom<Vec<u8>> for SessionTokenHash {
    type Error = InvalidSessionTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let hash: [u8; SESSION_HASH_LEN] =
            value.try_into().map_err(|_| InvalidSessionTokenHashError)?;
        Ok(Self(Box::new(hash)))
    }
}
