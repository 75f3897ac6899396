use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use lectern_common::model::{auth::SessionToken, user::Identity};
use lectern_db::{DbError, forum::ForumStore, repository::SessionLookup};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user behind a request's bearer session token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    identity: Identity,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn SessionLookup>: FromRef<S>,
    Arc<ForumStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token: SessionToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = token.hash()?;

        let sessions = Arc::<dyn SessionLookup>::from_ref(state);
        let timeout = Arc::<ForumStore>::from_ref(state).config().timeout;
        let session = tokio::time::timeout(timeout, sessions.fetch_session(&token_hash))
            .await
            .map_err(|_| DbError::Timeout(timeout))??
            .ok_or(ServerError::InvalidToken)?;

        if session.identity.id != token.user_id || session.is_expired_at(UtcDateTime::now()) {
            debug!(user_id = %token.user_id, "Rejecting stale or mismatched session");
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            identity: session.identity,
        })
    }
}
