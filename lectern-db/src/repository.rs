//! The storage seams the forum is built on.
//!
//! [`crate::client::DbClient`] implements them on PostgreSQL and
//! [`crate::memory::MemoryDb`] in process.

use async_trait::async_trait;
use lectern_common::{
    model::{
        Id, ModelValidationError,
        auth::{Session, SessionTokenHash},
        course::CourseMarker,
        post::{NewPost, Post, PostMarker},
        user::{Identity, UserMarker},
    },
    snowflake::SnowflakeTimestampError,
};
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate a post id: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
    #[error("No answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// All posts of a course, newest first. Posts created in the same instant
    /// come in reverse insertion order.
    async fn fetch_course_posts(&self, course_id: Id<CourseMarker>) -> Result<Vec<Post>>;

    /// Stores `post`, assigning its id and creation time.
    async fn insert_post(&self, post: NewPost) -> Result<Post>;
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn fetch_identity(&self, user_id: Id<UserMarker>) -> Result<Option<Identity>>;
}

#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>>;
}
