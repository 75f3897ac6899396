//! In-process storage, for tests and running without a database.

use crate::{
    Result,
    repository::{IdentityLookup, PostRepository, SessionLookup},
};
use async_trait::async_trait;
use lectern_common::model::{
    Id, LecternSnowflakeGenerator,
    auth::{Session, SessionTokenHash},
    course::CourseMarker,
    post::{NewPost, Post, PostMarker},
    user::{Identity, UserMarker},
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct MemoryDb {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// In insertion order.
    posts: Vec<Post>,
    identities: HashMap<Id<UserMarker>, Identity>,
    sessions: Vec<Session>,
    snowflake_generator: LecternSnowflakeGenerator,
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces an identity.
    pub fn insert_identity(&self, identity: Identity) {
        self.state().identities.insert(identity.id, identity);
    }

    pub fn insert_session(&self, session: Session) {
        self.state().sessions.push(session);
    }

    #[must_use]
    pub fn post_count(&self) -> usize {
        self.state().posts.len()
    }
}

#[async_trait]
impl PostRepository for MemoryDb {
    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let state = self.state();
        Ok(state.posts.iter().find(|post| post.id == post_id).cloned())
    }

    async fn fetch_course_posts(&self, course_id: Id<CourseMarker>) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .state()
            .posts
            .iter()
            .rev()
            .filter(|post| post.course_id == course_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post> {
        let mut state = self.state();
        let snowflake = state.snowflake_generator.generate()?;

        let post = Post {
            id: snowflake.into(),
            course_id: post.course_id,
            author_id: post.author_id,
            content: post.content,
            parent_id: post.parent_id,
            created_at: OffsetDateTime::from(snowflake.created_at()),
        };
        state.posts.push(post.clone());
        Ok(post)
    }
}

#[async_trait]
impl IdentityLookup for MemoryDb {
    async fn fetch_identity(&self, user_id: Id<UserMarker>) -> Result<Option<Identity>> {
        Ok(self.state().identities.get(&user_id).cloned())
    }
}

#[async_trait]
impl SessionLookup for MemoryDb {
    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let state = self.state();
        let session = state
            .sessions
            .iter()
            .find(|session| &session.token_hash == token_hash)
            .map(|session| {
                let mut session = session.clone();
                // Identity changes apply to sessions that already exist.
                if let Some(identity) = state.identities.get(&session.identity.id) {
                    session.identity = identity.clone();
                }
                session
            });
        Ok(session)
    }
}
