use crate::{
    Result,
    record::{IdentityRecord, PostRecord, SessionRecord},
    repository::{IdentityLookup, PostRepository, SessionLookup},
};
use async_trait::async_trait;
use lectern_common::{
    model::{
        Id, LecternSnowflake, LecternSnowflakeGenerator,
        auth::{Session, SessionTokenHash},
        course::CourseMarker,
        post::{NewPost, Post, PostMarker},
        user::{Identity, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, query_as};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::debug;

/// PostgreSQL backed storage.
pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<LecternSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(LecternSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn next_snowflake(&self) -> Result<LecternSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake)
    }
}

#[async_trait]
impl PostRepository for DbClient {
    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.course_snowflake,
                posts.author_snowflake,
                posts.content,
                posts.parent_snowflake,
                posts.created_at
            FROM
                forum.posts
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::from))
    }

    async fn fetch_course_posts(&self, course_id: Id<CourseMarker>) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.course_snowflake,
                posts.author_snowflake,
                posts.content,
                posts.parent_snowflake,
                posts.created_at
            FROM
                forum.posts
            WHERE
                posts.course_snowflake = $1
            ORDER BY
                posts.created_at DESC,
                posts.seq DESC
            ",
        )
        .bind(course_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        debug!(%course_id, count = records.len(), "Fetched course posts");
        Ok(records.into_iter().map(Post::from).collect())
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post> {
        let post_snowflake = self.next_snowflake()?;
        let created_at = OffsetDateTime::from(post_snowflake.created_at());

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO forum.posts
                (post_snowflake, course_snowflake, author_snowflake, content, parent_snowflake, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                posts.post_snowflake,
                posts.course_snowflake,
                posts.author_snowflake,
                posts.content,
                posts.parent_snowflake,
                posts.created_at
            ",
        )
        .bind(post_snowflake.get().cast_signed())
        .bind(post.course_id.get().cast_signed())
        .bind(post.author_id.get().cast_signed())
        .bind(&post.content)
        .bind(post.parent_id.map(|parent_id| parent_id.get().cast_signed()))
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }
}

#[async_trait]
impl IdentityLookup for DbClient {
    async fn fetch_identity(&self, user_id: Id<UserMarker>) -> Result<Option<Identity>> {
        let record = query_as::<_, IdentityRecord>(
            "
            SELECT
                users.user_snowflake,
                users.name,
                users.role
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let identity = record.map(Identity::try_from).transpose()?;
        Ok(identity)
    }
}

#[async_trait]
impl SessionLookup for DbClient {
    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT
                sessions.token_hash,
                sessions.created_at,
                sessions.expires_after_seconds,
                users.user_snowflake,
                users.name,
                users.role
            FROM
                users.sessions NATURAL JOIN users.users
            WHERE
                sessions.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }
}
