use lectern_common::model::{
    ModelValidationError,
    auth::Session,
    post::Post,
    user::{Identity, Role},
};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, sqlx::FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub course_snowflake: i64,
    pub author_snowflake: i64,
    pub content: String,
    pub parent_snowflake: Option<i64>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, sqlx::FromRow)]
pub(crate) struct IdentityRecord {
    pub user_snowflake: i64,
    pub name: String,
    pub role: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, sqlx::FromRow)]
pub(crate) struct SessionRecord {
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
    pub user_snowflake: i64,
    pub name: String,
    pub role: String,
}

impl From<PostRecord> for Post {
    fn from(value: PostRecord) -> Self {
        Self {
            id: value.post_snowflake.cast_unsigned().into(),
            course_id: value.course_snowflake.cast_unsigned().into(),
            author_id: value.author_snowflake.cast_unsigned().into(),
            content: value.content,
            parent_id: value
                .parent_snowflake
                .map(|snowflake| snowflake.cast_unsigned().into()),
            created_at: value.created_at,
        }
    }
}

impl TryFrom<IdentityRecord> for Identity {
    type Error = ModelValidationError;

    fn try_from(value: IdentityRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            name: value.name,
            role: value.role.parse::<Role>()?,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            identity: Identity::try_from(IdentityRecord {
                user_snowflake: value.user_snowflake,
                name: value.name,
                role: value.role,
            })?,
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
