use crate::model::{
    Id,
    course::CourseMarker,
    user::{Identity, Role, UserMarker},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A stored forum post. Posts are never edited once created.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub course_id: Id<CourseMarker>,
    pub author_id: Id<UserMarker>,
    pub content: String,
    pub parent_id: Option<Id<PostMarker>>,
    pub created_at: OffsetDateTime,
}

/// A post about to be stored. `content` must already be sanitized.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct NewPost {
    pub course_id: Id<CourseMarker>,
    pub author_id: Id<UserMarker>,
    pub content: String,
    pub parent_id: Option<Id<PostMarker>>,
}

/// A post together with its author's identity as it was when the post was read.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPost {
    pub id: Id<PostMarker>,
    pub course_id: Id<CourseMarker>,
    pub author_id: Id<UserMarker>,
    pub author_name: String,
    pub author_role: Option<Role>,
    pub content: String,
    pub parent_id: Option<Id<PostMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Request body for creating a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreatePost {
    pub course_id: Id<CourseMarker>,
    pub content: String,
    #[serde(default)]
    pub parent_post_id: Option<Id<PostMarker>>,
}

impl EnrichedPost {
    /// Joins a post with its author. `None` means the author could not be
    /// resolved; the post is still shown, just without a name.
    #[must_use]
    pub fn new(post: Post, author: Option<&Identity>) -> Self {
        let (author_name, author_role) = author
            .map(|identity| (identity.name.clone(), Some(identity.role)))
            .unwrap_or_default();

        Self {
            id: post.id,
            course_id: post.course_id,
            author_id: post.author_id,
            author_name,
            author_role,
            content: post.content,
            parent_id: post.parent_id,
            created_at: post.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        post::{CreatePost, EnrichedPost, Post},
        user::{Identity, Role},
    };
    use serde_json::json;
    use time::macros::datetime;

    fn post() -> Post {
        Post {
            id: 7.into(),
            course_id: 3.into(),
            author_id: 5.into(),
            content: "Hi there".to_owned(),
            parent_id: Some(6.into()),
            created_at: datetime!(2025-03-01 12:00 UTC),
        }
    }

    #[test]
    fn enriched_post_json_shape() {
        let author = Identity {
            id: 5.into(),
            name: "Ada".to_owned(),
            role: Role::Tutor,
        };
        let enriched = EnrichedPost::new(post(), Some(&author));

        assert_eq!(
            serde_json::to_value(&enriched).unwrap(),
            json!({
                "id": "7",
                "courseId": "3",
                "authorId": "5",
                "authorName": "Ada",
                "authorRole": "Tutor",
                "content": "Hi there",
                "parentId": "6",
                "createdAt": "2025-03-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn unknown_author_is_blank() {
        let enriched = EnrichedPost::new(post(), None);

        assert_eq!(enriched.author_name, "");
        assert_eq!(enriched.author_role, None);
        assert_eq!(enriched.content, "Hi there");
    }

    #[test]
    fn create_post_parent_is_optional() {
        let body: CreatePost =
            serde_json::from_value(json!({ "course_id": 3, "content": "<i>x</i>" })).unwrap();

        assert_eq!(body.course_id, 3.into());
        assert_eq!(body.parent_post_id, None);
    }
}
