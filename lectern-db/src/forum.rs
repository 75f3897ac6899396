//! The discussion forum of a course.
//!
//! [`ForumStore`] validates and sanitizes new posts before they reach the
//! [`PostRepository`], and joins stored posts with their authors'
//! current identities when reading.

use crate::{
    DbError,
    repository::{IdentityLookup, PostRepository},
};
use lectern_common::{
    model::{
        Id,
        course::CourseMarker,
        post::{EnrichedPost, NewPost, PostMarker},
        thread::PostTree,
        user::{Identity, UserMarker},
    },
    sanitize::sanitize,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    InvalidReference(#[from] InvalidReferenceError),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DbError),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidReferenceError {
    #[error("Parent post {0} does not exist")]
    MissingParent(Id<PostMarker>),
    #[error("Parent post {parent_id} belongs to course {parent_course_id}, not {course_id}")]
    CrossCourseParent {
        parent_id: Id<PostMarker>,
        parent_course_id: Id<CourseMarker>,
        course_id: Id<CourseMarker>,
    },
}

pub type Result<T, E = ForumError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoreConfig {
    /// Upper bound for every single call into storage or identity lookup.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct ForumStore {
    posts: Arc<dyn PostRepository>,
    identities: Arc<dyn IdentityLookup>,
    config: StoreConfig,
}

impl ForumStore {
    #[must_use]
    pub fn new(
        posts: Arc<dyn PostRepository>,
        identities: Arc<dyn IdentityLookup>,
        config: StoreConfig,
    ) -> Self {
        Self {
            posts,
            identities,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// All posts of a course, newest first, each with its author's current
    /// name and role. A course without posts yields an empty list.
    pub async fn list_posts(&self, course_id: Id<CourseMarker>) -> Result<Vec<EnrichedPost>> {
        require_id(course_id, "course id")?;

        let mut posts = self
            .with_timeout(self.posts.fetch_course_posts(course_id))
            .await?;
        // Stable, so equal timestamps keep the repository's order.
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut authors: HashMap<Id<UserMarker>, Option<Identity>> = HashMap::new();
        for post in &posts {
            if !authors.contains_key(&post.author_id) {
                let identity = self
                    .with_timeout(self.identities.fetch_identity(post.author_id))
                    .await?;
                if identity.is_none() {
                    warn!(author_id = %post.author_id, "Post author has no identity");
                }
                authors.insert(post.author_id, identity);
            }
        }

        debug!(%course_id, count = posts.len(), "Listing forum posts");
        Ok(posts
            .into_iter()
            .map(|post| {
                let author = authors.get(&post.author_id).and_then(Option::as_ref);
                EnrichedPost::new(post, author)
            })
            .collect())
    }

    /// The posts of a course grouped into threads.
    pub async fn list_threads(&self, course_id: Id<CourseMarker>) -> Result<PostTree> {
        let posts = self.list_posts(course_id).await?;
        Ok(PostTree::from_posts(posts))
    }

    /// Sanitizes `raw_content` and stores it as a new post by `author`.
    ///
    /// A reply's parent must exist in the same course, otherwise nothing is
    /// stored and [`ForumError::InvalidReference`] is returned.
    pub async fn create_post(
        &self,
        author: &Identity,
        course_id: Id<CourseMarker>,
        raw_content: &str,
        parent_id: Option<Id<PostMarker>>,
    ) -> Result<EnrichedPost> {
        require_id(course_id, "course id")?;
        require_id(author.id, "author id")?;
        if let Some(parent_id) = parent_id {
            require_id(parent_id, "parent post id")?;
        }

        let content = sanitize(raw_content);

        if let Some(parent_id) = parent_id {
            self.check_parent(course_id, parent_id).await?;
        }

        let post = self
            .with_timeout(self.posts.insert_post(NewPost {
                course_id,
                author_id: author.id,
                content,
                parent_id,
            }))
            .await?;

        debug!(post_id = %post.id, %course_id, author_id = %author.id, "Created forum post");
        Ok(EnrichedPost::new(post, Some(author)))
    }

    async fn check_parent(
        &self,
        course_id: Id<CourseMarker>,
        parent_id: Id<PostMarker>,
    ) -> Result<()> {
        let parent = self.with_timeout(self.posts.fetch_post(parent_id)).await?;

        let error = match parent {
            Some(parent) if parent.course_id == course_id => return Ok(()),
            Some(parent) => InvalidReferenceError::CrossCourseParent {
                parent_id,
                parent_course_id: parent.course_id,
                course_id,
            },
            None => InvalidReferenceError::MissingParent(parent_id),
        };

        warn!(%error, "Rejecting reply");
        Err(error.into())
    }

    async fn with_timeout<T>(
        &self,
        operation: impl Future<Output = crate::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Storage call timed out");
                Err(DbError::Timeout(self.config.timeout).into())
            }
        }
    }
}

fn require_id<Marker>(id: Id<Marker>, what: &str) -> Result<()> {
    if id.is_empty() {
        Err(ForumError::InvalidArgument(format!("{what} is empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        DbError,
        forum::{ForumError, ForumStore, InvalidReferenceError, StoreConfig},
        memory::MemoryDb,
        repository::{IdentityLookup, PostRepository},
    };
    use async_trait::async_trait;
    use lectern_common::{
        model::{
            Id,
            course::CourseMarker,
            post::{NewPost, Post, PostMarker},
            user::{Identity, Role, UserMarker},
        },
        sanitize::sanitize,
    };
    use std::{sync::Arc, time::Duration};

    fn identity(id: u64, name: &str, role: Role) -> Identity {
        Identity {
            id: id.into(),
            name: name.to_owned(),
            role,
        }
    }

    fn store_with(db: &Arc<MemoryDb>) -> ForumStore {
        ForumStore::new(db.clone(), db.clone(), StoreConfig::default())
    }

    fn setup() -> (Arc<MemoryDb>, ForumStore, Identity) {
        let db = Arc::new(MemoryDb::new());
        let ada = identity(1, "Ada", Role::Student);
        db.insert_identity(ada.clone());
        let store = store_with(&db);
        (db, store, ada)
    }

    const C1: u64 = 100;
    const C2: u64 = 200;

    fn course(id: u64) -> Id<CourseMarker> {
        id.into()
    }

    #[tokio::test]
    async fn reply_scenario() {
        let (db, store, ada) = setup();

        let a = store
            .create_post(&ada, course(C1), "<b>Hi</b> there", None)
            .await
            .unwrap();
        assert_eq!(a.content, "Hi there");
        assert_eq!(a.parent_id, None);

        let b = store
            .create_post(&ada, course(C1), "reply", Some(a.id))
            .await
            .unwrap();
        assert_eq!(b.parent_id, Some(a.id));

        let c = store
            .create_post(&ada, course(C2), "elsewhere", Some(a.id))
            .await;
        assert!(matches!(
            c,
            Err(ForumError::InvalidReference(
                InvalidReferenceError::CrossCourseParent { parent_id, .. }
            )) if parent_id == a.id
        ));

        assert_eq!(db.post_count(), 2);
        assert!(store.list_posts(course(C2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_post_is_listed_once_and_sanitized() {
        let (_db, store, ada) = setup();
        let raw = "<script>steal()</script><p>What is <em>ownership</em>?</p>";

        let created = store
            .create_post(&ada, course(C1), raw, None)
            .await
            .unwrap();
        let listed = store.list_posts(course(C1)).await.unwrap();

        assert_eq!(listed, [created.clone()]);
        assert_eq!(listed[0].content, sanitize(raw));
        assert_eq!(listed[0].content, "What is ownership?");
        assert_eq!(listed[0].author_name, "Ada");
        assert_eq!(listed[0].author_role, Some(Role::Student));
    }

    #[tokio::test]
    async fn empty_content_is_accepted() {
        let (_db, store, ada) = setup();

        let post = store
            .create_post(&ada, course(C1), "<br>", None)
            .await
            .unwrap();

        assert_eq!(post.content, "");
    }

    #[tokio::test]
    async fn missing_parent_is_rejected() {
        let (db, store, ada) = setup();
        let ghost: Id<PostMarker> = 12_345.into();

        let result = store
            .create_post(&ada, course(C1), "hello?", Some(ghost))
            .await;

        assert!(matches!(
            result,
            Err(ForumError::InvalidReference(InvalidReferenceError::MissingParent(id))) if id == ghost
        ));
        assert_eq!(db.post_count(), 0);
    }

    #[tokio::test]
    async fn empty_ids_are_invalid_arguments() {
        let (db, store, ada) = setup();
        let nobody = identity(0, "Nobody", Role::Student);

        assert!(matches!(
            store.list_posts(course(0)).await,
            Err(ForumError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.create_post(&ada, course(0), "x", None).await,
            Err(ForumError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.create_post(&nobody, course(C1), "x", None).await,
            Err(ForumError::InvalidArgument(_))
        ));
        assert!(matches!(
            store
                .create_post(&ada, course(C1), "x", Some(0.into()))
                .await,
            Err(ForumError::InvalidArgument(_))
        ));
        assert_eq!(db.post_count(), 0);
    }

    #[tokio::test]
    async fn newest_first() {
        let (_db, store, ada) = setup();
        let mut created = Vec::new();
        for content in ["t1", "t2", "t3"] {
            created.push(
                store
                    .create_post(&ada, course(C1), content, None)
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let listed: Vec<_> = store
            .list_posts(course(C1))
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.content)
            .collect();

        assert_eq!(listed, ["t3", "t2", "t1"]);
        assert!(created[0].created_at < created[1].created_at);
    }

    #[tokio::test]
    async fn rapid_posts_list_in_reverse_insertion_order() {
        let (_db, store, ada) = setup();
        for content in ["first", "second", "third", "fourth"] {
            store
                .create_post(&ada, course(C1), content, None)
                .await
                .unwrap();
        }

        let listed: Vec<_> = store
            .list_posts(course(C1))
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.content)
            .collect();

        assert_eq!(listed, ["fourth", "third", "second", "first"]);
    }

    #[tokio::test]
    async fn enrichment_reflects_current_identity() {
        let (db, store, ada) = setup();
        let grace = identity(2, "Grace", Role::Tutor);
        db.insert_identity(grace.clone());

        store
            .create_post(&ada, course(C1), "question", None)
            .await
            .unwrap();
        store
            .create_post(&grace, course(C1), "answer", None)
            .await
            .unwrap();

        db.insert_identity(identity(1, "Ada Lovelace", Role::Admin));

        let listed = store.list_posts(course(C1)).await.unwrap();
        assert_eq!(listed[0].author_name, "Grace");
        assert_eq!(listed[0].author_role, Some(Role::Tutor));
        assert_eq!(listed[1].author_name, "Ada Lovelace");
        assert_eq!(listed[1].author_role, Some(Role::Admin));
    }

    #[tokio::test]
    async fn unknown_author_is_still_listed() {
        let (_db, store, _ada) = setup();
        let stranger = identity(77, "Stranger", Role::Student);

        store
            .create_post(&stranger, course(C1), "hi", None)
            .await
            .unwrap();
        let listed = store.list_posts(course(C1)).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].author_name, "");
        assert_eq!(listed[0].author_role, None);
    }

    #[tokio::test]
    async fn threads_are_assembled() {
        let (_db, store, ada) = setup();
        let root = store
            .create_post(&ada, course(C1), "root", None)
            .await
            .unwrap();
        let reply = store
            .create_post(&ada, course(C1), "reply", Some(root.id))
            .await
            .unwrap();
        store
            .create_post(&ada, course(C1), "nested", Some(reply.id))
            .await
            .unwrap();

        let tree = store.list_threads(course(C1)).await.unwrap();

        assert_eq!(tree.len(), 3);
        let threads = tree.threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].post.content, "root");
        assert_eq!(threads[0].replies[0].post.content, "reply");
        assert_eq!(threads[0].replies[0].replies[0].post.content, "nested");
    }

    #[tokio::test]
    async fn concurrent_replies_both_succeed() {
        let (db, store, ada) = setup();
        let root = store
            .create_post(&ada, course(C1), "root", None)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            store.create_post(&ada, course(C1), "one", Some(root.id)),
            store.create_post(&ada, course(C1), "two", Some(root.id)),
        );

        assert_ne!(first.unwrap().id, second.unwrap().id);
        assert_eq!(db.post_count(), 3);
    }

    /// Never answers.
    struct StalledDb;

    #[async_trait]
    impl PostRepository for StalledDb {
        async fn fetch_post(&self, _: Id<PostMarker>) -> crate::Result<Option<Post>> {
            std::future::pending().await
        }

        async fn fetch_course_posts(&self, _: Id<CourseMarker>) -> crate::Result<Vec<Post>> {
            std::future::pending().await
        }

        async fn insert_post(&self, _: NewPost) -> crate::Result<Post> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl IdentityLookup for StalledDb {
        async fn fetch_identity(&self, _: Id<UserMarker>) -> crate::Result<Option<Identity>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_storage_times_out() {
        let timeout = Duration::from_millis(20);
        let store = ForumStore::new(
            Arc::new(StalledDb),
            Arc::new(StalledDb),
            StoreConfig { timeout },
        );
        let ada = identity(1, "Ada", Role::Student);

        assert!(matches!(
            store.list_posts(course(C1)).await,
            Err(ForumError::StorageUnavailable(DbError::Timeout(elapsed))) if elapsed == timeout
        ));
        assert!(matches!(
            store.create_post(&ada, course(C1), "hi", None).await,
            Err(ForumError::StorageUnavailable(DbError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn stalled_identity_lookup_times_out() {
        let db = Arc::new(MemoryDb::new());
        let store = ForumStore::new(
            db.clone(),
            Arc::new(StalledDb),
            StoreConfig {
                timeout: Duration::from_millis(20),
            },
        );
        let ada = identity(1, "Ada", Role::Student);
        store
            .create_post(&ada, course(C1), "hi", None)
            .await
            .unwrap();

        assert!(matches!(
            store.list_posts(course(C1)).await,
            Err(ForumError::StorageUnavailable(DbError::Timeout(_)))
        ));
    }
}
