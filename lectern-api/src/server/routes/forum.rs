use crate::server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use lectern_common::model::{
    Id,
    course::CourseMarker,
    post::{CreatePost, EnrichedPost},
    thread::Thread,
};
use lectern_db::forum::ForumStore;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_get(list_threads)
        .typed_post(create_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/forum/{course_id}", rejection(ServerError))]
struct ListPostsPath {
    course_id: Id<CourseMarker>,
}

async fn list_posts(
    ListPostsPath { course_id }: ListPostsPath,
    State(forum): State<Arc<ForumStore>>,
) -> Result<Json<Vec<EnrichedPost>>> {
    let posts = forum.list_posts(course_id).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/forum/{course_id}/threads", rejection(ServerError))]
struct ListThreadsPath {
    course_id: Id<CourseMarker>,
}

async fn list_threads(
    ListThreadsPath { course_id }: ListThreadsPath,
    State(forum): State<Arc<ForumStore>>,
) -> Result<Json<Vec<Thread>>> {
    let tree = forum.list_threads(course_id).await?;

    Ok(Json(tree.threads()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/forum", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(forum): State<Arc<ForumStore>>,
    user: AuthenticatedUser,
    Json(post): Json<CreatePost>,
) -> Result<(StatusCode, Json<EnrichedPost>)> {
    let post = forum
        .create_post(
            user.identity(),
            post.course_id,
            &post.content,
            post.parent_post_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}
