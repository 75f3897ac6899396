use crate::server::ServerRouter;
use axum::Router;

mod forum;

pub fn routes() -> ServerRouter {
    Router::new().merge(forum::routes())
}
