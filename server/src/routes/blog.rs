use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::handlers::service_handler::{cancel_batch, generate_blog, poll_batch, submit_batch};
use crate::state::AppState;

pub fn blog_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/batches", post(submit_batch))
        .route("/batches/{batchId}", get(poll_batch).delete(cancel_batch));

    Router::new()
        .route("/generate_blog", post(generate_blog))
        .nest("/api", api)
        .layer(Extension(state))
}
