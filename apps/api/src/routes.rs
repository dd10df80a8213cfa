use crate::handlers::{accounts, batch, health, posts};
use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::Router;

/// One router, assembled from a builder function per resource returning
/// `Router<AppState>`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/accounts", get(accounts::list_accounts))
        .route("/api/accounts/refresh", post(accounts::refresh_accounts))
        .route("/api/accounts/{id}/freeze", post(accounts::freeze_account))
        .route("/api/accounts/{id}/unfreeze", post(accounts::unfreeze_account))
        .route("/api/accounts/{id}/clear_old_posts", post(accounts::clear_old_posts))
        .route("/api/posts/query", get(posts::query_posts))
        .route("/api/posts", post(posts::create_post))
        .route(
            "/api/posts/{id}",
            patch(posts::update_post).put(posts::update_post).delete(posts::delete_post),
        )
        .route("/api/posts/bulk_delete", post(posts::bulk_delete))
        .route("/api/posts/delete_after", post(posts::delete_after))
        .route("/api/posts/batch_preflight", post(batch::batch_preflight))
        .route("/api/posts/batch/commit", post(batch::batch_commit))
        .with_state(state)
}
