use std::net::SocketAddr;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use domains::{AppError, Result};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{auth, comments, content, engagement, sessions};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(auth::sign_up))
        .route("/signin", post(auth::sign_in))
        .route("/signout", post(auth::sign_out));

    let session_routes = Router::new()
        .route("/sessions", get(sessions::list).delete(sessions::force_all))
        .route("/sessions/{id}", delete(sessions::force));

    let content_routes = Router::new()
        .route("/", get(content::home))
        .route("/series", get(content::latest_series))
        .route("/series/count", get(content::series_count))
        .route("/series/{id}/lessons/{index}/next", get(content::next_lesson))
        .route("/series/{id}/lessons/{index}/previous", get(content::previous_lesson))
        .route("/lessons", get(content::latest_lessons))
        .route("/blog", get(content::latest_blogs))
        .route("/snippets", get(content::latest_snippets));

    let comment_routes = Router::new()
        .route("/comments", get(comments::list).post(comments::store))
        .route("/comments/{id}", patch(comments::update).delete(comments::destroy))
        .route("/comments/{id}/like", post(comments::like));

    let engagement_routes = Router::new()
        .route("/watchlist", get(engagement::watchlist))
        .route("/watchlist/toggle", post(engagement::toggle_watchlist))
        .route("/watchlist/{id}", delete(engagement::remove_watchlist))
        .route("/progression/{post_id}/toggle", post(engagement::toggle_complete));

    Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(content_routes)
        .merge(comment_routes)
        .merge(engagement_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Internal(format!("failed to bind {addr}: {e}")))?;
    info!("listening on {addr}");
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::Internal(format!("server error: {e}")))
}

