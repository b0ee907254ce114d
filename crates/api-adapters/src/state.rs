use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use domains::{SessionRepository, UserRepository};
use services::{
    AuthService, CollectionService, CommentService, PostService, ProgressionService,
    SessionService, WatchlistService,
};

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionService>,
    pub comments: Arc<CommentService>,
    pub collections: Arc<CollectionService>,
    pub posts: Arc<PostService>,
    pub watchlist: Arc<WatchlistService>,
    pub progression: Arc<ProgressionService>,
    /// Resolves the session cookie to its owner.
    pub users: Arc<dyn UserRepository>,
    pub session_logs: Arc<dyn SessionRepository>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
