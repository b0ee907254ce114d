//! # PostgreSQL store
//!
//! sqlx-backed implementation of the storage ports. Enabled with the
//! `db-postgres` feature; the schema lives in `migrations/`.

mod comments;
mod query;
mod repos;

use std::sync::Arc;

use domains::{
    AppError, Clock, Collection, CollectionType, Comment, CommentTarget, Post, PostType, Profile,
    Result, Role, SessionEnd, SessionLog, State, User,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

pub use comments::PgCommentTransaction;

pub(crate) fn db_err(err: sqlx::Error) -> AppError {
    AppError::Internal(format!("database error: {err}"))
}

fn bad_value(column: &str, value: &str) -> AppError {
    AppError::Internal(format!("unexpected {column} value {value:?}"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool, clock })
    }

    pub fn from_pool(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn text(row: &PgRow, column: &str) -> Result<String> {
    row.try_get(column).map_err(db_err)
}

pub(crate) fn post_from_row(row: &PgRow) -> Result<Post> {
    let post_type = text(row, "post_type")?;
    let state = text(row, "state")?;
    Ok(Post {
        id: row.try_get("id").map_err(db_err)?,
        post_type: PostType::parse(&post_type).ok_or_else(|| bad_value("post_type", &post_type))?,
        state: State::parse(&state).ok_or_else(|| bad_value("state", &state))?,
        title: row.try_get("title").map_err(db_err)?,
        slug: row.try_get("slug").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        publish_at: row.try_get("publish_at").map_err(db_err)?,
        video_seconds: row.try_get("video_seconds").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

pub(crate) fn collection_from_row(row: &PgRow) -> Result<Collection> {
    let kind = text(row, "collection_type")?;
    let state = text(row, "state")?;
    Ok(Collection {
        id: row.try_get("id").map_err(db_err)?,
        parent_id: row.try_get("parent_id").map_err(db_err)?,
        collection_type: CollectionType::parse(&kind).ok_or_else(|| bad_value("collection_type", &kind))?,
        state: State::parse(&state).ok_or_else(|| bad_value("state", &state))?,
        name: row.try_get("name").map_err(db_err)?,
        slug: row.try_get("slug").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        asset_id: row.try_get("asset_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

pub(crate) fn user_from_row(row: &PgRow) -> Result<User> {
    let role = text(row, "role")?;
    Ok(User {
        id: row.try_get("id").map_err(db_err)?,
        username: row.try_get("username").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        password_hash: row.try_get("password_hash").map_err(db_err)?,
        role: Role::parse(&role).ok_or_else(|| bad_value("role", &role))?,
        profile: Profile {
            email_on_new_device_login: row.try_get("email_on_new_device_login").map_err(db_err)?,
        },
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

pub(crate) fn session_from_row(row: &PgRow) -> Result<SessionLog> {
    let ended_by: Option<String> = row.try_get("ended_by").map_err(db_err)?;
    let ended_by = ended_by
        .map(|v| SessionEnd::parse(&v).ok_or_else(|| bad_value("ended_by", &v)))
        .transpose()?;
    Ok(SessionLog {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        token: row.try_get("token").map_err(db_err)?,
        ip_address: row.try_get("ip_address").map_err(db_err)?,
        user_agent: row.try_get("user_agent").map_err(db_err)?,
        city: row.try_get("city").map_err(db_err)?,
        country: row.try_get("country").map_err(db_err)?,
        country_code: row.try_get("country_code").map_err(db_err)?,
        is_remember_session: row.try_get("is_remember_session").map_err(db_err)?,
        login_successful: row.try_get("login_successful").map_err(db_err)?,
        login_at: row.try_get("login_at").map_err(db_err)?,
        last_touched_at: row.try_get("last_touched_at").map_err(db_err)?,
        logout_at: row.try_get("logout_at").map_err(db_err)?,
        ended_by,
        is_current_session: false,
    })
}

pub(crate) fn target_kind(target: &CommentTarget) -> &'static str {
    match target {
        CommentTarget::Post(_) => "post",
        CommentTarget::Discussion(_) => "discussion",
        CommentTarget::LessonRequest(_) => "lesson_request",
    }
}

pub(crate) fn comment_from_row(row: &PgRow) -> Result<Comment> {
    let kind = text(row, "target_kind")?;
    let target_id = row.try_get("target_id").map_err(db_err)?;
    let target = match kind.as_str() {
        "post" => CommentTarget::Post(target_id),
        "discussion" => CommentTarget::Discussion(target_id),
        "lesson_request" => CommentTarget::LessonRequest(target_id),
        other => return Err(bad_value("target_kind", other)),
    };
    let state = text(row, "state")?;
    Ok(Comment {
        id: row.try_get("id").map_err(db_err)?,
        target,
        comment_type: target.comment_type(),
        user_id: row.try_get("user_id").map_err(db_err)?,
        root_parent_id: row.try_get("root_parent_id").map_err(db_err)?,
        reply_to: row.try_get("reply_to").map_err(db_err)?,
        state: State::parse(&state).ok_or_else(|| bad_value("state", &state))?,
        body: row.try_get("body").map_err(db_err)?,
        identity: row.try_get("identity").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
