use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::PrivateCookieJar;
use domains::{AppError, Comment, CommentTarget};
use serde::Deserialize;
use serde_json::{json, Value};
use services::{validators::CommentInput, DestroyOutcome};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::Viewer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetQuery {
    post_id: Option<Uuid>,
    discussion_id: Option<Uuid>,
    lesson_request_id: Option<Uuid>,
}

impl TargetQuery {
    fn target(&self) -> Result<CommentTarget, AppError> {
        match (self.post_id, self.discussion_id, self.lesson_request_id) {
            (Some(id), None, None) => Ok(CommentTarget::Post(id)),
            (None, Some(id), None) => Ok(CommentTarget::Discussion(id)),
            (None, None, Some(id)) => Ok(CommentTarget::LessonRequest(id)),
            _ => Err(AppError::invalid(
                "postId",
                "required",
                "exactly one comment target is required",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateBody {
    body: String,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(state.comments.list(query.target()?).await?))
}

pub(crate) async fn store(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(input): Json<CommentInput>,
) -> Result<(StatusCode, PrivateCookieJar, Json<Comment>), ApiError> {
    let comment = state
        .comments
        .store(viewer.user.as_ref(), &viewer.ctx, input)
        .await?;
    Ok((StatusCode::CREATED, viewer.jar, Json(comment)))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateBody>,
) -> Result<(PrivateCookieJar, Json<Comment>), ApiError> {
    let comment = state
        .comments
        .update(viewer.user.as_ref(), id, &input.body)
        .await?;
    Ok((viewer.jar, Json(comment)))
}

pub(crate) async fn like(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<(PrivateCookieJar, Json<Value>), ApiError> {
    let liked = state.comments.like_toggle(viewer.user.as_ref(), id).await?;
    Ok((viewer.jar, Json(json!({ "liked": liked }))))
}

pub(crate) async fn destroy(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<(PrivateCookieJar, Json<DestroyOutcome>), ApiError> {
    let outcome = state.comments.destroy(viewer.user.as_ref(), id).await?;
    Ok((viewer.jar, Json(outcome)))
}
