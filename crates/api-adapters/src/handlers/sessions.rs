use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::PrivateCookieJar;
use domains::SessionLog;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::Viewer;
use crate::state::AppState;

pub(crate) async fn list(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<(PrivateCookieJar, Json<Vec<SessionLog>>), ApiError> {
    let user = viewer.require("view your sessions")?;
    let sessions = state.sessions.list(user, &viewer.ctx).await?;
    Ok((viewer.jar, Json(sessions)))
}

pub(crate) async fn force(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(session_id): Path<Uuid>,
) -> Result<(PrivateCookieJar, Json<Value>), ApiError> {
    let user = viewer.require("manage your sessions")?;
    let changed = state.sessions.on_sign_out_force(user, session_id).await?;
    Ok((viewer.jar, Json(json!({ "signedOut": changed }))))
}

pub(crate) async fn force_all(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<(PrivateCookieJar, Json<Value>), ApiError> {
    let user = viewer.require("manage your sessions")?;
    let changed = state.sessions.on_sign_out_force_all(user, &viewer.ctx).await?;
    Ok((viewer.jar, Json(json!({ "signedOut": changed }))))
}
