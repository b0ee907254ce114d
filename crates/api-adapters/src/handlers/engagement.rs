use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::PrivateCookieJar;
use domains::{Progression, WatchTarget, Watchlist};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::Viewer;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Toggled {
    success: bool,
    watchlist: Watchlist,
    was_deleted: bool,
}

pub(crate) async fn watchlist(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<(PrivateCookieJar, Json<Vec<Watchlist>>), ApiError> {
    let user = viewer.require("view your watchlist")?;
    let entries = state.watchlist.list(user).await?;
    Ok((viewer.jar, Json(entries)))
}

pub(crate) async fn toggle_watchlist(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(target): Json<WatchTarget>,
) -> Result<(PrivateCookieJar, Json<Toggled>), ApiError> {
    let user = viewer.require("use the watchlist")?;
    let (watchlist, was_deleted) = state.watchlist.toggle(user, target).await?;
    Ok((
        viewer.jar,
        Json(Toggled {
            success: true,
            watchlist,
            was_deleted,
        }),
    ))
}

pub(crate) async fn remove_watchlist(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<(PrivateCookieJar, Json<Watchlist>), ApiError> {
    let user = viewer.require("use the watchlist")?;
    let removed = state.watchlist.remove(user, id).await?;
    Ok((viewer.jar, Json(removed)))
}

pub(crate) async fn toggle_complete(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(post_id): Path<Uuid>,
) -> Result<(PrivateCookieJar, Json<Progression>), ApiError> {
    let user = viewer.require("track progress")?;
    let progression = state.progression.toggle_complete(user, post_id).await?;
    Ok((viewer.jar, Json(progression)))
}
