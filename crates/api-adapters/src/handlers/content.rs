use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::extract::PrivateCookieJar;
use domains::{AppError, CollectionRecord, PostRecord};
use serde::Deserialize;
use serde_json::{json, Value};
use services::{home_feed, HomeFeed, LastUpdated};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::Viewer;
use crate::state::AppState;

/// Upper bound for caller-chosen page sizes.
const MAX_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub(crate) struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestSeriesQuery {
    limit: Option<usize>,
    post_limit: Option<usize>,
    with_posts: Option<bool>,
    /// Comma separated collection ids.
    exclude: Option<String>,
}

impl LatestSeriesQuery {
    fn into_args(self) -> Result<LastUpdated, AppError> {
        let defaults = LastUpdated::default();
        let exclude_ids = self
            .exclude
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Uuid::parse_str(s).map_err(|_| AppError::invalid("exclude", "uuid", "must be a list of ids"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LastUpdated {
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIMIT),
            with_posts: self.with_posts.unwrap_or(defaults.with_posts),
            exclude_ids,
            post_limit: self.post_limit.unwrap_or(defaults.post_limit).clamp(1, MAX_LIMIT),
        })
    }
}

pub(crate) async fn home(State(state): State<AppState>) -> Result<Json<HomeFeed>, ApiError> {
    Ok(Json(home_feed(&state.collections, &state.posts).await?))
}

pub(crate) async fn series_count(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let count = state.collections.series_count().await?;
    Ok(Json(json!({ "count": count })))
}

pub(crate) async fn latest_series(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<LatestSeriesQuery>,
) -> Result<(PrivateCookieJar, Json<Vec<CollectionRecord>>), ApiError> {
    let user_id = viewer.user.as_ref().map(|u| u.id);
    let series = state
        .collections
        .last_updated(user_id, query.into_args()?)
        .await?;
    Ok((viewer.jar, Json(series)))
}

pub(crate) async fn latest_lessons(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PostRecord>>, ApiError> {
    Ok(Json(state.posts.latest_lessons(query.or(12)).await?))
}

pub(crate) async fn latest_blogs(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PostRecord>>, ApiError> {
    Ok(Json(state.posts.latest_blogs(query.or(4)).await?))
}

pub(crate) async fn latest_snippets(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PostRecord>>, ApiError> {
    Ok(Json(state.posts.latest_snippets(query.or(4)).await?))
}

pub(crate) async fn next_lesson(
    State(state): State<AppState>,
    Path((series_id, index)): Path<(Uuid, i32)>,
) -> Result<Json<PostRecord>, ApiError> {
    state
        .posts
        .next_lesson(series_id, index)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Post", format!("{series_id} after #{index}")).into())
}

pub(crate) async fn previous_lesson(
    State(state): State<AppState>,
    Path((series_id, index)): Path<(Uuid, i32)>,
) -> Result<Json<PostRecord>, ApiError> {
    state
        .posts
        .previous_lesson(series_id, index)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Post", format!("{series_id} before #{index}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_series_defaults() {
        let args = LatestSeriesQuery {
            limit: None,
            post_limit: None,
            with_posts: None,
            exclude: None,
        }
        .into_args()
        .unwrap();
        assert_eq!(args.limit, 4);
        assert_eq!(args.post_limit, 5);
        assert!(args.with_posts);
        assert!(args.exclude_ids.is_empty());
    }

    #[test]
    fn exclude_must_be_ids() {
        let id = Uuid::now_v7();
        let query = |exclude: &str| LatestSeriesQuery {
            limit: Some(500),
            post_limit: None,
            with_posts: Some(false),
            exclude: Some(exclude.to_string()),
        };
        let args = query(&format!("{id}, ")).into_args().unwrap();
        assert_eq!(args.exclude_ids, vec![id]);
        assert_eq!(args.limit, MAX_LIMIT);
        assert!(query("nope").into_args().is_err());
    }
}
