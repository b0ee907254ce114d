use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::PrivateCookieJar;
use domains::User;
use serde::Serialize;
use serde_json::{json, Value};
use services::validators::{SignInInput, SignUpInput};
use tracing::info;

use crate::error::ApiError;
use crate::extract::Viewer;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedIn {
    user: User,
    /// Where the client should navigate next. Always a local path.
    forward: String,
}

/// Accepts only same-origin paths; anything else falls back to `/`.
fn local_forward(forward: Option<&str>) -> String {
    match forward {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

pub(crate) async fn sign_up(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(input): Json<SignUpInput>,
) -> Result<(StatusCode, PrivateCookieJar, Json<SignedIn>), ApiError> {
    let forward = local_forward(input.forward.as_deref());
    let (user, sign_in) = state.auth.sign_up(input, &viewer.ctx).await?;
    let viewer = viewer.with_cookie(sign_in.cookie);
    Ok((StatusCode::CREATED, viewer.jar, Json(SignedIn { user, forward })))
}

pub(crate) async fn sign_in(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(input): Json<SignInInput>,
) -> Result<(PrivateCookieJar, Json<SignedIn>), ApiError> {
    let forward = local_forward(input.forward.as_deref());
    let (user, sign_in) = state.auth.sign_in(input, &viewer.ctx).await?;
    info!(user_id = %user.id, "signed in");
    let viewer = viewer.with_cookie(sign_in.cookie);
    Ok((viewer.jar, Json(SignedIn { user, forward })))
}

pub(crate) async fn sign_out(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<(PrivateCookieJar, Json<Value>), ApiError> {
    let user = viewer.require("sign out")?;
    let (_, cookie) = state.auth.sign_out(user, &viewer.ctx).await?;
    let viewer = viewer.with_cookie(cookie);
    Ok((viewer.jar, Json(json!({ "success": true }))))
}

#[cfg(test)]
mod tests {
    use super::local_forward;

    #[test]
    fn forward_stays_on_site() {
        assert_eq!(local_forward(Some("/series/rust")), "/series/rust");
        assert_eq!(local_forward(Some("//evil.example")), "/");
        assert_eq!(local_forward(Some("https://evil.example")), "/");
        assert_eq!(local_forward(None), "/");
    }
}
