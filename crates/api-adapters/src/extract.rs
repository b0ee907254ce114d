//! Request-scoped identity: who is calling, from where, with which session.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::{cookie::Key, CookieJar, PrivateCookieJar};
use domains::{AppError, User};
use services::{identity::resolve_client_ip, identity::REMEMBER_COOKIE, CookieAction, RequestContext};
use tracing::debug;

use crate::cookies;
use crate::error::ApiError;
use crate::state::AppState;

/// The caller, resolved once per request.
///
/// `user` is set only when the session cookie maps to a live session. The
/// jar carries any cookie change the liveness check decided on and must be
/// returned by handlers that want it delivered.
pub struct Viewer {
    pub ctx: RequestContext,
    pub user: Option<User>,
    pub jar: PrivateCookieJar,
}

impl Viewer {
    pub fn require(&self, action: &str) -> Result<&User, ApiError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized(format!("You must be signed in to {action}.")).into())
    }

    pub fn with_cookie(mut self, action: CookieAction) -> Self {
        self.jar = cookies::apply(self.jar, action);
        self
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_context(parts: &Parts, token: Option<String>) -> RequestContext {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestContext {
        ip_address: resolve_client_ip(
            header_str(&parts.headers, "cf-connecting-ip"),
            header_str(&parts.headers, "x-forwarded-for"),
            peer.as_deref(),
        ),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        token,
        has_remember_cookie: CookieJar::from_headers(&parts.headers)
            .get(REMEMBER_COOKIE)
            .is_some(),
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = match PrivateCookieJar::<Key>::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        let cookie_name = state.sessions.settings().cookie_name.clone();
        let token = jar.get(&cookie_name).map(|c| c.value().to_string());
        let viewer = Viewer {
            ctx: request_context(parts, token),
            user: None,
            jar,
        };

        let Some(token) = viewer.ctx.token.as_deref() else {
            return Ok(viewer);
        };

        let owner = match state.session_logs.find_open_by_token(token).await? {
            Some(session) => state.users.find_by_id(session.user_id).await?,
            None => None,
        };
        let Some(user) = owner else {
            debug!("session cookie has no open session");
            return Ok(viewer.with_cookie(CookieAction::Clear { name: cookie_name }));
        };

        let liveness = state.sessions.check(&user, &viewer.ctx).await?;
        if !liveness.alive {
            debug!(user_id = %user.id, "session no longer alive");
            return Ok(viewer.with_cookie(CookieAction::Clear { name: cookie_name }));
        }

        let mut viewer = match liveness.cookie {
            Some(action) => viewer.with_cookie(action),
            None => viewer,
        };
        viewer.user = Some(user);
        Ok(viewer)
    }
}
