//! # Session lifecycle
//!
//! Creates, touches and ends [`SessionLog`] rows for signed-in users.
//! Expired sessions are swept opportunistically before every liveness
//! check and session-list read; there is no background timer.

use std::sync::Arc;

use chrono::Duration;
use domains::{
    Clock, DomainEvent, EventEmitter, GeoLocator, Location, NewSession, Result, SessionEnd,
    SessionLog, SessionPolicy, SessionRepository, TokenGenerator, User,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::{RequestContext, SESSION_COOKIE};

/// Length of freshly generated session tokens.
pub const TOKEN_LENGTH: usize = 16;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub policy: SessionPolicy,
    pub cookie_name: String,
    pub cookie_max_age: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            cookie_name: SESSION_COOKIE.to_string(),
            cookie_max_age: Duration::days(365 * 5),
        }
    }
}

/// What the HTTP adapter must do with the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    Set {
        name: String,
        value: String,
        max_age: Duration,
    },
    Clear {
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub session: SessionLog,
    pub cookie: CookieAction,
}

#[derive(Debug, Clone)]
pub struct Liveness {
    pub alive: bool,
    /// Set when the check had to establish a session for an existing credential.
    pub cookie: Option<CookieAction>,
}

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    geo: Arc<dyn GeoLocator>,
    events: Arc<dyn EventEmitter>,
    tokens: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        geo: Arc<dyn GeoLocator>,
        events: Arc<dyn EventEmitter>,
        tokens: Arc<dyn TokenGenerator>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions,
            geo,
            events,
            tokens,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Verify-or-establish: is the presented session still alive?
    ///
    /// A token with no matching record is treated as a pre-existing
    /// credential: a session is logged for it silently and it is alive.
    pub async fn check(&self, user: &User, ctx: &RequestContext) -> Result<Liveness> {
        self.sweep(user).await?;

        let Some(mut log) = self.latest(user, ctx).await? else {
            let sign_in = self.on_sign_in_existing(user, ctx).await?;
            return Ok(Liveness {
                alive: true,
                cookie: Some(sign_in.cookie),
            });
        };

        if log.force_logout() || log.logout_at.is_some() {
            return Ok(Liveness {
                alive: false,
                cookie: None,
            });
        }

        if let Some(ip) = ctx.ip_address.as_deref() {
            if log.ip_address.as_deref() != Some(ip) {
                let location = self.locate(Some(ip)).await;
                log.ip_address = Some(ip.to_string());
                log.city = location.city;
                log.country = location.country;
                log.country_code = location.country_code;
            }
        }

        let now = self.clock.now();
        log.last_touched_at = Some(log.last_touched_at.map_or(now, |prev| prev.max(now)));
        self.sessions.save(&log).await?;

        Ok(Liveness {
            alive: true,
            cookie: None,
        })
    }

    /// Logs a session for a credential that predates session tracking.
    pub async fn on_sign_in_existing(&self, user: &User, ctx: &RequestContext) -> Result<SignIn> {
        self.on_sign_in_success(user, ctx, ctx.has_remember_cookie, true)
            .await
    }

    pub async fn on_sign_in_success(
        &self,
        user: &User,
        ctx: &RequestContext,
        is_remember_session: bool,
        skip_new_device: bool,
    ) -> Result<SignIn> {
        let location = self.locate(ctx.ip_address.as_deref()).await;
        let known = self.is_known(user, ctx).await?;
        let token = self.tokens.generate(TOKEN_LENGTH);

        self.sweep(user).await?;

        let now = self.clock.now();
        let session = self
            .sessions
            .create(NewSession {
                user_id: user.id,
                token: Some(token.clone()),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                location,
                is_remember_session,
                login_successful: true,
                login_at: Some(now),
                last_touched_at: Some(now),
                logout_at: None,
                ended_by: None,
            })
            .await?;

        info!(user_id = %user.id, session_id = %session.id, remember = is_remember_session, "session established");

        if !known && !skip_new_device && user.profile.email_on_new_device_login {
            let event = DomainEvent::NewDeviceLogin {
                user_id: user.id,
                email: user.email.clone(),
                session: session.clone(),
            };
            if let Err(err) = self.events.emit(event).await {
                warn!(user_id = %user.id, error = %err, "new device notice could not be dispatched");
            }
        }

        Ok(SignIn {
            session,
            cookie: CookieAction::Set {
                name: self.settings.cookie_name.clone(),
                value: token,
                max_age: self.settings.cookie_max_age,
            },
        })
    }

    /// Ends the presented session, recording a sign-out row when none matches.
    pub async fn on_sign_out_success(
        &self,
        user: &User,
        ctx: &RequestContext,
    ) -> Result<(SessionLog, CookieAction)> {
        let now = self.clock.now();
        let log = match self.latest(user, ctx).await? {
            Some(mut log) => {
                log.logout_at = Some(now);
                log.ended_by = Some(SessionEnd::SignedOut);
                self.sessions.save(&log).await?;
                log
            }
            None => {
                self.sessions
                    .create(NewSession {
                        user_id: user.id,
                        token: None,
                        ip_address: ctx.ip_address.clone(),
                        user_agent: ctx.user_agent.clone(),
                        location: Location::default(),
                        is_remember_session: false,
                        login_successful: false,
                        login_at: None,
                        last_touched_at: None,
                        logout_at: Some(now),
                        ended_by: Some(SessionEnd::SignedOut),
                    })
                    .await?
            }
        };

        info!(user_id = %user.id, session_id = %log.id, "signed out");

        Ok((
            log,
            CookieAction::Clear {
                name: self.settings.cookie_name.clone(),
            },
        ))
    }

    /// Revokes one of the user's sessions, typically from another device.
    pub async fn on_sign_out_force(&self, user: &User, session_id: Uuid) -> Result<u64> {
        let changed = self
            .sessions
            .force_sign_out(user.id, session_id, self.clock.now())
            .await?;
        info!(user_id = %user.id, %session_id, changed, "forced sign out");
        Ok(changed)
    }

    /// Revokes every session of the user except the current one.
    pub async fn on_sign_out_force_all(&self, user: &User, ctx: &RequestContext) -> Result<u64> {
        let changed = self
            .sessions
            .force_sign_out_all_except(user.id, ctx.token.as_deref(), self.clock.now())
            .await?;
        info!(user_id = %user.id, changed, "forced sign out of other sessions");
        Ok(changed)
    }

    /// Active sessions, newest activity first, flagging the caller's own.
    pub async fn list(&self, user: &User, ctx: &RequestContext) -> Result<Vec<SessionLog>> {
        self.sweep(user).await?;

        let mut sessions = self.sessions.list_active(user.id).await?;
        for session in &mut sessions {
            session.is_current_session =
                ctx.token.is_some() && session.token.as_deref() == ctx.token.as_deref();
        }
        Ok(sessions)
    }

    /// Whether the request matches a past successful sign-in by
    /// (address and user agent) or by token.
    pub async fn is_known(&self, user: &User, ctx: &RequestContext) -> Result<bool> {
        let (ip, agent) = match (ctx.ip_address.as_deref(), ctx.user_agent.as_deref()) {
            (Some(ip), Some(agent)) => (Some(ip), Some(agent)),
            _ => (None, None),
        };
        self.sessions
            .is_known(user.id, ip, agent, ctx.token.as_deref())
            .await
    }

    pub async fn latest(&self, user: &User, ctx: &RequestContext) -> Result<Option<SessionLog>> {
        match ctx.token.as_deref() {
            Some(token) => self.sessions.find_latest_by_token(user.id, token).await,
            None => Ok(None),
        }
    }

    /// Ends the user's idle sessions in a single batch update.
    pub async fn sweep(&self, user: &User) -> Result<u64> {
        let now = self.clock.now();
        let policy = &self.settings.policy;
        let idle_cutoff = policy.idle_cutoff(now);

        info!(user_id = %user.id, expiry = %idle_cutoff, "signing out expired sessions");

        self.sessions
            .expire_idle(user.id, idle_cutoff, policy.remember_cutoff(now), now)
            .await
    }

    /// Geo lookup that never fails: errors become an unknown location.
    async fn locate(&self, ip_address: Option<&str>) -> Location {
        let Some(ip) = ip_address else {
            return Location::default();
        };
        match self.geo.locate(ip).await {
            Ok(location) => location,
            Err(err) => {
                warn!(ip, error = %err, "geo lookup failed; location unknown");
                Location::default()
            }
        }
    }
}
