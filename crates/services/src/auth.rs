//! Account creation and credential checks.
//!
//! Failed sign-ins are recorded per uid; once a uid has used up its
//! attempts inside the window it is refused before the password is checked.

use std::sync::Arc;

use chrono::Duration;
use domains::{
    AppError, AttemptPurpose, AuthAttemptRepository, Clock, NewUser, PasswordHasher, Profile,
    Result, Role, SessionLog, User, UserRepository,
};
use tracing::{info, warn};

use crate::identity::RequestContext;
use crate::session::{CookieAction, SessionService, SignIn};
use crate::validators::{SignInInput, SignUpInput};

#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    pub max_attempts: i64,
    pub window: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::hours(1),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    attempts: Arc<dyn AuthAttemptRepository>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: Arc<SessionService>,
    clock: Arc<dyn Clock>,
    policy: AttemptPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        attempts: Arc<dyn AuthAttemptRepository>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<SessionService>,
        clock: Arc<dyn Clock>,
        policy: AttemptPolicy,
    ) -> Self {
        Self {
            users,
            attempts,
            hasher,
            sessions,
            clock,
            policy,
        }
    }

    pub async fn sign_up(&self, input: SignUpInput, ctx: &RequestContext) -> Result<(User, SignIn)> {
        let input = input.validate()?;

        if self.users.username_taken(&input.username).await? {
            return Err(AppError::invalid("username", "unique", "is already taken"));
        }
        if self.users.email_taken(&input.email).await? {
            return Err(AppError::invalid("email", "unique", "is already registered"));
        }

        let user = self
            .users
            .create(NewUser {
                username: input.username,
                email: input.email,
                password_hash: self.hasher.hash(&input.password)?,
                role: Role::User,
                profile: Profile::default(),
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "user signed up");

        let sign_in = self
            .sessions
            .on_sign_in_success(&user, ctx, false, true)
            .await?;
        Ok((user, sign_in))
    }

    pub async fn sign_in(&self, input: SignInInput, ctx: &RequestContext) -> Result<(User, SignIn)> {
        input.validate()?;
        let uid = input.uid.trim();
        let now = self.clock.now();

        let used = self
            .attempts
            .count_since(uid, AttemptPurpose::Login, now - self.policy.window)
            .await?;
        if used >= self.policy.max_attempts {
            warn!(uid, used, "sign in refused; attempts exhausted");
            return Err(AppError::RateLimitExceeded(
                "Too many failed attempts. Please try again later.".to_string(),
            ));
        }

        let user = match self.users.find_by_uid(uid).await? {
            Some(user) if self.hasher.verify(&input.password, &user.password_hash) => user,
            _ => {
                self.attempts.record(uid, AttemptPurpose::Login, now).await?;
                return Err(AppError::Unauthorized(
                    "Invalid credentials".to_string(),
                ));
            }
        };

        self.attempts.clear(uid, now).await?;
        let sign_in = self
            .sessions
            .on_sign_in_success(&user, ctx, input.remember_me, false)
            .await?;
        Ok((user, sign_in))
    }

    pub async fn sign_out(
        &self,
        user: &User,
        ctx: &RequestContext,
    ) -> Result<(SessionLog, CookieAction)> {
        self.sessions.on_sign_out_success(user, ctx).await
    }
}
