//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::events::DomainEvent;
use crate::models::{
    AttemptPurpose, Comment, CommentTarget, Location, NewSession, NewUser, Notification,
    Progression, SessionLog, User, WatchTarget, Watchlist,
};
use crate::query::{Entity, QuerySpec};

/// Resolves a [`QuerySpec`] into records, eager loads included.
#[async_trait]
pub trait QueryExecutor<E: Entity>: Send + Sync {
    async fn fetch(&self, spec: &QuerySpec<E>) -> Result<Vec<E::Record>>;

    /// Counts matching rows; with a column, only rows where it is non-null.
    async fn count(&self, spec: &QuerySpec<E>, column: Option<E::Column>) -> Result<i64>;

    /// Sums a numeric column over matching rows; zero when nothing matches.
    async fn sum(&self, spec: &QuerySpec<E>, column: E::Column) -> Result<i64>;
}

/// Persistence for [`SessionLog`] rows.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Latest successful sign-in of `user_id` that carries `token`.
    async fn find_latest_by_token(&self, user_id: Uuid, token: &str) -> Result<Option<SessionLog>>;

    /// Any user's successful, still-open session carrying `token`.
    async fn find_open_by_token(&self, token: &str) -> Result<Option<SessionLog>>;

    /// Whether a successful session matches (ip and user agent) or the token.
    async fn is_known(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        token: Option<&str>,
    ) -> Result<bool>;

    async fn create(&self, session: NewSession) -> Result<SessionLog>;

    async fn save(&self, session: &SessionLog) -> Result<()>;

    /// Ends every open session of the user whose last touch is at or before the
    /// matching cutoff. One batch update; returns the number of rows changed.
    async fn expire_idle(
        &self,
        user_id: Uuid,
        idle_cutoff: DateTime<Utc>,
        remember_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn force_sign_out(&self, user_id: Uuid, session_id: Uuid, now: DateTime<Utc>) -> Result<u64>;

    /// Forces out every successful session except those carrying `keep_token`.
    async fn force_sign_out_all_except(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Successful, open sessions, most recently touched first.
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionLog>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Case-insensitive lookup by username or email.
    async fn find_by_uid(&self, uid: &str) -> Result<Option<User>>;
    async fn username_taken(&self, username: &str) -> Result<bool>;
    async fn email_taken(&self, email: &str) -> Result<bool>;
    async fn create(&self, user: NewUser) -> Result<User>;
}

#[async_trait]
pub trait AuthAttemptRepository: Send + Sync {
    /// Attempts recorded since `since` and not cleared.
    async fn count_since(&self, uid: &str, purpose: AttemptPurpose, since: DateTime<Utc>) -> Result<i64>;
    async fn record(&self, uid: &str, purpose: AttemptPurpose, now: DateTime<Utc>) -> Result<()>;
    /// Soft-deletes all open attempts for `uid`.
    async fn clear(&self, uid: &str, now: DateTime<Utc>) -> Result<u64>;
}

/// Entry point for comment reads and for transactional comment writes.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Opens a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn CommentTransaction>>;

    async fn find(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn list_for_target(&self, target: CommentTarget) -> Result<Vec<Comment>>;

    /// Adds or removes the user's vote; returns whether the vote now exists.
    async fn toggle_vote(&self, user_id: Uuid, comment_id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}

/// All writes of one comment operation. Nothing is visible until `commit`.
#[async_trait]
pub trait CommentTransaction: Send {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>>;
    async fn insert_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn update_comment(&mut self, comment: &Comment) -> Result<()>;
    async fn delete_comment(&mut self, id: Uuid) -> Result<()>;

    /// Direct replies; archived ones only when `include_archived`.
    async fn count_children(&mut self, id: Uuid, include_archived: bool) -> Result<i64>;
    async fn delete_votes(&mut self, comment_id: Uuid) -> Result<u64>;

    async fn post_author_ids(&mut self, post_id: Uuid) -> Result<Vec<Uuid>>;
    async fn discussion_author_id(&mut self, discussion_id: Uuid) -> Result<Option<Uuid>>;
    async fn find_users_by_usernames(&mut self, usernames: &[String]) -> Result<Vec<User>>;

    async fn insert_notification(&mut self, notification: &Notification) -> Result<()>;
    async fn update_notification_bodies(&mut self, table: &str, table_id: Uuid, body: &str) -> Result<u64>;
    async fn delete_notifications(&mut self, table: &str, table_id: Uuid) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn find(&self, user_id: Uuid, target: WatchTarget) -> Result<Option<Watchlist>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Watchlist>>;
    async fn insert(&self, entry: &Watchlist) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn list(&self, user_id: Uuid) -> Result<Vec<Watchlist>>;
}

#[async_trait]
pub trait ProgressionRepository: Send + Sync {
    async fn find(&self, user_id: Uuid, post_id: Uuid) -> Result<Option<Progression>>;
    async fn save(&self, progression: &Progression) -> Result<()>;
}

/// Geo-ip lookup. Callers treat any error as an unknown location.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip_address: &str) -> Result<Location>;
}

/// Fire-and-forget dispatch of named events.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: DomainEvent) -> Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
