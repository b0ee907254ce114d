//! # services
//!
//! Business rules of learnhub. Every service talks to storage only through
//! the ports in `domains`, so any adapter set can be wired in.

pub mod auth;
pub mod builders;
pub mod collection;
pub mod comment;
pub mod home;
pub mod identity;
pub mod mention;
pub mod notification;
pub mod post;
pub mod progression;
pub mod sanitize;
pub mod session;
pub mod utils;
pub mod validators;
pub mod watchlist;

pub use auth::{AttemptPolicy, AuthService};
pub use builders::{BaseBuilder, CollectionBuilder, PostBuilder, QueryBuilder};
pub use collection::{CollectionService, LastUpdated};
pub use comment::{CommentService, DestroyOutcome};
pub use home::{home_feed, HomeFeed};
pub use identity::RequestContext;
pub use post::PostService;
pub use progression::ProgressionService;
pub use session::{CookieAction, Liveness, SessionService, SessionSettings, SignIn};
pub use watchlist::WatchlistService;
