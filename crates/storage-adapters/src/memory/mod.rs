//! # In-memory store
//!
//! A process-local implementation of every storage port. It backs the test
//! suites and the `memory` database backend of the binary.
//!
//! Reads take a shared lock on [`Tables`]. Comment transactions work on a
//! private copy of the comment tables and publish it on commit, so the last
//! committed transaction wins.

mod comments;
mod query;
mod repos;

use std::sync::Arc;

use domains::{
    Asset, AuthAttempt, Clock, Collection, CollectionPost, Comment, Discussion, Notification,
    Post, Progression, SessionLog, SystemClock, Taxonomy, TaxonomyLink, User, Watchlist,
};
use tokio::sync::RwLock;
use uuid::Uuid;

pub use comments::MemoryCommentTransaction;

/// A vote on a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentVote {
    pub user_id: Uuid,
    pub comment_id: Uuid,
}

/// Author credit on a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAuthor {
    pub post_id: Uuid,
    pub user_id: Uuid,
}

/// Rows touched by comment transactions.
#[derive(Debug, Clone, Default)]
pub struct CommentTables {
    pub comments: Vec<Comment>,
    pub votes: Vec<CommentVote>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: Vec<User>,
    pub sessions: Vec<SessionLog>,
    pub attempts: Vec<AuthAttempt>,
    pub posts: Vec<Post>,
    pub post_authors: Vec<PostAuthor>,
    pub collections: Vec<Collection>,
    pub collection_posts: Vec<CollectionPost>,
    pub taxonomies: Vec<Taxonomy>,
    pub post_taxonomies: Vec<TaxonomyLink>,
    pub collection_taxonomies: Vec<TaxonomyLink>,
    pub assets: Vec<Asset>,
    pub discussions: Vec<Discussion>,
    pub comment_tables: CommentTables,
    pub watchlists: Vec<Watchlist>,
    pub progressions: Vec<Progression>,
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    /// `clock` decides what "published" means for content queries.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            clock,
        }
    }

    /// Direct write access for fixtures.
    pub async fn seed(&self, f: impl FnOnce(&mut Tables)) {
        let mut tables = self.tables.write().await;
        f(&mut tables);
    }

    /// A copy of the current state, for assertions.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }
}
