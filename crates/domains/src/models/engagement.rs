use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WatchTarget {
    Post(Uuid),
    Collection(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watchlist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target: WatchTarget,
    pub created_at: DateTime<Utc>,
}

/// A user's completion state for one post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progression {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub is_completed: bool,
    pub updated_at: DateTime<Utc>,
}
