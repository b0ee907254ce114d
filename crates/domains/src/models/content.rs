//! Content entities: posts, collections (series and paths), taxonomies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication state shared by posts, collections, comments and discussions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Draft,
    Unlisted,
    Private,
    Public,
    Archived,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Draft => "draft",
            State::Unlisted => "unlisted",
            State::Private => "private",
            State::Public => "public",
            State::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(State::Draft),
            "unlisted" => Some(State::Unlisted),
            "private" => Some(State::Private),
            "public" => Some(State::Public),
            "archived" => Some(State::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Lesson,
    Blog,
    Snippet,
    News,
    Livestream,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Lesson => "lesson",
            PostType::Blog => "blog",
            PostType::Snippet => "snippet",
            PostType::News => "news",
            PostType::Livestream => "livestream",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lesson" => Some(PostType::Lesson),
            "blog" => Some(PostType::Blog),
            "snippet" => Some(PostType::Snippet),
            "news" => Some(PostType::News),
            "livestream" => Some(PostType::Livestream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Series,
    Path,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Series => "series",
            CollectionType::Path => "path",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "series" => Some(CollectionType::Series),
            "path" => Some(CollectionType::Path),
            _ => None,
        }
    }
}

/// An article, lesson, snippet, news item or livestream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub post_type: PostType,
    pub state: State,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub body: String,
    /// Scheduled publication; `None` means never published.
    pub publish_at: Option<DateTime<Utc>>,
    pub video_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Public and with a publish time that is not in the future.
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.state == State::Public && self.publish_at.is_some_and(|at| at <= now)
    }
}

/// An ordered grouping of posts: a series or a learning path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    /// Nested collections (e.g. the modules of a path) point at their parent.
    pub parent_id: Option<Uuid>,
    pub collection_type: CollectionType,
    pub state: State,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub asset_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of a post in a collection.
///
/// `sort_order` orders the post within its direct collection; `root_sort_order`
/// is the denormalized index of the post in the flattened root series/path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionPost {
    pub collection_id: Uuid,
    pub post_id: Uuid,
    pub root_collection_id: Uuid,
    pub sort_order: i32,
    pub root_sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Taxonomy attached to a post or collection, ordered by `sort_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyLink {
    pub taxonomy_id: Uuid,
    pub entity_id: Uuid,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub filename: String,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub user_id: Uuid,
    pub username: String,
}

/// A post as returned by a resolved post query, with its eager loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub post: Post,
    pub taxonomies: Vec<Taxonomy>,
    pub authors: Vec<Author>,
    /// Progression history of the querying user, newest first.
    pub progression: Vec<super::Progression>,
    /// Position in the flattened series when the query ran in a series context.
    pub root_sort_order: Option<i32>,
}

impl PostRecord {
    pub fn bare(post: Post) -> Self {
        Self {
            post,
            taxonomies: Vec::new(),
            authors: Vec::new(),
            progression: Vec::new(),
            root_sort_order: None,
        }
    }
}

/// A collection as returned by a resolved collection query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub collection: Collection,
    pub asset: Option<Asset>,
    pub taxonomies: Vec<Taxonomy>,
    pub posts_flattened: Vec<PostRecord>,
    pub posts: Vec<PostRecord>,
    pub children: Vec<CollectionRecord>,
    pub post_count: Option<i64>,
    pub video_seconds_sum: Option<i64>,
    pub latest_publish_at: Option<DateTime<Utc>>,
}

impl CollectionRecord {
    pub fn bare(collection: Collection) -> Self {
        Self {
            collection,
            asset: None,
            taxonomies: Vec::new(),
            posts_flattened: Vec::new(),
            posts: Vec::new(),
            children: Vec::new(),
            post_count: None,
            video_seconds_sum: None,
            latest_publish_at: None,
        }
    }

    pub fn total_minutes(&self) -> i64 {
        self.video_seconds_sum.unwrap_or(0) / 60
    }
}
