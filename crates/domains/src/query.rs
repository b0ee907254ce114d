//! # Query Specification
//!
//! Storage-agnostic description of a read: filters, exclusions, ordering,
//! limit, eager loads and aggregate columns against one entity. Builders in
//! the services crate accumulate a [`QuerySpec`]; a [`crate::ports::QueryExecutor`]
//! turns it into rows.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Collection, CollectionRecord, CollectionType, Post, PostRecord, PostType, State,
};

/// Number of taxonomies eager-loaded per entity.
pub const TAXONOMY_PRELOAD_LIMIT: usize = 3;

/// Binds an entity to the vocabulary its queries are written in.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    const NAME: &'static str;
    type Filter: Clone + Debug + PartialEq + Send + Sync + 'static;
    type Column: Copy + Debug + PartialEq + Send + Sync + 'static;
    type Preload: Clone + Debug + PartialEq + Send + Sync + 'static;
    type Aggregate: Copy + Debug + PartialEq + Send + Sync + 'static;
    type Record: Debug + Send + 'static;

    /// Primary key column, the default target of exclusions.
    const ID_COLUMN: Self::Column;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order<C> {
    pub column: C,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition<E: Entity> {
    Where(E::Filter),
    NotIn(E::Column, Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec<E: Entity> {
    pub conditions: Vec<Condition<E>>,
    pub order: Vec<Order<E::Column>>,
    pub limit: Option<usize>,
    pub preloads: Vec<E::Preload>,
    pub aggregates: Vec<E::Aggregate>,
}

impl<E: Entity> Default for QuerySpec<E> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            preloads: Vec::new(),
            aggregates: Vec::new(),
        }
    }
}

impl<E: Entity> QuerySpec<E> {
    pub fn filter(&mut self, filter: E::Filter) -> &mut Self {
        self.conditions.push(Condition::Where(filter));
        self
    }

    pub fn exclude(&mut self, column: E::Column, values: Vec<Uuid>) -> &mut Self {
        self.conditions.push(Condition::NotIn(column, values));
        self
    }

    pub fn order_by(&mut self, column: E::Column, direction: Direction) -> &mut Self {
        self.order.push(Order { column, direction });
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn preload(&mut self, preload: E::Preload) -> &mut Self {
        self.preloads.push(preload);
        self
    }

    /// Aggregates are deduplicated; requesting one twice yields one column.
    pub fn aggregate(&mut self, aggregate: E::Aggregate) -> &mut Self {
        if !self.aggregates.contains(&aggregate) {
            self.aggregates.push(aggregate);
        }
        self
    }

    pub fn filters(&self) -> impl Iterator<Item = &E::Filter> {
        self.conditions.iter().filter_map(|c| match c {
            Condition::Where(f) => Some(f),
            Condition::NotIn(..) => None,
        })
    }

    pub fn has_filter(&self, filter: &E::Filter) -> bool {
        self.filters().any(|f| f == filter)
    }
}

// ── Posts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PostFilter {
    /// State is public and `publish_at` is not in the future.
    Published,
    TypeIn(Vec<PostType>),
    HasTaxonomy(Uuid),
    HasTaxonomyIn(Vec<Uuid>),
    /// Tagged with at least one taxonomy that itself has published content.
    HasTaxonomyWithContent,
    /// Member of the flattened post list of a root collection.
    InSeries(Uuid),
    /// Exact `root_sort_order` within a root collection.
    AtSeriesIndex { root_collection_id: Uuid, index: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostColumn {
    Id,
    PublishAt,
    CreatedAt,
    VideoSeconds,
    /// Only meaningful alongside [`PostFilter::InSeries`] or [`PostFilter::AtSeriesIndex`].
    RootSortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostPreload {
    Taxonomies { limit: usize },
    Authors,
    Progression { user_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAggregate {}

impl Entity for Post {
    const NAME: &'static str = "Post";
    type Filter = PostFilter;
    type Column = PostColumn;
    type Preload = PostPreload;
    type Aggregate = PostAggregate;
    type Record = PostRecord;

    const ID_COLUMN: PostColumn = PostColumn::Id;
}

// ── Collections ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionFilter {
    /// No parent collection.
    Root,
    Type(CollectionType),
    State(State),
    /// At least one flattened post is published.
    HasPublishedPosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionColumn {
    Id,
    CreatedAt,
    UpdatedAt,
    /// Derived: latest publish time across published flattened posts.
    LatestPublishAt,
}

/// Pivot column used to order a collection's posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotOrder {
    SortOrder,
    RootSortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionPreload {
    Asset,
    Taxonomies {
        limit: usize,
    },
    /// Flattened and direct posts in display form.
    Posts {
        order: PivotOrder,
        direction: Direction,
        /// Caps the flattened list per collection.
        limit: Option<usize>,
        progression_for: Option<Uuid>,
    },
    /// Public children that have published posts, with their posts.
    Children {
        progression_for: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionAggregate {
    PublishedPostCount,
    PublishedVideoSeconds,
    LatestPublishAt,
}

impl Entity for Collection {
    const NAME: &'static str = "Collection";
    type Filter = CollectionFilter;
    type Column = CollectionColumn;
    type Preload = CollectionPreload;
    type Aggregate = CollectionAggregate;
    type Record = CollectionRecord;

    const ID_COLUMN: CollectionColumn = CollectionColumn::Id;
}
