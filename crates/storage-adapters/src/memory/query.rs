//! Evaluates a [`QuerySpec`] against [`Tables`].

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AppError, Author, Collection, CollectionAggregate, CollectionColumn, CollectionFilter,
    CollectionPost, CollectionPreload, CollectionRecord, Condition, Direction, Order,
    PivotOrder, Post, PostColumn, PostFilter, PostPreload, PostRecord, Progression,
    QueryExecutor, QuerySpec, Result, State, Taxonomy, TaxonomyLink, TAXONOMY_PRELOAD_LIMIT,
};
use uuid::Uuid;

use super::{MemoryStore, Tables};

/// Comparable projection of one column.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Key {
    Time(Option<DateTime<Utc>>),
    Int(Option<i64>),
    Id(Uuid),
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

fn sort_rows<R, C: Copy>(rows: &mut [R], order: &[Order<C>], key: impl Fn(&R, C) -> Key) {
    rows.sort_by(|a, b| {
        order.iter().fold(Ordering::Equal, |acc, o| {
            acc.then_with(|| directed(key(a, o.column).cmp(&key(b, o.column)), o.direction))
        })
    });
}

fn apply_limit<R>(rows: &mut Vec<R>, limit: Option<usize>) {
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
}

fn top_taxonomies(t: &Tables, links: &[TaxonomyLink], entity_id: Uuid, limit: usize) -> Vec<Taxonomy> {
    let mut linked: Vec<&TaxonomyLink> = links.iter().filter(|l| l.entity_id == entity_id).collect();
    linked.sort_by_key(|l| l.sort_order);
    linked
        .into_iter()
        .filter_map(|l| t.taxonomies.iter().find(|tx| tx.id == l.taxonomy_id).cloned())
        .take(limit)
        .collect()
}

fn authors(t: &Tables, post_id: Uuid) -> Vec<Author> {
    t.post_authors
        .iter()
        .filter(|a| a.post_id == post_id)
        .filter_map(|a| t.users.iter().find(|u| u.id == a.user_id))
        .map(|u| Author {
            user_id: u.id,
            username: u.username.clone(),
        })
        .collect()
}

fn progression(t: &Tables, user_id: Uuid, post_id: Uuid) -> Vec<Progression> {
    let mut rows: Vec<Progression> = t
        .progressions
        .iter()
        .filter(|p| p.user_id == user_id && p.post_id == post_id)
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    rows
}

fn pivot(t: &Tables, post_id: Uuid, root_collection_id: Uuid) -> Option<&CollectionPost> {
    t.collection_posts
        .iter()
        .find(|cp| cp.post_id == post_id && cp.root_collection_id == root_collection_id)
}

// ── Posts ───────────────────────────────────────────────────────────────────

fn taxonomy_has_content(t: &Tables, taxonomy_id: Uuid, now: DateTime<Utc>) -> bool {
    t.post_taxonomies
        .iter()
        .filter(|l| l.taxonomy_id == taxonomy_id)
        .any(|l| t.posts.iter().any(|p| p.id == l.entity_id && p.is_published(now)))
}

fn post_matches(t: &Tables, post: &Post, filter: &PostFilter, now: DateTime<Utc>) -> bool {
    let tagged = |pred: &dyn Fn(Uuid) -> bool| {
        t.post_taxonomies
            .iter()
            .any(|l| l.entity_id == post.id && pred(l.taxonomy_id))
    };
    match filter {
        PostFilter::Published => post.is_published(now),
        PostFilter::TypeIn(types) => types.contains(&post.post_type),
        PostFilter::HasTaxonomy(id) => tagged(&|tid| tid == *id),
        PostFilter::HasTaxonomyIn(ids) => tagged(&|tid| ids.contains(&tid)),
        PostFilter::HasTaxonomyWithContent => tagged(&|tid| taxonomy_has_content(t, tid, now)),
        PostFilter::InSeries(root) => pivot(t, post.id, *root).is_some(),
        PostFilter::AtSeriesIndex {
            root_collection_id,
            index,
        } => pivot(t, post.id, *root_collection_id).is_some_and(|cp| cp.root_sort_order == *index),
    }
}

fn post_uuid(post: &Post, column: PostColumn) -> Option<Uuid> {
    match column {
        PostColumn::Id => Some(post.id),
        _ => None,
    }
}

/// Root collection the query is scoped to, if any.
fn series_context(spec: &QuerySpec<Post>) -> Option<Uuid> {
    spec.filters().find_map(|f| match f {
        PostFilter::InSeries(root) => Some(*root),
        PostFilter::AtSeriesIndex {
            root_collection_id, ..
        } => Some(*root_collection_id),
        _ => None,
    })
}

/// Matching posts with their series position, unsorted and unlimited.
fn matching_posts(t: &Tables, spec: &QuerySpec<Post>, now: DateTime<Utc>) -> Vec<(Post, Option<i32>)> {
    let series = series_context(spec);
    t.posts
        .iter()
        .filter(|post| {
            spec.conditions.iter().all(|c| match c {
                Condition::Where(f) => post_matches(t, post, f, now),
                Condition::NotIn(column, ids) => post_uuid(post, *column).map_or(true, |v| !ids.contains(&v)),
            })
        })
        .map(|post| {
            let position = series
                .and_then(|root| pivot(t, post.id, root))
                .map(|cp| cp.root_sort_order);
            (post.clone(), position)
        })
        .collect()
}

fn post_key(row: &(Post, Option<i32>), column: PostColumn) -> Key {
    let (post, position) = row;
    match column {
        PostColumn::Id => Key::Id(post.id),
        PostColumn::PublishAt => Key::Time(post.publish_at),
        PostColumn::CreatedAt => Key::Time(Some(post.created_at)),
        PostColumn::VideoSeconds => Key::Int(Some(post.video_seconds)),
        PostColumn::RootSortOrder => Key::Int(position.map(i64::from)),
    }
}

fn load_post(t: &Tables, post: Post, position: Option<i32>, preloads: &[PostPreload]) -> PostRecord {
    let mut record = PostRecord::bare(post);
    record.root_sort_order = position;
    for preload in preloads {
        match preload {
            PostPreload::Taxonomies { limit } => {
                record.taxonomies = top_taxonomies(t, &t.post_taxonomies, record.post.id, *limit)
            }
            PostPreload::Authors => record.authors = authors(t, record.post.id),
            PostPreload::Progression { user_id } => {
                record.progression = progression(t, *user_id, record.post.id)
            }
        }
    }
    record
}

#[async_trait]
impl QueryExecutor<Post> for MemoryStore {
    async fn fetch(&self, spec: &QuerySpec<Post>) -> Result<Vec<PostRecord>> {
        let t = self.tables.read().await;
        let mut rows = matching_posts(&t, spec, self.clock.now());
        sort_rows(&mut rows, &spec.order, post_key);
        apply_limit(&mut rows, spec.limit);
        Ok(rows
            .into_iter()
            .map(|(post, position)| load_post(&t, post, position, &spec.preloads))
            .collect())
    }

    async fn count(&self, spec: &QuerySpec<Post>, column: Option<PostColumn>) -> Result<i64> {
        let t = self.tables.read().await;
        let rows = matching_posts(&t, spec, self.clock.now());
        let counted = match column {
            None => rows.len(),
            Some(column) => rows
                .iter()
                .filter(|row| !matches!(post_key(row, column), Key::Time(None) | Key::Int(None)))
                .count(),
        };
        Ok(counted as i64)
    }

    async fn sum(&self, spec: &QuerySpec<Post>, column: PostColumn) -> Result<i64> {
        let t = self.tables.read().await;
        matching_posts(&t, spec, self.clock.now())
            .iter()
            .map(|row| match post_key(row, column) {
                Key::Int(value) => Ok(value.unwrap_or(0)),
                _ => Err(AppError::Internal(format!("column {column:?} cannot be summed"))),
            })
            .sum()
    }
}

// ── Collections ─────────────────────────────────────────────────────────────

/// Published posts of the collection's flattened list with their pivot rows.
fn flattened_published<'a>(
    t: &'a Tables,
    collection_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<(&'a CollectionPost, &'a Post)> {
    t.collection_posts
        .iter()
        .filter(|cp| cp.root_collection_id == collection_id)
        .filter_map(|cp| {
            t.posts
                .iter()
                .find(|p| p.id == cp.post_id && p.is_published(now))
                .map(|p| (cp, p))
        })
        .collect()
}

/// Published posts attached directly to the collection.
fn direct_published<'a>(
    t: &'a Tables,
    collection_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<(&'a CollectionPost, &'a Post)> {
    t.collection_posts
        .iter()
        .filter(|cp| cp.collection_id == collection_id)
        .filter_map(|cp| {
            t.posts
                .iter()
                .find(|p| p.id == cp.post_id && p.is_published(now))
                .map(|p| (cp, p))
        })
        .collect()
}

fn latest_publish_at(t: &Tables, collection_id: Uuid, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    flattened_published(t, collection_id, now)
        .into_iter()
        .filter_map(|(_, p)| p.publish_at)
        .max()
}

fn collection_matches(t: &Tables, c: &Collection, filter: &CollectionFilter, now: DateTime<Utc>) -> bool {
    match filter {
        CollectionFilter::Root => c.parent_id.is_none(),
        CollectionFilter::Type(kind) => c.collection_type == *kind,
        CollectionFilter::State(state) => c.state == *state,
        CollectionFilter::HasPublishedPosts => !flattened_published(t, c.id, now).is_empty(),
    }
}

fn collection_key(t: &Tables, c: &Collection, column: CollectionColumn, now: DateTime<Utc>) -> Key {
    match column {
        CollectionColumn::Id => Key::Id(c.id),
        CollectionColumn::CreatedAt => Key::Time(Some(c.created_at)),
        CollectionColumn::UpdatedAt => Key::Time(Some(c.updated_at)),
        CollectionColumn::LatestPublishAt => Key::Time(latest_publish_at(t, c.id, now)),
    }
}

fn collection_uuid(c: &Collection, column: CollectionColumn) -> Option<Uuid> {
    match column {
        CollectionColumn::Id => Some(c.id),
        _ => None,
    }
}

fn matching_collections(t: &Tables, spec: &QuerySpec<Collection>, now: DateTime<Utc>) -> Vec<Collection> {
    t.collections
        .iter()
        .filter(|c| {
            spec.conditions.iter().all(|cond| match cond {
                Condition::Where(f) => collection_matches(t, c, f, now),
                Condition::NotIn(column, ids) => {
                    collection_uuid(c, *column).map_or(true, |v| !ids.contains(&v))
                }
            })
        })
        .cloned()
        .collect()
}

/// Posts in display form: taxonomies, authors and the user's progression.
fn display_posts(
    t: &Tables,
    mut rows: Vec<(&CollectionPost, &Post)>,
    order: PivotOrder,
    direction: Direction,
    limit: Option<usize>,
    progression_for: Option<Uuid>,
) -> Vec<PostRecord> {
    rows.sort_by(|(a, _), (b, _)| {
        let ordering = match order {
            PivotOrder::SortOrder => a.sort_order.cmp(&b.sort_order),
            PivotOrder::RootSortOrder => a.root_sort_order.cmp(&b.root_sort_order),
        };
        directed(ordering, direction)
    });
    apply_limit(&mut rows, limit);

    let mut preloads = vec![
        PostPreload::Taxonomies {
            limit: TAXONOMY_PRELOAD_LIMIT,
        },
        PostPreload::Authors,
    ];
    if let Some(user_id) = progression_for {
        preloads.push(PostPreload::Progression { user_id });
    }

    rows.into_iter()
        .map(|(cp, post)| load_post(t, post.clone(), Some(cp.root_sort_order), &preloads))
        .collect()
}

fn load_children(t: &Tables, parent_id: Uuid, progression_for: Option<Uuid>, now: DateTime<Utc>) -> Vec<CollectionRecord> {
    t.collections
        .iter()
        .filter(|c| c.parent_id == Some(parent_id) && c.state == State::Public)
        .filter_map(|c| {
            let posts = direct_published(t, c.id, now);
            if posts.is_empty() {
                return None;
            }
            let mut record = CollectionRecord::bare(c.clone());
            record.posts = display_posts(t, posts, PivotOrder::SortOrder, Direction::Asc, None, progression_for);
            Some(record)
        })
        .collect()
}

fn load_collection(t: &Tables, c: Collection, spec: &QuerySpec<Collection>, now: DateTime<Utc>) -> CollectionRecord {
    let mut record = CollectionRecord::bare(c);
    let id = record.collection.id;

    for preload in &spec.preloads {
        match preload {
            CollectionPreload::Asset => {
                record.asset = record
                    .collection
                    .asset_id
                    .and_then(|asset_id| t.assets.iter().find(|a| a.id == asset_id).cloned())
            }
            CollectionPreload::Taxonomies { limit } => {
                record.taxonomies = top_taxonomies(t, &t.collection_taxonomies, id, *limit)
            }
            CollectionPreload::Posts {
                order,
                direction,
                limit,
                progression_for,
            } => {
                record.posts_flattened = display_posts(
                    t,
                    flattened_published(t, id, now),
                    *order,
                    *direction,
                    *limit,
                    *progression_for,
                );
                record.posts = display_posts(
                    t,
                    direct_published(t, id, now),
                    *order,
                    *direction,
                    None,
                    *progression_for,
                );
            }
            CollectionPreload::Children { progression_for } => {
                record.children = load_children(t, id, *progression_for, now)
            }
        }
    }

    for aggregate in &spec.aggregates {
        let published = flattened_published(t, id, now);
        match aggregate {
            CollectionAggregate::PublishedPostCount => record.post_count = Some(published.len() as i64),
            CollectionAggregate::PublishedVideoSeconds => {
                record.video_seconds_sum = Some(published.iter().map(|(_, p)| p.video_seconds).sum())
            }
            CollectionAggregate::LatestPublishAt => {
                record.latest_publish_at = published.iter().filter_map(|(_, p)| p.publish_at).max()
            }
        }
    }

    record
}

#[async_trait]
impl QueryExecutor<Collection> for MemoryStore {
    async fn fetch(&self, spec: &QuerySpec<Collection>) -> Result<Vec<CollectionRecord>> {
        let t = self.tables.read().await;
        let now = self.clock.now();
        let mut rows = matching_collections(&t, spec, now);
        sort_rows(&mut rows, &spec.order, |c, column| collection_key(&t, c, column, now));
        apply_limit(&mut rows, spec.limit);
        Ok(rows
            .into_iter()
            .map(|c| load_collection(&t, c, spec, now))
            .collect())
    }

    async fn count(&self, spec: &QuerySpec<Collection>, column: Option<CollectionColumn>) -> Result<i64> {
        let t = self.tables.read().await;
        let now = self.clock.now();
        let rows = matching_collections(&t, spec, now);
        let counted = match column {
            None => rows.len(),
            Some(column) => rows
                .iter()
                .filter(|c| !matches!(collection_key(&t, c, column, now), Key::Time(None)))
                .count(),
        };
        Ok(counted as i64)
    }

    async fn sum(&self, _spec: &QuerySpec<Collection>, column: CollectionColumn) -> Result<i64> {
        Err(AppError::Internal(format!("column {column:?} cannot be summed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domains::{CollectionType, PostType};

    fn post(now: DateTime<Utc>, state: State, publish_in: Option<Duration>) -> Post {
        Post {
            id: Uuid::now_v7(),
            post_type: PostType::Lesson,
            state,
            title: "Lesson".into(),
            slug: "lesson".into(),
            description: None,
            body: String::new(),
            publish_at: publish_in.map(|d| now + d),
            video_seconds: 120,
            created_at: now,
            updated_at: now,
        }
    }

    fn collection(now: DateTime<Utc>) -> Collection {
        Collection {
            id: Uuid::now_v7(),
            parent_id: None,
            collection_type: CollectionType::Series,
            state: State::Public,
            name: "Series".into(),
            slug: "series".into(),
            description: None,
            asset_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn future_posts_are_not_published() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let live = post(now, State::Public, Some(Duration::days(-1)));
        let scheduled = post(now, State::Public, Some(Duration::days(1)));
        let live_id = live.id;
        store.seed(|t| t.posts.extend([live, scheduled])).await;

        let mut spec = QuerySpec::<Post>::default();
        spec.filter(PostFilter::Published);
        let rows = QueryExecutor::<Post>::fetch(&store, &spec).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].post.id, live_id);
    }

    #[tokio::test]
    async fn published_aggregates_skip_drafts() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let series = collection(now);
        let live = post(now, State::Public, Some(Duration::days(-1)));
        let draft = post(now, State::Draft, Some(Duration::days(-1)));
        let pivots = [&live, &draft]
            .iter()
            .enumerate()
            .map(|(i, p)| CollectionPost {
                collection_id: series.id,
                post_id: p.id,
                root_collection_id: series.id,
                sort_order: i as i32,
                root_sort_order: i as i32,
            })
            .collect::<Vec<_>>();
        store
            .seed(|t| {
                t.collections.push(series);
                t.posts.extend([live, draft]);
                t.collection_posts.extend(pivots);
            })
            .await;

        let mut spec = QuerySpec::<Collection>::default();
        spec.aggregate(CollectionAggregate::PublishedPostCount)
            .aggregate(CollectionAggregate::PublishedVideoSeconds);
        let rows = QueryExecutor::<Collection>::fetch(&store, &spec).await.unwrap();

        assert_eq!(rows[0].post_count, Some(1));
        assert_eq!(rows[0].video_seconds_sum, Some(120));
    }
}
