//! Compiles a [`QuerySpec`] into SQL.
//!
//! The main rows come back in one statement with aggregates as subselects.
//! Each eager load is one additional statement over the fetched ids.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AppError, Asset, Author, Collection, CollectionAggregate, CollectionColumn, CollectionFilter,
    CollectionPreload, CollectionRecord, Condition, Direction, Order, PivotOrder, Post,
    PostColumn, PostFilter, PostPreload, PostRecord, Progression, QueryExecutor, QuerySpec,
    Result, Taxonomy, TAXONOMY_PRELOAD_LIMIT,
};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{collection_from_row, db_err, post_from_row, PgStore};

const POST_COLUMNS: &str = "p.id, p.post_type, p.state, p.title, p.slug, p.description, p.body, \
     p.publish_at, p.video_seconds, p.created_at, p.updated_at";

fn push_published(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, now: DateTime<Utc>) {
    qb.push(format!(
        "({alias}.state = 'public' AND {alias}.publish_at IS NOT NULL AND {alias}.publish_at <= "
    ));
    qb.push_bind(now);
    qb.push(")");
}

fn push_order<C: Copy>(qb: &mut QueryBuilder<'_, Postgres>, order: &[Order<C>], column: impl Fn(C) -> &'static str) {
    for (i, o) in order.iter().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(column(o.column));
        qb.push(match o.direction {
            Direction::Asc => " ASC NULLS FIRST",
            Direction::Desc => " DESC NULLS LAST",
        });
    }
}

fn push_limit(qb: &mut QueryBuilder<'_, Postgres>, limit: Option<usize>) {
    if let Some(limit) = limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
}

/// Taxonomies linked through `table`, keyed by `owner`, in link order.
fn taxonomy_sql(table: &str, owner: &str) -> String {
    format!(
        "SELECT l.{owner} AS owner_id, t.id, t.name, t.slug FROM {table} l \
         JOIN taxonomies t ON t.id = l.taxonomy_id WHERE l.{owner} = ANY($1) ORDER BY l.sort_order, t.name"
    )
}

/// Keeps the first `limit` entries of every group.
fn group_limit<T>(grouped: &mut HashMap<Uuid, Vec<T>>, limit: Option<usize>) {
    if let Some(limit) = limit {
        for rows in grouped.values_mut() {
            rows.truncate(limit);
        }
    }
}

// ── Posts ───────────────────────────────────────────────────────────────────

fn series_context(spec: &QuerySpec<Post>) -> Option<Uuid> {
    spec.filters().find_map(|f| match f {
        PostFilter::InSeries(root) => Some(*root),
        PostFilter::AtSeriesIndex {
            root_collection_id, ..
        } => Some(*root_collection_id),
        _ => None,
    })
}

fn post_column(column: PostColumn) -> &'static str {
    match column {
        PostColumn::Id => "id",
        PostColumn::PublishAt => "publish_at",
        PostColumn::CreatedAt => "created_at",
        PostColumn::VideoSeconds => "video_seconds",
        PostColumn::RootSortOrder => "root_sort_order",
    }
}

fn push_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter, now: DateTime<Utc>) {
    match filter {
        PostFilter::Published => push_published(qb, "p", now),
        PostFilter::TypeIn(types) => {
            qb.push("p.post_type = ANY(");
            qb.push_bind(types.iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>());
            qb.push(")");
        }
        PostFilter::HasTaxonomy(id) => {
            qb.push("EXISTS (SELECT 1 FROM post_taxonomies pt WHERE pt.post_id = p.id AND pt.taxonomy_id = ");
            qb.push_bind(*id);
            qb.push(")");
        }
        PostFilter::HasTaxonomyIn(ids) => {
            qb.push("EXISTS (SELECT 1 FROM post_taxonomies pt WHERE pt.post_id = p.id AND pt.taxonomy_id = ANY(");
            qb.push_bind(ids.clone());
            qb.push("))");
        }
        PostFilter::HasTaxonomyWithContent => {
            qb.push(
                "EXISTS (SELECT 1 FROM post_taxonomies pt WHERE pt.post_id = p.id AND EXISTS (\
                 SELECT 1 FROM post_taxonomies pt2 JOIN posts p2 ON p2.id = pt2.post_id \
                 WHERE pt2.taxonomy_id = pt.taxonomy_id AND ",
            );
            push_published(qb, "p2", now);
            qb.push("))");
        }
        PostFilter::InSeries(root) => {
            qb.push("EXISTS (SELECT 1 FROM collection_posts cps WHERE cps.post_id = p.id AND cps.root_collection_id = ");
            qb.push_bind(*root);
            qb.push(")");
        }
        PostFilter::AtSeriesIndex {
            root_collection_id,
            index,
        } => {
            qb.push("EXISTS (SELECT 1 FROM collection_posts cps WHERE cps.post_id = p.id AND cps.root_collection_id = ");
            qb.push_bind(*root_collection_id);
            qb.push(" AND cps.root_sort_order = ");
            qb.push_bind(*index);
            qb.push(")");
        }
    }
}

/// `SELECT ... FROM posts p WHERE ...` without ordering or limit.
fn push_post_select(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec<Post>, now: DateTime<Utc>) {
    qb.push("SELECT ");
    qb.push(POST_COLUMNS);
    match series_context(spec) {
        Some(root) => {
            qb.push(
                ", (SELECT cp.root_sort_order FROM collection_posts cp \
                 WHERE cp.post_id = p.id AND cp.root_collection_id = ",
            );
            qb.push_bind(root);
            qb.push(" LIMIT 1) AS root_sort_order");
        }
        None => {
            qb.push(", NULL::INTEGER AS root_sort_order");
        }
    }
    qb.push(" FROM posts p WHERE TRUE");

    for condition in &spec.conditions {
        qb.push(" AND ");
        match condition {
            Condition::Where(filter) => push_post_filter(qb, filter, now),
            Condition::NotIn(column, values) => {
                qb.push(format!("NOT (p.{} = ANY(", post_column(*column)));
                qb.push_bind(values.clone());
                qb.push("))");
            }
        }
    }
}

impl PgStore {
    async fn post_preloads(&self, records: &mut [PostRecord], preloads: &[PostPreload]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = records.iter().map(|r| r.post.id).collect();

        for preload in preloads {
            match preload {
                PostPreload::Taxonomies { limit } => {
                    let mut grouped = self
                        .taxonomies_for("post_taxonomies", "post_id", &ids)
                        .await?;
                    group_limit(&mut grouped, Some(*limit));
                    for record in records.iter_mut() {
                        record.taxonomies = grouped.remove(&record.post.id).unwrap_or_default();
                    }
                }
                PostPreload::Authors => {
                    let rows = sqlx::query(
                        "SELECT pa.post_id, u.id, u.username FROM post_authors pa \
                         JOIN users u ON u.id = pa.user_id WHERE pa.post_id = ANY($1) ORDER BY u.username",
                    )
                    .bind(&ids)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;
                    let mut grouped: HashMap<Uuid, Vec<Author>> = HashMap::new();
                    for row in rows {
                        grouped
                            .entry(row.try_get("post_id").map_err(db_err)?)
                            .or_default()
                            .push(Author {
                                user_id: row.try_get("id").map_err(db_err)?,
                                username: row.try_get("username").map_err(db_err)?,
                            });
                    }
                    for record in records.iter_mut() {
                        record.authors = grouped.remove(&record.post.id).unwrap_or_default();
                    }
                }
                PostPreload::Progression { user_id } => {
                    let rows = sqlx::query(
                        "SELECT id, user_id, post_id, is_completed, updated_at FROM progressions \
                         WHERE user_id = $1 AND post_id = ANY($2) ORDER BY updated_at DESC",
                    )
                    .bind(user_id)
                    .bind(&ids)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;
                    let mut grouped: HashMap<Uuid, Vec<Progression>> = HashMap::new();
                    for row in rows {
                        let progression = Progression {
                            id: row.try_get("id").map_err(db_err)?,
                            user_id: row.try_get("user_id").map_err(db_err)?,
                            post_id: row.try_get("post_id").map_err(db_err)?,
                            is_completed: row.try_get("is_completed").map_err(db_err)?,
                            updated_at: row.try_get("updated_at").map_err(db_err)?,
                        };
                        grouped.entry(progression.post_id).or_default().push(progression);
                    }
                    for record in records.iter_mut() {
                        record.progression = grouped.remove(&record.post.id).unwrap_or_default();
                    }
                }
            }
        }
        Ok(())
    }

    /// Linked taxonomies per entity, in `sort_order`.
    async fn taxonomies_for(&self, table: &str, owner: &str, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Taxonomy>>> {
        let sql = taxonomy_sql(table, owner);
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut grouped: HashMap<Uuid, Vec<Taxonomy>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.try_get("owner_id").map_err(db_err)?)
                .or_default()
                .push(Taxonomy {
                    id: row.try_get("id").map_err(db_err)?,
                    name: row.try_get("name").map_err(db_err)?,
                    slug: row.try_get("slug").map_err(db_err)?,
                });
        }
        Ok(grouped)
    }
}

#[async_trait]
impl QueryExecutor<Post> for PgStore {
    async fn fetch(&self, spec: &QuerySpec<Post>) -> Result<Vec<PostRecord>> {
        let mut qb = QueryBuilder::new("");
        push_post_select(&mut qb, spec, self.clock.now());
        push_order(&mut qb, &spec.order, post_column);
        push_limit(&mut qb, spec.limit);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let mut records = rows
            .iter()
            .map(|row| -> Result<PostRecord> {
                let mut record = PostRecord::bare(post_from_row(row)?);
                record.root_sort_order = row.try_get("root_sort_order").map_err(db_err)?;
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;

        self.post_preloads(&mut records, &spec.preloads).await?;
        Ok(records)
    }

    async fn count(&self, spec: &QuerySpec<Post>, column: Option<PostColumn>) -> Result<i64> {
        let mut qb = QueryBuilder::new(match column {
            Some(column) => format!("SELECT COUNT(q.{}) FROM (", post_column(column)),
            None => "SELECT COUNT(*) FROM (".to_string(),
        });
        push_post_select(&mut qb, spec, self.clock.now());
        qb.push(") q");
        qb.build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn sum(&self, spec: &QuerySpec<Post>, column: PostColumn) -> Result<i64> {
        if !matches!(column, PostColumn::VideoSeconds | PostColumn::RootSortOrder) {
            return Err(AppError::Internal(format!("column {column:?} cannot be summed")));
        }
        let mut qb = QueryBuilder::new(format!(
            "SELECT COALESCE(SUM(q.{}), 0)::BIGINT FROM (",
            post_column(column)
        ));
        push_post_select(&mut qb, spec, self.clock.now());
        qb.push(") q");
        qb.build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

// ── Collections ─────────────────────────────────────────────────────────────

fn collection_column(column: CollectionColumn) -> &'static str {
    match column {
        CollectionColumn::Id => "id",
        CollectionColumn::CreatedAt => "created_at",
        CollectionColumn::UpdatedAt => "updated_at",
        CollectionColumn::LatestPublishAt => "latest_publish_at",
    }
}

/// Subselect over the published flattened posts of `c`.
fn push_flattened_aggregate(qb: &mut QueryBuilder<'_, Postgres>, expr: &str, alias: &str, now: DateTime<Utc>) {
    qb.push(format!(
        ", (SELECT {expr} FROM collection_posts fcp JOIN posts fp ON fp.id = fcp.post_id \
         WHERE fcp.root_collection_id = c.id AND "
    ));
    push_published(qb, "fp", now);
    qb.push(format!(") AS {alias}"));
}

fn push_collection_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CollectionFilter, now: DateTime<Utc>) {
    match filter {
        CollectionFilter::Root => {
            qb.push("c.parent_id IS NULL");
        }
        CollectionFilter::Type(kind) => {
            qb.push("c.collection_type = ");
            qb.push_bind(kind.as_str());
        }
        CollectionFilter::State(state) => {
            qb.push("c.state = ");
            qb.push_bind(state.as_str());
        }
        CollectionFilter::HasPublishedPosts => {
            qb.push(
                "EXISTS (SELECT 1 FROM collection_posts hcp JOIN posts hp ON hp.id = hcp.post_id \
                 WHERE hcp.root_collection_id = c.id AND ",
            );
            push_published(qb, "hp", now);
            qb.push(")");
        }
    }
}

fn push_collection_select(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec<Collection>, now: DateTime<Utc>) {
    qb.push(
        "SELECT c.id, c.parent_id, c.collection_type, c.state, c.name, c.slug, c.description, \
         c.asset_id, c.created_at, c.updated_at",
    );
    push_flattened_aggregate(qb, "COUNT(*)", "post_count", now);
    push_flattened_aggregate(qb, "COALESCE(SUM(fp.video_seconds), 0)::BIGINT", "video_seconds_sum", now);
    push_flattened_aggregate(qb, "MAX(fp.publish_at)", "latest_publish_at", now);
    qb.push(" FROM collections c WHERE TRUE");

    for condition in &spec.conditions {
        qb.push(" AND ");
        match condition {
            Condition::Where(filter) => push_collection_filter(qb, filter, now),
            Condition::NotIn(column, values) => {
                qb.push(format!("NOT (c.{} = ANY(", collection_column(*column)));
                qb.push_bind(values.clone());
                qb.push("))");
            }
        }
    }
}

/// Which pivot column links posts to their owning collection.
#[derive(Clone, Copy)]
enum Membership {
    Flattened,
    Direct,
}

struct PivotQuery {
    membership: Membership,
    order: PivotOrder,
    direction: Direction,
    limit: Option<usize>,
    progression_for: Option<Uuid>,
}

impl PgStore {
    /// Published posts in display form, grouped by owning collection.
    async fn pivot_posts(&self, ids: &[Uuid], q: PivotQuery) -> Result<HashMap<Uuid, Vec<PostRecord>>> {
        let now = self.clock.now();
        let owner = match q.membership {
            Membership::Flattened => "cp.root_collection_id",
            Membership::Direct => "cp.collection_id",
        };
        let order = match q.order {
            PivotOrder::SortOrder => "cp.sort_order",
            PivotOrder::RootSortOrder => "cp.root_sort_order",
        };
        let direction = match q.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };

        let mut qb = QueryBuilder::new(format!(
            "SELECT {owner} AS owner_id, cp.root_sort_order AS pivot_root_sort_order, {POST_COLUMNS} \
             FROM collection_posts cp JOIN posts p ON p.id = cp.post_id WHERE {owner} = ANY("
        ));
        qb.push_bind(ids.to_vec());
        qb.push(") AND ");
        push_published(&mut qb, "p", now);
        qb.push(format!(" ORDER BY {order} {direction}"));

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let mut owners = Vec::with_capacity(rows.len());
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            owners.push(row.try_get::<Uuid, _>("owner_id").map_err(db_err)?);
            let mut record = PostRecord::bare(post_from_row(row)?);
            record.root_sort_order = Some(row.try_get("pivot_root_sort_order").map_err(db_err)?);
            records.push(record);
        }

        let mut preloads = vec![
            PostPreload::Taxonomies {
                limit: TAXONOMY_PRELOAD_LIMIT,
            },
            PostPreload::Authors,
        ];
        if let Some(user_id) = q.progression_for {
            preloads.push(PostPreload::Progression { user_id });
        }
        self.post_preloads(&mut records, &preloads).await?;

        let mut grouped: HashMap<Uuid, Vec<PostRecord>> = HashMap::new();
        for (owner, record) in owners.into_iter().zip(records) {
            grouped.entry(owner).or_default().push(record);
        }
        group_limit(&mut grouped, q.limit);
        Ok(grouped)
    }

    async fn children(&self, ids: &[Uuid], progression_for: Option<Uuid>) -> Result<HashMap<Uuid, Vec<CollectionRecord>>> {
        let now = self.clock.now();
        let mut qb = QueryBuilder::new(
            "SELECT c.* FROM collections c WHERE c.state = 'public' AND c.parent_id = ANY(",
        );
        qb.push_bind(ids.to_vec());
        qb.push(
            ") AND EXISTS (SELECT 1 FROM collection_posts dcp JOIN posts dp ON dp.id = dcp.post_id \
             WHERE dcp.collection_id = c.id AND ",
        );
        push_published(&mut qb, "dp", now);
        qb.push(") ORDER BY c.created_at");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let children = rows.iter().map(collection_from_row).collect::<Result<Vec<_>>>()?;
        let child_ids: Vec<Uuid> = children.iter().map(|c| c.id).collect();

        let mut posts = self
            .pivot_posts(
                &child_ids,
                PivotQuery {
                    membership: Membership::Direct,
                    order: PivotOrder::SortOrder,
                    direction: Direction::Asc,
                    limit: None,
                    progression_for,
                },
            )
            .await?;

        let mut grouped: HashMap<Uuid, Vec<CollectionRecord>> = HashMap::new();
        for child in children {
            let Some(parent_id) = child.parent_id else { continue };
            let mut record = CollectionRecord::bare(child);
            record.posts = posts.remove(&record.collection.id).unwrap_or_default();
            grouped.entry(parent_id).or_default().push(record);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl QueryExecutor<Collection> for PgStore {
    async fn fetch(&self, spec: &QuerySpec<Collection>) -> Result<Vec<CollectionRecord>> {
        let mut qb = QueryBuilder::new("");
        push_collection_select(&mut qb, spec, self.clock.now());
        push_order(&mut qb, &spec.order, collection_column);
        push_limit(&mut qb, spec.limit);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = CollectionRecord::bare(collection_from_row(row)?);
            for aggregate in &spec.aggregates {
                match aggregate {
                    CollectionAggregate::PublishedPostCount => {
                        record.post_count = Some(row.try_get("post_count").map_err(db_err)?)
                    }
                    CollectionAggregate::PublishedVideoSeconds => {
                        record.video_seconds_sum = Some(row.try_get("video_seconds_sum").map_err(db_err)?)
                    }
                    CollectionAggregate::LatestPublishAt => {
                        record.latest_publish_at = row.try_get("latest_publish_at").map_err(db_err)?
                    }
                }
            }
            records.push(record);
        }
        if records.is_empty() {
            return Ok(records);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.collection.id).collect();
        for preload in &spec.preloads {
            match preload {
                CollectionPreload::Asset => {
                    let asset_ids: Vec<Uuid> = records.iter().filter_map(|r| r.collection.asset_id).collect();
                    let rows = sqlx::query("SELECT id, filename, alt_text FROM assets WHERE id = ANY($1)")
                        .bind(&asset_ids)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(db_err)?;
                    let mut assets = HashMap::new();
                    for row in rows {
                        let asset = Asset {
                            id: row.try_get("id").map_err(db_err)?,
                            filename: row.try_get("filename").map_err(db_err)?,
                            alt_text: row.try_get("alt_text").map_err(db_err)?,
                        };
                        assets.insert(asset.id, asset);
                    }
                    for record in records.iter_mut() {
                        record.asset = record.collection.asset_id.and_then(|id| assets.get(&id).cloned());
                    }
                }
                CollectionPreload::Taxonomies { limit } => {
                    let mut grouped = self
                        .taxonomies_for("collection_taxonomies", "collection_id", &ids)
                        .await?;
                    group_limit(&mut grouped, Some(*limit));
                    for record in records.iter_mut() {
                        record.taxonomies = grouped.remove(&record.collection.id).unwrap_or_default();
                    }
                }
                CollectionPreload::Posts {
                    order,
                    direction,
                    limit,
                    progression_for,
                } => {
                    let mut flattened = self
                        .pivot_posts(
                            &ids,
                            PivotQuery {
                                membership: Membership::Flattened,
                                order: *order,
                                direction: *direction,
                                limit: *limit,
                                progression_for: *progression_for,
                            },
                        )
                        .await?;
                    let mut direct = self
                        .pivot_posts(
                            &ids,
                            PivotQuery {
                                membership: Membership::Direct,
                                order: *order,
                                direction: *direction,
                                limit: None,
                                progression_for: *progression_for,
                            },
                        )
                        .await?;
                    for record in records.iter_mut() {
                        record.posts_flattened = flattened.remove(&record.collection.id).unwrap_or_default();
                        record.posts = direct.remove(&record.collection.id).unwrap_or_default();
                    }
                }
                CollectionPreload::Children { progression_for } => {
                    let mut children = self.children(&ids, *progression_for).await?;
                    for record in records.iter_mut() {
                        record.children = children.remove(&record.collection.id).unwrap_or_default();
                    }
                }
            }
        }
        Ok(records)
    }

    async fn count(&self, spec: &QuerySpec<Collection>, column: Option<CollectionColumn>) -> Result<i64> {
        let mut qb = QueryBuilder::new(match column {
            Some(column) => format!("SELECT COUNT(q.{}) FROM (", collection_column(column)),
            None => "SELECT COUNT(*) FROM (".to_string(),
        });
        push_collection_select(&mut qb, spec, self.clock.now());
        qb.push(") q");
        qb.build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn sum(&self, _spec: &QuerySpec<Collection>, column: CollectionColumn) -> Result<i64> {
        Err(AppError::Internal(format!("column {column:?} cannot be summed")))
    }
}

#[cfg(test)]
mod tests {
    use domains::{CollectionType, PostType, State};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn post_sql(spec: &QuerySpec<Post>) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_post_select(&mut qb, spec, now());
        push_order(&mut qb, &spec.order, post_column);
        push_limit(&mut qb, spec.limit);
        qb.sql().to_string()
    }

    fn collection_sql(spec: &QuerySpec<Collection>) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_collection_select(&mut qb, spec, now());
        push_order(&mut qb, &spec.order, collection_column);
        push_limit(&mut qb, spec.limit);
        qb.sql().to_string()
    }

    #[test]
    fn series_index_is_an_exact_match() {
        let series = Uuid::now_v7();
        let mut spec = QuerySpec::<Post>::default();
        spec.filter(PostFilter::Published)
            .filter(PostFilter::AtSeriesIndex {
                root_collection_id: series,
                index: 4,
            })
            .order_by(PostColumn::PublishAt, Direction::Desc)
            .limit(1);

        let sql = post_sql(&spec);

        assert!(sql.contains("WHERE cp.post_id = p.id AND cp.root_collection_id = $1 LIMIT 1) AS root_sort_order"));
        assert!(sql.contains("(p.state = 'public' AND p.publish_at IS NOT NULL AND p.publish_at <= $2)"));
        assert!(sql.contains("cps.root_collection_id = $3 AND cps.root_sort_order = $4)"));
        assert!(sql.ends_with(" ORDER BY publish_at DESC NULLS LAST LIMIT $5"), "{sql}");
    }

    #[test]
    fn posts_outside_a_series_carry_no_index() {
        let mut spec = QuerySpec::<Post>::default();
        spec.filter(PostFilter::TypeIn(vec![PostType::Lesson, PostType::Livestream]))
            .exclude(PostColumn::Id, vec![Uuid::now_v7()])
            .order_by(PostColumn::PublishAt, Direction::Desc)
            .order_by(PostColumn::CreatedAt, Direction::Asc);

        let sql = post_sql(&spec);

        assert!(sql.contains(", NULL::INTEGER AS root_sort_order FROM posts p WHERE TRUE"));
        assert!(sql.contains(" AND p.post_type = ANY($1) AND NOT (p.id = ANY($2))"));
        assert!(sql.ends_with(" ORDER BY publish_at DESC NULLS LAST, created_at ASC NULLS FIRST"), "{sql}");
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn public_series_need_a_published_flattened_post() {
        let excluded = Uuid::now_v7();
        let mut spec = QuerySpec::<Collection>::default();
        spec.filter(CollectionFilter::Root)
            .filter(CollectionFilter::Type(CollectionType::Series))
            .filter(CollectionFilter::State(State::Public))
            .filter(CollectionFilter::HasPublishedPosts)
            .exclude(CollectionColumn::Id, vec![excluded])
            .order_by(CollectionColumn::LatestPublishAt, Direction::Desc)
            .limit(4);

        let sql = collection_sql(&spec);

        // the three aggregate subselects bind the clock first
        assert!(sql.contains(
            "(SELECT MAX(fp.publish_at) FROM collection_posts fcp JOIN posts fp ON fp.id = fcp.post_id \
             WHERE fcp.root_collection_id = c.id AND (fp.state = 'public' AND fp.publish_at IS NOT NULL \
             AND fp.publish_at <= $3)) AS latest_publish_at"
        ));
        assert!(sql.contains(
            " WHERE TRUE AND c.parent_id IS NULL AND c.collection_type = $4 AND c.state = $5 AND EXISTS ("
        ));
        assert!(sql.contains("WHERE hcp.root_collection_id = c.id AND (hp.state = 'public'"));
        assert!(sql.contains("hp.publish_at <= $6)) AND NOT (c.id = ANY($7))"));
        assert!(sql.ends_with(" ORDER BY latest_publish_at DESC NULLS LAST LIMIT $8"), "{sql}");
    }

    #[test]
    fn totals_default_to_zero() {
        let sql = collection_sql(&QuerySpec::default());
        assert!(sql.contains("(SELECT COUNT(*) FROM collection_posts fcp"));
        assert!(sql.contains("(SELECT COALESCE(SUM(fp.video_seconds), 0)::BIGINT FROM collection_posts fcp"));
        assert!(sql.ends_with(" FROM collections c WHERE TRUE"), "{sql}");
    }

    #[test]
    fn taxonomy_preload_is_batched_in_link_order() {
        let sql = taxonomy_sql("post_taxonomies", "post_id");
        assert!(sql.starts_with("SELECT l.post_id AS owner_id, t.id, t.name, t.slug FROM post_taxonomies l"));
        assert!(sql.contains("WHERE l.post_id = ANY($1) ORDER BY l.sort_order"));
    }

    #[test]
    fn group_limit_keeps_the_leading_rows() {
        let owner = Uuid::now_v7();
        let mut grouped = HashMap::from([(owner, vec![0, 1, 2, 3, 4])]);
        group_limit(&mut grouped, Some(TAXONOMY_PRELOAD_LIMIT));
        assert_eq!(grouped[&owner], vec![0, 1, 2]);

        group_limit(&mut grouped, None);
        assert_eq!(grouped[&owner].len(), 3);
    }
}
