use std::future::IntoFuture;
use std::sync::Arc;

use domains::{
    Collection, CollectionAggregate, CollectionColumn, CollectionFilter, CollectionPreload,
    CollectionRecord, CollectionType, Direction, PivotOrder, QueryExecutor, Result, State,
    TAXONOMY_PRELOAD_LIMIT,
};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use super::base::{BaseBuilder, QueryBuilder};

/// Series and path queries.
///
/// A collection only counts as public when it is in the public state *and*
/// at least one of its flattened posts is published.
pub struct CollectionBuilder {
    base: BaseBuilder<Collection>,
    /// When set, post preloads carry this user's progression history.
    user_id: Option<Uuid>,
}

impl CollectionBuilder {
    pub fn new(executor: Arc<dyn QueryExecutor<Collection>>, user_id: Option<Uuid>) -> Self {
        Self {
            base: BaseBuilder::new(executor),
            user_id,
        }
    }

    /// Shape used by listing pages.
    pub fn display(mut self) -> Self {
        self.base.spec_mut().preload(CollectionPreload::Asset);
        self.public()
            .with_taxonomies()
            .with_post_count()
            .with_total_minutes()
    }

    pub fn root(mut self) -> Self {
        self.base.spec_mut().filter(CollectionFilter::Root);
        self
    }

    pub fn series(mut self) -> Self {
        self.base
            .spec_mut()
            .filter(CollectionFilter::Type(CollectionType::Series));
        self
    }

    pub fn path(mut self) -> Self {
        self.base
            .spec_mut()
            .filter(CollectionFilter::Type(CollectionType::Path));
        self
    }

    pub fn public(mut self) -> Self {
        self = self.where_has_posts();
        self.base
            .spec_mut()
            .filter(CollectionFilter::State(State::Public));
        self
    }

    pub fn where_has_posts(mut self) -> Self {
        self.base.spec_mut().filter(CollectionFilter::HasPublishedPosts);
        self
    }

    pub fn with_taxonomies(mut self) -> Self {
        self.base.spec_mut().preload(CollectionPreload::Taxonomies {
            limit: TAXONOMY_PRELOAD_LIMIT,
        });
        self
    }

    pub fn with_posts(mut self, order: PivotOrder, direction: Direction, limit: Option<usize>) -> Self {
        let progression_for = self.user_id;
        self.base.spec_mut().preload(CollectionPreload::Posts {
            order,
            direction,
            limit,
            progression_for,
        });
        self
    }

    pub fn with_children(mut self) -> Self {
        let progression_for = self.user_id;
        self.base
            .spec_mut()
            .preload(CollectionPreload::Children { progression_for });
        self
    }

    pub fn with_post_count(mut self) -> Self {
        self.base
            .spec_mut()
            .aggregate(CollectionAggregate::PublishedPostCount);
        self
    }

    /// Sum of published `video_seconds`; see [`CollectionRecord::total_minutes`].
    pub fn with_total_minutes(mut self) -> Self {
        self.base
            .spec_mut()
            .aggregate(CollectionAggregate::PublishedVideoSeconds);
        self
    }

    /// Orders by the newest publish time among the collection's posts, not
    /// by the collection's own `updated_at`.
    pub fn order_latest_updated(mut self) -> Self {
        self.base
            .spec_mut()
            .aggregate(CollectionAggregate::LatestPublishAt)
            .order_by(CollectionColumn::LatestPublishAt, Direction::Desc);
        self
    }
}

impl QueryBuilder for CollectionBuilder {
    type Entity = Collection;

    fn base(&self) -> &BaseBuilder<Collection> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseBuilder<Collection> {
        &mut self.base
    }

    fn into_base(self) -> BaseBuilder<Collection> {
        self.base
    }
}

impl IntoFuture for CollectionBuilder {
    type Output = Result<Vec<CollectionRecord>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.base.into_future()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::RecordingExecutor;

    fn builder(user: Option<Uuid>) -> CollectionBuilder {
        CollectionBuilder::new(Arc::new(RecordingExecutor::default()), user)
    }

    #[test]
    fn public_requires_state_and_published_posts() {
        let b = builder(None).public();
        assert!(b.spec().has_filter(&CollectionFilter::State(State::Public)));
        assert!(b.spec().has_filter(&CollectionFilter::HasPublishedPosts));
    }

    #[test]
    fn display_caps_taxonomies_at_three() {
        let b = builder(None).display();
        assert!(b
            .spec()
            .preloads
            .contains(&CollectionPreload::Taxonomies { limit: 3 }));
        assert!(b.spec().preloads.contains(&CollectionPreload::Asset));
        assert_eq!(b.spec().aggregates.len(), 2);
    }

    #[test]
    fn post_preload_carries_the_user() {
        let user = Uuid::now_v7();
        let b = builder(Some(user)).with_posts(PivotOrder::RootSortOrder, Direction::Desc, Some(5));
        assert_eq!(
            b.spec().preloads,
            vec![CollectionPreload::Posts {
                order: PivotOrder::RootSortOrder,
                direction: Direction::Desc,
                limit: Some(5),
                progression_for: Some(user),
            }]
        );
    }

    #[test]
    fn when_skips_on_false() {
        let b = builder(None)
            .when(false, |b| b.series())
            .when(true, |b| b.root())
            .when_some(None::<usize>, |b, n| b.limit(n));
        assert_eq!(b.spec().conditions.len(), 1);
        assert!(b.spec().has_filter(&CollectionFilter::Root));
        assert!(b.spec().limit.is_none());
    }

    #[test]
    fn latest_updated_orders_by_derived_publish_time() {
        let b = builder(None).order_latest_updated();
        assert_eq!(b.spec().order[0].column, CollectionColumn::LatestPublishAt);
        assert_eq!(b.spec().order[0].direction, Direction::Desc);
    }

    #[tokio::test]
    async fn nothing_runs_until_awaited() {
        let executor = Arc::new(RecordingExecutor::default());
        let b = CollectionBuilder::new(executor.clone(), None).root().limit(4);
        assert_eq!(executor.calls(), 0);

        let rows = b.await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(executor.calls(), 1);
    }
}
