use std::sync::Arc;

use domains::{Collection, CollectionRecord, Direction, PivotOrder, QueryExecutor, Result};
use uuid::Uuid;

use crate::builders::{CollectionBuilder, QueryBuilder};

pub struct CollectionService {
    executor: Arc<dyn QueryExecutor<Collection>>,
}

/// Arguments of [`CollectionService::last_updated`].
#[derive(Debug, Clone)]
pub struct LastUpdated {
    pub limit: usize,
    pub with_posts: bool,
    pub exclude_ids: Vec<Uuid>,
    pub post_limit: usize,
}

impl Default for LastUpdated {
    fn default() -> Self {
        Self {
            limit: 4,
            with_posts: true,
            exclude_ids: Vec::new(),
            post_limit: 5,
        }
    }
}

impl CollectionService {
    pub fn new(executor: Arc<dyn QueryExecutor<Collection>>) -> Self {
        Self { executor }
    }

    pub fn builder(&self, user_id: Option<Uuid>) -> CollectionBuilder {
        CollectionBuilder::new(self.executor.clone(), user_id)
    }

    /// Number of public root series.
    pub async fn series_count(&self) -> Result<i64> {
        self.builder(None).series().public().root().count(None).await
    }

    /// Root collections whose posts were published most recently.
    pub async fn last_updated(
        &self,
        user_id: Option<Uuid>,
        args: LastUpdated,
    ) -> Result<Vec<CollectionRecord>> {
        let LastUpdated {
            limit,
            with_posts,
            exclude_ids,
            post_limit,
        } = args;

        self.builder(user_id)
            .when(with_posts, |b| {
                b.with_posts(PivotOrder::RootSortOrder, Direction::Desc, Some(post_limit))
            })
            .exclude(exclude_ids)
            .root()
            .display()
            .order_latest_updated()
            .limit(limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{CollectionAggregate, CollectionColumn, CollectionFilter, CollectionPreload};

    #[test]
    fn last_updated_defaults() {
        let args = LastUpdated::default();
        assert_eq!((args.limit, args.with_posts, args.post_limit), (4, true, 5));
        assert!(args.exclude_ids.is_empty());
    }

    #[test]
    fn last_updated_shape() {
        let service = CollectionService::new(Arc::new(crate::builders::testing::RecordingExecutor::default()));
        let excluded = Uuid::now_v7();
        let b = service
            .builder(None)
            .when(true, |b| b.with_posts(PivotOrder::RootSortOrder, Direction::Desc, Some(5)))
            .exclude(vec![excluded])
            .root()
            .display()
            .order_latest_updated();

        let spec = b.spec();
        assert!(spec.has_filter(&CollectionFilter::Root));
        assert!(spec.aggregates.contains(&CollectionAggregate::LatestPublishAt));
        assert_eq!(spec.order[0].column, CollectionColumn::LatestPublishAt);
        assert!(matches!(
            spec.preloads[0],
            CollectionPreload::Posts { limit: Some(5), .. }
        ));
    }
}
