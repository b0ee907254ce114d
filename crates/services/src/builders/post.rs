use std::future::IntoFuture;
use std::sync::Arc;

use domains::{
    Direction, Post, PostColumn, PostFilter, PostPreload, PostRecord, PostType, QueryExecutor,
    Result, TAXONOMY_PRELOAD_LIMIT,
};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use super::base::{BaseBuilder, QueryBuilder};

pub struct PostBuilder {
    base: BaseBuilder<Post>,
}

impl PostBuilder {
    pub fn new(executor: Arc<dyn QueryExecutor<Post>>) -> Self {
        Self {
            base: BaseBuilder::new(executor),
        }
    }

    /// Newest first, with the taxonomies and authors a card needs.
    pub fn display(mut self) -> Self {
        self = self.order_published();
        self.base
            .spec_mut()
            .preload(PostPreload::Taxonomies {
                limit: TAXONOMY_PRELOAD_LIMIT,
            })
            .preload(PostPreload::Authors);
        self
    }

    pub fn published(mut self) -> Self {
        self.base.spec_mut().filter(PostFilter::Published);
        self
    }

    pub fn where_lesson(self) -> Self {
        self.where_type([PostType::Lesson, PostType::Livestream])
    }

    pub fn where_blog(self) -> Self {
        self.where_type([PostType::Blog, PostType::News])
    }

    pub fn where_snippet(self) -> Self {
        self.where_type(PostType::Snippet)
    }

    /// Accepts a single type or any collection of types.
    pub fn where_type(mut self, types: impl Into<PostTypes>) -> Self {
        let PostTypes(types) = types.into();
        self.base.spec_mut().filter(PostFilter::TypeIn(types));
        self
    }

    pub fn where_has_taxonomy(mut self, taxonomy_id: Uuid) -> Self {
        self.base
            .spec_mut()
            .filter(PostFilter::HasTaxonomy(taxonomy_id));
        self
    }

    /// Tagged with any of `taxonomy_ids`; without a list, with any taxonomy
    /// that has content of its own.
    pub fn where_has_taxonomies(mut self, taxonomy_ids: Option<Vec<Uuid>>) -> Self {
        let filter = match taxonomy_ids {
            Some(ids) => PostFilter::HasTaxonomyIn(ids),
            None => PostFilter::HasTaxonomyWithContent,
        };
        self.base.spec_mut().filter(filter);
        self
    }

    pub fn order_published(mut self) -> Self {
        self.base
            .spec_mut()
            .order_by(PostColumn::PublishAt, Direction::Desc)
            .order_by(PostColumn::CreatedAt, Direction::Desc);
        self
    }

    /// Flattened posts of a root series or path, in sequence.
    pub fn in_series(mut self, root_collection_id: Uuid) -> Self {
        self.base
            .spec_mut()
            .filter(PostFilter::InSeries(root_collection_id))
            .order_by(PostColumn::RootSortOrder, Direction::Asc);
        self
    }

    /// The post at exactly `index` in the flattened series.
    pub fn at_series_index(mut self, root_collection_id: Uuid, index: i32) -> Self {
        self.base.spec_mut().filter(PostFilter::AtSeriesIndex {
            root_collection_id,
            index,
        });
        self
    }

    pub fn with_progression(mut self, user_id: Uuid) -> Self {
        self.base
            .spec_mut()
            .preload(PostPreload::Progression { user_id });
        self
    }
}

/// One or many post types for [`PostBuilder::where_type`].
pub struct PostTypes(pub Vec<PostType>);

impl From<PostType> for PostTypes {
    fn from(value: PostType) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<PostType>> for PostTypes {
    fn from(value: Vec<PostType>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[PostType; N]> for PostTypes {
    fn from(value: [PostType; N]) -> Self {
        Self(value.to_vec())
    }
}

impl QueryBuilder for PostBuilder {
    type Entity = Post;

    fn base(&self) -> &BaseBuilder<Post> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseBuilder<Post> {
        &mut self.base
    }

    fn into_base(self) -> BaseBuilder<Post> {
        self.base
    }
}

impl IntoFuture for PostBuilder {
    type Output = Result<Vec<PostRecord>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.base.into_future()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::RecordingExecutor;

    fn builder() -> PostBuilder {
        PostBuilder::new(Arc::new(RecordingExecutor::default()))
    }

    #[test]
    fn lessons_include_livestreams() {
        let b = builder().where_lesson();
        assert!(b.spec().has_filter(&PostFilter::TypeIn(vec![
            PostType::Lesson,
            PostType::Livestream
        ])));
    }

    #[test]
    fn single_type_is_accepted() {
        let b = builder().where_type(PostType::News);
        assert!(b.spec().has_filter(&PostFilter::TypeIn(vec![PostType::News])));
    }

    #[test]
    fn taxonomies_without_list_require_content() {
        let b = builder().where_has_taxonomies(None);
        assert!(b.spec().has_filter(&PostFilter::HasTaxonomyWithContent));
    }

    #[test]
    fn display_orders_by_publish_then_created() {
        let b = builder().display();
        let columns: Vec<_> = b.spec().order.iter().map(|o| o.column).collect();
        assert_eq!(columns, vec![PostColumn::PublishAt, PostColumn::CreatedAt]);
    }

    #[test]
    fn empty_exclusions_add_nothing() {
        let b = builder().exclude(Vec::new());
        assert!(b.spec().conditions.is_empty());
    }
}
