use std::sync::Arc;

use domains::{Post, PostRecord, QueryExecutor, Result};
use uuid::Uuid;

use crate::builders::{PostBuilder, QueryBuilder};

pub struct PostService {
    executor: Arc<dyn QueryExecutor<Post>>,
}

impl PostService {
    pub fn new(executor: Arc<dyn QueryExecutor<Post>>) -> Self {
        Self { executor }
    }

    pub fn builder(&self) -> PostBuilder {
        PostBuilder::new(self.executor.clone())
    }

    pub async fn latest_lessons(&self, limit: usize) -> Result<Vec<PostRecord>> {
        self.builder().published().display().where_lesson().limit(limit).await
    }

    pub async fn latest_blogs(&self, limit: usize) -> Result<Vec<PostRecord>> {
        self.builder().published().display().where_blog().limit(limit).await
    }

    pub async fn latest_snippets(&self, limit: usize) -> Result<Vec<PostRecord>> {
        self.builder().published().display().where_snippet().limit(limit).await
    }

    /// The lesson right after `index`. A gap in the sequence yields `None`.
    pub async fn next_lesson(&self, series_id: Uuid, index: i32) -> Result<Option<PostRecord>> {
        match index.checked_add(1) {
            Some(next) => self.at(series_id, next).await,
            None => Ok(None),
        }
    }

    pub async fn previous_lesson(&self, series_id: Uuid, index: i32) -> Result<Option<PostRecord>> {
        match index.checked_sub(1) {
            Some(previous) => self.at(series_id, previous).await,
            None => Ok(None),
        }
    }

    async fn at(&self, series_id: Uuid, index: i32) -> Result<Option<PostRecord>> {
        self.builder()
            .published()
            .at_series_index(series_id, index)
            .first()
            .await
    }
}
