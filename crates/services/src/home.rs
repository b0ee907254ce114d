//! The landing page feed.

use domains::{CollectionRecord, PostRecord, Result};
use serde::Serialize;

use crate::collection::{CollectionService, LastUpdated};
use crate::post::PostService;

#[derive(Debug, Serialize)]
pub struct HomeFeed {
    pub series: Vec<CollectionRecord>,
    pub lessons: Vec<PostRecord>,
    pub blogs: Vec<PostRecord>,
    pub snippets: Vec<PostRecord>,
}

pub async fn home_feed(collections: &CollectionService, posts: &PostService) -> Result<HomeFeed> {
    Ok(HomeFeed {
        series: collections
            .last_updated(
                None,
                LastUpdated {
                    limit: 8,
                    ..LastUpdated::default()
                },
            )
            .await?,
        lessons: posts.latest_lessons(12).await?,
        blogs: posts.latest_blogs(4).await?,
        snippets: posts.latest_snippets(4).await?,
    })
}
