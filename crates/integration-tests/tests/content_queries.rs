use std::sync::Arc;

use chrono::Duration;
use domains::{
    Collection, CollectionPost, Post, PostColumn, PostType, State, Taxonomy, TaxonomyLink,
};
use integration_tests::{lesson, placed, series, start, FixedClock};
use services::{CollectionService, LastUpdated, PostService, QueryBuilder};
use storage_adapters::MemoryStore;
use uuid::Uuid;

struct Catalog {
    store: Arc<MemoryStore>,
    posts: PostService,
    collections: CollectionService,
}

fn catalog() -> Catalog {
    let store = Arc::new(MemoryStore::new(FixedClock::at(start())));
    Catalog {
        posts: PostService::new(store.clone()),
        collections: CollectionService::new(store.clone()),
        store,
    }
}

impl Catalog {
    async fn add(&self, collection: Collection, posts: Vec<(Post, i32)>) -> Collection {
        let pivots: Vec<CollectionPost> = posts.iter().map(|(p, i)| placed(&collection, p, *i)).collect();
        let out = collection.clone();
        self.store
            .seed(|t| {
                t.collections.push(collection);
                t.posts.extend(posts.into_iter().map(|(p, _)| p));
                t.collection_posts.extend(pivots);
            })
            .await;
        out
    }
}

fn draft(title: &str) -> Post {
    Post {
        state: State::Draft,
        ..lesson(title, Duration::days(1))
    }
}

#[tokio::test]
async fn neighbour_lookup_does_not_bridge_gaps() {
    let c = catalog();
    let lessons: Vec<Post> = (1..=4).map(|n| lesson(&format!("Part {n}"), Duration::days(n))).collect();
    let indexed = lessons.iter().cloned().zip([1, 2, 3, 5]).collect();
    let s = c.add(series("Rust basics"), indexed).await;

    let after_two = c.posts.next_lesson(s.id, 2).await.unwrap().unwrap();
    assert_eq!(after_two.post.id, lessons[2].id);
    assert_eq!(after_two.root_sort_order, Some(3));

    assert!(c.posts.next_lesson(s.id, 3).await.unwrap().is_none());
    assert!(c.posts.previous_lesson(s.id, 5).await.unwrap().is_none());
    let before_two = c.posts.previous_lesson(s.id, 2).await.unwrap().unwrap();
    assert_eq!(before_two.post.id, lessons[0].id);
}

#[tokio::test]
async fn neighbour_lookup_skips_unpublished_lessons() {
    let c = catalog();
    let first = lesson("One", Duration::days(2));
    let hidden = draft("Two");
    let s = c.add(series("Drafts inside"), vec![(first, 1), (hidden, 2)]).await;

    assert!(c.posts.next_lesson(s.id, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn public_collection_without_published_posts_is_excluded() {
    let c = catalog();
    let visible = c.add(series("Visible"), vec![(lesson("Live", Duration::days(1)), 1)]).await;
    c.add(series("Only drafts"), vec![(draft("Soon"), 1)]).await;
    c.add(series("Scheduled"), vec![(lesson("Tomorrow", Duration::days(-1)), 1)]).await;
    c.add(series("Empty"), Vec::new()).await;
    let hidden = Collection {
        state: State::Draft,
        ..series("Hidden")
    };
    c.add(hidden, vec![(lesson("Live too", Duration::days(1)), 1)]).await;

    let listed = c.collections.last_updated(None, LastUpdated::default()).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].collection.id, visible.id);
    assert_eq!(c.collections.series_count().await.unwrap(), 1);
}

#[tokio::test]
async fn latest_updated_follows_the_newest_post_not_the_collection() {
    let c = catalog();
    let touched_recently = Collection {
        updated_at: start(),
        ..series("Edited yesterday")
    };
    let stale = c
        .add(touched_recently, vec![(lesson("Old lesson", Duration::days(20)), 1)])
        .await;
    let fresh = c
        .add(series("Fresh content"), vec![(lesson("New lesson", Duration::hours(3)), 1)])
        .await;

    let listed = c.collections.last_updated(None, LastUpdated::default()).await.unwrap();

    let order: Vec<Uuid> = listed.iter().map(|r| r.collection.id).collect();
    assert_eq!(order, vec![fresh.id, stale.id]);
    assert_eq!(listed[0].latest_publish_at, Some(start() - Duration::hours(3)));
}

#[tokio::test]
async fn listing_carries_aggregates_and_limited_posts() {
    let c = catalog();
    let posts = (1..=6)
        .map(|n| (lesson(&format!("Step {n}"), Duration::days(10 - n as i64)), n))
        .chain([(draft("Unfinished"), 7)])
        .collect();
    c.add(series("Long series"), posts).await;

    let args = LastUpdated {
        post_limit: 2,
        ..LastUpdated::default()
    };
    let listed = c.collections.last_updated(None, args).await.unwrap();
    let record = &listed[0];

    assert_eq!(record.post_count, Some(6));
    assert_eq!(record.video_seconds_sum, Some(6 * 300));
    assert_eq!(record.total_minutes(), 30);
    let indexes: Vec<Option<i32>> = record.posts_flattened.iter().map(|p| p.root_sort_order).collect();
    assert_eq!(indexes, vec![Some(6), Some(5)]);
}

#[tokio::test]
async fn excluded_collections_are_left_out() {
    let c = catalog();
    let a = c.add(series("A"), vec![(lesson("a", Duration::days(1)), 1)]).await;
    let b = c.add(series("B"), vec![(lesson("b", Duration::days(2)), 1)]).await;

    let args = LastUpdated {
        exclude_ids: vec![a.id],
        with_posts: false,
        ..LastUpdated::default()
    };
    let listed = c.collections.last_updated(None, args).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].collection.id, b.id);
    assert!(listed[0].posts_flattened.is_empty());
}

#[tokio::test]
async fn taxonomy_preload_keeps_the_first_three_by_sort_order() {
    let c = catalog();
    let post = lesson("Tagged", Duration::days(1));
    let tags: Vec<Taxonomy> = ["async", "traits", "macros", "unsafe", "ffi"]
        .iter()
        .map(|name| Taxonomy {
            id: Uuid::now_v7(),
            name: name.to_string(),
            slug: name.to_string(),
        })
        .collect();
    let links: Vec<TaxonomyLink> = tags
        .iter()
        .zip([4, 2, 0, 3, 1])
        .map(|(tag, sort_order)| TaxonomyLink {
            taxonomy_id: tag.id,
            entity_id: post.id,
            sort_order,
        })
        .collect();
    c.store
        .seed(|t| {
            t.posts.push(post);
            t.taxonomies.extend(tags);
            t.post_taxonomies.extend(links);
        })
        .await;

    let lessons = c.posts.latest_lessons(12).await.unwrap();

    let names: Vec<&str> = lessons[0].taxonomies.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["macros", "ffi", "traits"]);
}

#[tokio::test]
async fn feeds_split_posts_by_type() {
    let c = catalog();
    let stream = Post {
        post_type: PostType::Livestream,
        ..lesson("Live coding", Duration::hours(1))
    };
    let blog = Post {
        post_type: PostType::Blog,
        ..lesson("Release notes", Duration::hours(2))
    };
    let snippet = Post {
        post_type: PostType::Snippet,
        ..lesson("One-liner", Duration::hours(3))
    };
    let older = lesson("Older lesson", Duration::days(3));
    c.store
        .seed(|t| t.posts.extend([stream.clone(), blog, snippet, older.clone(), draft("Draft")]))
        .await;

    let lessons = c.posts.latest_lessons(12).await.unwrap();
    let ids: Vec<Uuid> = lessons.iter().map(|r| r.post.id).collect();
    assert_eq!(ids, vec![stream.id, older.id]);
    assert_eq!(c.posts.latest_blogs(4).await.unwrap().len(), 1);
    assert_eq!(c.posts.latest_snippets(4).await.unwrap().len(), 1);
    assert_eq!(c.posts.latest_lessons(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn builder_composes_conditionally_and_resolves_terminals() {
    let c = catalog();
    let s = c
        .add(
            series("Counted"),
            vec![
                (lesson("x", Duration::days(1)), 1),
                (lesson("y", Duration::days(2)), 2),
                (draft("z"), 3),
            ],
        )
        .await;

    let in_series = |only_blogs: bool| {
        c.posts
            .builder()
            .published()
            .in_series(s.id)
            .when(only_blogs, |b| b.where_blog())
    };

    assert_eq!(in_series(false).count(None).await.unwrap(), 2);
    assert_eq!(in_series(true).count(None).await.unwrap(), 0);
    assert_eq!(in_series(false).sum(PostColumn::VideoSeconds).await.unwrap(), 600);
    assert_eq!(in_series(false).sum(PostColumn::RootSortOrder).await.unwrap(), 3);

    let ordered: Vec<Option<i32>> = in_series(false)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.root_sort_order)
        .collect();
    assert_eq!(ordered, vec![Some(1), Some(2)]);
}

#[tokio::test]
async fn home_feed_gathers_every_section() {
    let c = catalog();
    c.add(series("Home"), vec![(lesson("Featured", Duration::days(1)), 1)]).await;

    let feed = services::home_feed(&c.collections, &c.posts).await.unwrap();

    assert_eq!(feed.series.len(), 1);
    assert_eq!(feed.lessons.len(), 1);
    assert!(feed.blogs.is_empty());
    assert!(feed.snippets.is_empty());
}

#[tokio::test]
async fn neighbour_lookup_stops_at_the_index_bounds() {
    let c = catalog();
    let last = lesson("Last", Duration::days(1));
    let first = lesson("First", Duration::days(2));
    let s = c.add(series("Edges"), vec![(last, i32::MAX), (first, i32::MIN)]).await;

    assert!(c.posts.next_lesson(s.id, i32::MAX).await.unwrap().is_none());
    assert!(c.posts.previous_lesson(s.id, i32::MIN).await.unwrap().is_none());
}
