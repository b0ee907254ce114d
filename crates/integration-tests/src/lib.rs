//! Shared fixtures for the cross-crate test suites.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use domains::{
    Clock, Collection, CollectionPost, CollectionType, Post, PostType, Profile, Role, State, User,
};
use services::RequestContext;
use uuid::Uuid;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Monday morning, 2026-03-02 09:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn user(username: &str) -> User {
    User {
        id: Uuid::now_v7(),
        username: username.to_string(),
        email: format!("{username}@learnhub.test"),
        password_hash: String::new(),
        role: Role::User,
        profile: Profile::default(),
        created_at: start(),
    }
}

pub fn browser(ip: &str, agent: &str) -> RequestContext {
    RequestContext {
        ip_address: Some(ip.to_string()),
        user_agent: Some(agent.to_string()),
        ..Default::default()
    }
}

pub fn with_token(ctx: &RequestContext, token: &str) -> RequestContext {
    RequestContext {
        token: Some(token.to_string()),
        ..ctx.clone()
    }
}

/// A post published `age` before [`start`].
pub fn lesson(title: &str, age: Duration) -> Post {
    Post {
        id: Uuid::now_v7(),
        post_type: PostType::Lesson,
        state: State::Public,
        title: title.to_string(),
        slug: title.to_lowercase().replace(' ', "-"),
        description: None,
        body: String::new(),
        publish_at: Some(start() - age),
        video_seconds: 300,
        created_at: start() - age,
        updated_at: start() - age,
    }
}

pub fn series(name: &str) -> Collection {
    Collection {
        id: Uuid::now_v7(),
        parent_id: None,
        collection_type: CollectionType::Series,
        state: State::Public,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        description: None,
        asset_id: None,
        created_at: start() - Duration::days(30),
        updated_at: start() - Duration::days(30),
    }
}

/// Pivot row placing `post` directly in `collection` at `index`.
pub fn placed(collection: &Collection, post: &Post, index: i32) -> CollectionPost {
    CollectionPost {
        collection_id: collection.id,
        post_id: post.id,
        root_collection_id: collection.parent_id.unwrap_or(collection.id),
        sort_order: index,
        root_sort_order: index,
    }
}
