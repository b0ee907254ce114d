use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AppError, Comment, CommentStore, CommentTarget, CommentTransaction, DomainEvent,
    MockEventEmitter, Notification, NotificationType, Result, State, User, DELETED_BODY,
};
use integration_tests::{browser, start, user, FixedClock};
use services::validators::CommentInput;
use services::{CommentService, RequestContext};
use storage_adapters::memory::PostAuthor;
use storage_adapters::{LoggingEventEmitter, MemoryStore};
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    comments: CommentService,
    post_id: Uuid,
    author: User,
    alice: User,
    bob: User,
}

async fn harness_with(events: Arc<dyn domains::EventEmitter>) -> Harness {
    let clock = FixedClock::at(start());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let (author, alice, bob) = (user("mentor"), user("alice"), user("bob"));
    let post_id = Uuid::now_v7();
    store
        .seed(|t| {
            t.users.extend([author.clone(), alice.clone(), bob.clone()]);
            t.post_authors.push(PostAuthor {
                post_id,
                user_id: author.id,
            });
        })
        .await;
    let comments = CommentService::new(store.clone(), events, clock, "salt");
    Harness {
        store,
        comments,
        post_id,
        author,
        alice,
        bob,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(LoggingEventEmitter)).await
}

fn ctx() -> RequestContext {
    browser("10.0.0.1", "firefox")
}

fn on_post(post_id: Uuid, body: &str) -> CommentInput {
    CommentInput {
        post_id: Some(post_id),
        discussion_id: None,
        lesson_request_id: None,
        root_parent_id: None,
        reply_to: None,
        body: body.to_string(),
    }
}

fn reply(post_id: Uuid, parent: &Comment, body: &str) -> CommentInput {
    CommentInput {
        reply_to: Some(parent.id),
        ..on_post(post_id, body)
    }
}

impl Harness {
    async fn post(&self, actor: &User, input: CommentInput) -> Comment {
        self.comments.store(Some(actor), &ctx(), input).await.unwrap()
    }

    async fn notifications(&self) -> Vec<Notification> {
        self.store.snapshot().await.comment_tables.notifications
    }

    async fn comment(&self, id: Uuid) -> Option<Comment> {
        CommentStore::find(self.store.as_ref(), id).await.unwrap()
    }
}

#[tokio::test]
async fn new_comment_is_sanitized_and_its_own_root() {
    let h = harness().await;
    let body = "<p>Nice <strong>lesson</strong> <em>thanks</em><script>alert(1)</script></p>";

    let comment = h.post(&h.alice, on_post(h.post_id, body)).await;

    assert_eq!(comment.body, "<p>Nice <strong>lesson</strong> <em>thanks</em></p>");
    assert_eq!(comment.root_parent_id, comment.id);
    assert_eq!(comment.target, CommentTarget::Post(h.post_id));
    assert_eq!(comment.identity, ctx().identity_hash("salt"));
    assert_eq!(h.comments.list(CommentTarget::Post(h.post_id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn anonymous_actor_cannot_comment() {
    let h = harness().await;

    let err = h
        .comments
        .store(None, &ctx(), on_post(h.post_id, "hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(_)));
    assert!(h.store.snapshot().await.comment_tables.comments.is_empty());
}

#[tokio::test]
async fn top_level_comment_notifies_the_post_authors() {
    let mut events = MockEventEmitter::new();
    events
        .expect_emit()
        .withf(|e| matches!(e, DomainEvent::NotificationCreated(n) if n.notification_type == NotificationType::Comment))
        .times(1)
        .returning(|_| Ok(()));
    let h = harness_with(Arc::new(events)).await;

    let comment = h.post(&h.alice, on_post(h.post_id, "<p>question</p>")).await;

    let notifications = h.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, h.author.id);
    assert_eq!(notifications[0].initiator_user_id, Some(h.alice.id));
    assert_eq!(notifications[0].table_id, comment.id);
    assert_eq!(notifications[0].body, "question");
}

#[tokio::test]
async fn reply_notifies_only_the_parent_author() {
    let h = harness().await;
    let parent = h.post(&h.bob, on_post(h.post_id, "first")).await;

    let answer = h.post(&h.alice, reply(h.post_id, &parent, "second")).await;

    assert_eq!(answer.root_parent_id, parent.id);
    let replies: Vec<Notification> = h
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.table_id == answer.id)
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].notification_type, NotificationType::Reply);
    assert_eq!(replies[0].user_id, h.bob.id);
}

#[tokio::test]
async fn own_content_raises_no_notification() {
    let h = harness().await;
    let parent = h.post(&h.author, on_post(h.post_id, "pinned")).await;
    h.post(&h.author, reply(h.post_id, &parent, "and more")).await;

    assert!(h.notifications().await.is_empty());
}

#[tokio::test]
async fn mentions_notify_known_users_except_the_actor() {
    let h = harness().await;
    let input = CommentInput {
        post_id: None,
        lesson_request_id: Some(Uuid::now_v7()),
        ..on_post(h.post_id, "cc @bob @nobody_here @alice")
    };

    let comment = h.post(&h.alice, input).await;

    let mentions: Vec<Notification> = h
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.notification_type == NotificationType::Mention)
        .collect();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].user_id, h.bob.id);
    assert_eq!(mentions[0].href, comment.go_path());
}

#[tokio::test]
async fn edit_notifies_only_newly_mentioned_users() {
    let h = harness().await;
    let carol = user("carol");
    h.store.seed(|t| t.users.push(carol.clone())).await;
    let comment = h.post(&h.alice, on_post(h.post_id, "ping @bob")).await;

    let edited = h
        .comments
        .update(Some(&h.alice), comment.id, "ping @bob and @carol")
        .await
        .unwrap();

    assert_eq!(edited.body, "ping @bob and @carol");
    let mentions: Vec<Notification> = h
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.notification_type == NotificationType::Mention)
        .collect();
    assert_eq!(mentions.len(), 2);
    assert!(mentions.iter().any(|n| n.user_id == carol.id));
    assert!(mentions.iter().all(|n| n.body == "ping @bob and @carol"));
}

#[tokio::test]
async fn only_the_owner_may_edit_or_delete() {
    let h = harness().await;
    let comment = h.post(&h.bob, on_post(h.post_id, "mine")).await;

    let edit = h.comments.update(Some(&h.alice), comment.id, "yours").await;
    let delete = h.comments.destroy(Some(&h.alice), comment.id).await;

    assert!(matches!(edit, Err(AppError::Unauthorized(_))));
    assert!(matches!(delete, Err(AppError::Unauthorized(_))));
    assert_eq!(h.comment(comment.id).await.unwrap().body, "mine");
}

#[tokio::test]
async fn likes_toggle() {
    let h = harness().await;
    let comment = h.post(&h.bob, on_post(h.post_id, "like me")).await;

    assert!(h.comments.like_toggle(Some(&h.alice), comment.id).await.unwrap());
    assert!(!h.comments.like_toggle(Some(&h.alice), comment.id).await.unwrap());
    let missing = h.comments.like_toggle(Some(&h.alice), Uuid::now_v7()).await;
    assert!(matches!(missing, Err(AppError::NotFound(..))));
}

#[tokio::test]
async fn comment_with_live_replies_is_archived_not_deleted() {
    let h = harness().await;
    let parent = h.post(&h.bob, on_post(h.post_id, "parent")).await;
    h.post(&h.alice, reply(h.post_id, &parent, "child")).await;

    let outcome = h.comments.destroy(Some(&h.bob), parent.id).await.unwrap();

    assert!(outcome.archived);
    let stub = h.comment(parent.id).await.unwrap();
    assert_eq!(stub.state, State::Archived);
    assert_eq!(stub.body, DELETED_BODY);
    assert!(stub.user_id.is_none());
}

#[tokio::test]
async fn leaf_delete_removes_votes_and_notifications() {
    let h = harness().await;
    let comment = h.post(&h.alice, on_post(h.post_id, "bye @bob")).await;
    h.comments.like_toggle(Some(&h.bob), comment.id).await.unwrap();

    let outcome = h.comments.destroy(Some(&h.alice), comment.id).await.unwrap();

    assert!(!outcome.archived);
    let tables = h.store.snapshot().await.comment_tables;
    assert!(tables.comments.is_empty());
    assert!(tables.votes.is_empty());
    assert!(tables.notifications.is_empty());
}

#[tokio::test]
async fn archived_parent_goes_with_its_last_reply() {
    let h = harness().await;
    let parent = h.post(&h.bob, on_post(h.post_id, "parent")).await;
    let child = h.post(&h.alice, reply(h.post_id, &parent, "child")).await;
    h.comments.destroy(Some(&h.bob), parent.id).await.unwrap();

    let outcome = h.comments.destroy(Some(&h.alice), child.id).await.unwrap();

    assert!(outcome.parent_removed);
    assert!(h.comment(parent.id).await.is_none());
    assert!(h.comment(child.id).await.is_none());
}

#[tokio::test]
async fn archived_parent_with_other_replies_stays() {
    let h = harness().await;
    let parent = h.post(&h.bob, on_post(h.post_id, "parent")).await;
    let first = h.post(&h.alice, reply(h.post_id, &parent, "one")).await;
    h.post(&h.alice, reply(h.post_id, &parent, "two")).await;
    h.comments.destroy(Some(&h.bob), parent.id).await.unwrap();

    let outcome = h.comments.destroy(Some(&h.alice), first.id).await.unwrap();

    assert!(!outcome.parent_removed);
    assert!(h.comment(parent.id).await.unwrap().is_archived());
}

#[tokio::test]
async fn cleanup_stops_at_the_parent() {
    let h = harness().await;
    let root = h.post(&h.bob, on_post(h.post_id, "root")).await;
    let middle = h.post(&h.alice, reply(h.post_id, &root, "middle")).await;
    let leaf = h.post(&h.bob, reply(h.post_id, &middle, "leaf")).await;
    h.comments.destroy(Some(&h.bob), root.id).await.unwrap();
    h.comments.destroy(Some(&h.alice), middle.id).await.unwrap();

    let outcome = h.comments.destroy(Some(&h.bob), leaf.id).await.unwrap();

    assert!(outcome.parent_removed);
    assert!(h.comment(middle.id).await.is_none());
    // grandparent is archived and childless now, but is not revisited
    let root = h.comment(root.id).await.unwrap();
    assert!(root.is_archived());
}

/// Delegates to the memory store but refuses to write notifications.
struct BrokenNotifications(Arc<MemoryStore>);

struct BrokenTransaction(Box<dyn CommentTransaction>);

#[async_trait]
impl CommentStore for BrokenNotifications {
    async fn begin(&self) -> Result<Box<dyn CommentTransaction>> {
        Ok(Box::new(BrokenTransaction(self.0.begin().await?)))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Comment>> {
        CommentStore::find(self.0.as_ref(), id).await
    }

    async fn list_for_target(&self, target: CommentTarget) -> Result<Vec<Comment>> {
        self.0.list_for_target(target).await
    }

    async fn toggle_vote(&self, user_id: Uuid, comment_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.0.toggle_vote(user_id, comment_id, now).await
    }
}

#[async_trait]
impl CommentTransaction for BrokenTransaction {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>> {
        self.0.find_comment(id).await
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        self.0.insert_comment(comment).await
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        self.0.update_comment(comment).await
    }

    async fn delete_comment(&mut self, id: Uuid) -> Result<()> {
        self.0.delete_comment(id).await
    }

    async fn count_children(&mut self, id: Uuid, include_archived: bool) -> Result<i64> {
        self.0.count_children(id, include_archived).await
    }

    async fn delete_votes(&mut self, comment_id: Uuid) -> Result<u64> {
        self.0.delete_votes(comment_id).await
    }

    async fn post_author_ids(&mut self, post_id: Uuid) -> Result<Vec<Uuid>> {
        self.0.post_author_ids(post_id).await
    }

    async fn discussion_author_id(&mut self, discussion_id: Uuid) -> Result<Option<Uuid>> {
        self.0.discussion_author_id(discussion_id).await
    }

    async fn find_users_by_usernames(&mut self, usernames: &[String]) -> Result<Vec<User>> {
        self.0.find_users_by_usernames(usernames).await
    }

    async fn insert_notification(&mut self, _notification: &Notification) -> Result<()> {
        Err(AppError::Internal("notifications table is locked".into()))
    }

    async fn update_notification_bodies(&mut self, table: &str, table_id: Uuid, body: &str) -> Result<u64> {
        self.0.update_notification_bodies(table, table_id, body).await
    }

    async fn delete_notifications(&mut self, table: &str, table_id: Uuid) -> Result<u64> {
        self.0.delete_notifications(table, table_id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.0.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.0.rollback().await
    }
}

#[tokio::test]
async fn failed_notification_rolls_back_the_comment() {
    let h = harness().await;
    let mut events = MockEventEmitter::new();
    events.expect_emit().never();
    let broken = CommentService::new(
        Arc::new(BrokenNotifications(h.store.clone())),
        Arc::new(events),
        FixedClock::at(start()),
        "salt",
    );

    let err = broken
        .store(Some(&h.alice), &ctx(), on_post(h.post_id, "lost"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    let tables = h.store.snapshot().await.comment_tables;
    assert!(tables.comments.is_empty());
    assert!(tables.notifications.is_empty());
}

#[tokio::test]
async fn dispatch_failure_after_commit_keeps_the_comment() {
    let mut events = MockEventEmitter::new();
    events
        .expect_emit()
        .returning(|_| Err(AppError::Upstream("push service down".into())));
    let h = harness_with(Arc::new(events)).await;

    let comment = h
        .comments
        .store(Some(&h.alice), &ctx(), on_post(h.post_id, "still here"))
        .await
        .unwrap();

    assert!(h.comment(comment.id).await.is_some());
    assert_eq!(h.notifications().await.len(), 1);
}
