use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Comment, CommentStore, CommentTarget, CommentTransaction, Notification, Result, State, User,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{CommentTables, CommentVote, MemoryStore, Tables};

/// A write staged by a transaction, replayed against the live tables on commit.
#[derive(Debug, Clone)]
enum Write {
    InsertComment(Comment),
    UpdateComment(Comment),
    DeleteComment(Uuid),
    DeleteVotes(Uuid),
    InsertNotification(Notification),
    UpdateNotificationBodies {
        table: String,
        table_id: Uuid,
        body: String,
    },
    DeleteNotifications {
        table: String,
        table_id: Uuid,
    },
}

impl Write {
    /// Applies the write and returns the number of rows it touched.
    fn apply(&self, tables: &mut CommentTables) -> u64 {
        match self {
            Write::InsertComment(comment) => {
                tables.comments.push(comment.clone());
                1
            }
            Write::UpdateComment(comment) => match tables.comments.iter_mut().find(|c| c.id == comment.id) {
                Some(row) => {
                    *row = comment.clone();
                    1
                }
                None => 0,
            },
            Write::DeleteComment(id) => {
                let before = tables.comments.len();
                tables.comments.retain(|c| c.id != *id);
                for child in tables.comments.iter_mut().filter(|c| c.reply_to == Some(*id)) {
                    child.reply_to = None;
                }
                (before - tables.comments.len()) as u64
            }
            Write::DeleteVotes(comment_id) => {
                let before = tables.votes.len();
                tables.votes.retain(|v| v.comment_id != *comment_id);
                (before - tables.votes.len()) as u64
            }
            Write::InsertNotification(notification) => {
                tables.notifications.push(notification.clone());
                1
            }
            Write::UpdateNotificationBodies { table, table_id, body } => {
                let mut changed = 0;
                for n in tables
                    .notifications
                    .iter_mut()
                    .filter(|n| &n.table == table && n.table_id == *table_id)
                {
                    n.body = body.clone();
                    changed += 1;
                }
                changed
            }
            Write::DeleteNotifications { table, table_id } => {
                let before = tables.notifications.len();
                tables
                    .notifications
                    .retain(|n| !(&n.table == table && n.table_id == *table_id));
                (before - tables.notifications.len()) as u64
            }
        }
    }
}

/// Reads its own writes from a private copy; commit replays the staged
/// writes onto the live tables so rows touched by others survive.
pub struct MemoryCommentTransaction {
    shared: Arc<RwLock<Tables>>,
    working: CommentTables,
    staged: Vec<Write>,
}

impl MemoryCommentTransaction {
    fn stage(&mut self, write: Write) -> u64 {
        let touched = write.apply(&mut self.working);
        self.staged.push(write);
        touched
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CommentTransaction>> {
        let working = self.tables.read().await.comment_tables.clone();
        Ok(Box::new(MemoryCommentTransaction {
            shared: self.tables.clone(),
            working,
            staged: Vec::new(),
        }))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Comment>> {
        let t = self.tables.read().await;
        Ok(t.comment_tables.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn list_for_target(&self, target: CommentTarget) -> Result<Vec<Comment>> {
        let t = self.tables.read().await;
        let mut comments: Vec<Comment> = t
            .comment_tables
            .comments
            .iter()
            .filter(|c| c.target == target)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    async fn toggle_vote(&self, user_id: Uuid, comment_id: Uuid, _now: DateTime<Utc>) -> Result<bool> {
        let mut t = self.tables.write().await;
        let votes = &mut t.comment_tables.votes;
        let vote = CommentVote { user_id, comment_id };
        if votes.contains(&vote) {
            votes.retain(|v| v != &vote);
            Ok(false)
        } else {
            votes.push(vote);
            Ok(true)
        }
    }
}

#[async_trait]
impl CommentTransaction for MemoryCommentTransaction {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self.working.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        self.stage(Write::InsertComment(comment.clone()));
        Ok(())
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        self.stage(Write::UpdateComment(comment.clone()));
        Ok(())
    }

    async fn delete_comment(&mut self, id: Uuid) -> Result<()> {
        self.stage(Write::DeleteComment(id));
        Ok(())
    }

    async fn count_children(&mut self, id: Uuid, include_archived: bool) -> Result<i64> {
        Ok(self
            .working
            .comments
            .iter()
            .filter(|c| c.reply_to == Some(id) && (include_archived || c.state != State::Archived))
            .count() as i64)
    }

    async fn delete_votes(&mut self, comment_id: Uuid) -> Result<u64> {
        Ok(self.stage(Write::DeleteVotes(comment_id)))
    }

    async fn post_author_ids(&mut self, post_id: Uuid) -> Result<Vec<Uuid>> {
        let t = self.shared.read().await;
        Ok(t.post_authors
            .iter()
            .filter(|a| a.post_id == post_id)
            .map(|a| a.user_id)
            .collect())
    }

    async fn discussion_author_id(&mut self, discussion_id: Uuid) -> Result<Option<Uuid>> {
        let t = self.shared.read().await;
        Ok(t.discussions
            .iter()
            .find(|d| d.id == discussion_id)
            .map(|d| d.user_id))
    }

    async fn find_users_by_usernames(&mut self, usernames: &[String]) -> Result<Vec<User>> {
        let t = self.shared.read().await;
        Ok(t.users
            .iter()
            .filter(|u| usernames.iter().any(|name| name.eq_ignore_ascii_case(&u.username)))
            .cloned()
            .collect())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> Result<()> {
        self.stage(Write::InsertNotification(notification.clone()));
        Ok(())
    }

    async fn update_notification_bodies(&mut self, table: &str, table_id: Uuid, body: &str) -> Result<u64> {
        Ok(self.stage(Write::UpdateNotificationBodies {
            table: table.to_string(),
            table_id,
            body: body.to_string(),
        }))
    }

    async fn delete_notifications(&mut self, table: &str, table_id: Uuid) -> Result<u64> {
        Ok(self.stage(Write::DeleteNotifications {
            table: table.to_string(),
            table_id,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut t = self.shared.write().await;
        for write in &self.staged {
            write.apply(&mut t.comment_tables);
        }
        debug!(writes = self.staged.len(), "comment transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(discarded = self.staged.len(), "comment transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(target: CommentTarget) -> Comment {
        let id = Uuid::now_v7();
        let now = Utc::now();
        Comment {
            id,
            target,
            comment_type: target.comment_type(),
            user_id: Some(Uuid::now_v7()),
            root_parent_id: id,
            reply_to: None,
            state: State::Public,
            body: "hi".into(),
            identity: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::default();
        let c = comment(CommentTarget::Post(Uuid::now_v7()));

        let mut tx = store.begin().await.unwrap();
        tx.insert_comment(&c).await.unwrap();
        assert!(store.find(c.id).await.unwrap().is_none());
        drop(tx);
        assert!(store.find(c.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_comment(&c).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find(c.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn votes_toggle() {
        let store = MemoryStore::default();
        let (user, comment) = (Uuid::now_v7(), Uuid::now_v7());
        assert!(store.toggle_vote(user, comment, Utc::now()).await.unwrap());
        assert!(!store.toggle_vote(user, comment, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_transactions_keep_each_others_rows() {
        let store = MemoryStore::default();
        let post = CommentTarget::Post(Uuid::now_v7());
        let (a, b) = (comment(post), comment(post));

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_comment(&a).await.unwrap();
        second.insert_comment(&b).await.unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        assert!(CommentStore::find(&store, a.id).await.unwrap().is_some());
        assert!(CommentStore::find(&store, b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn votes_cast_during_a_transaction_survive_its_commit() {
        let store = MemoryStore::default();
        let c = comment(CommentTarget::Post(Uuid::now_v7()));

        let mut tx = store.begin().await.unwrap();
        store.toggle_vote(Uuid::now_v7(), Uuid::now_v7(), Utc::now()).await.unwrap();
        tx.insert_comment(&c).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().await.comment_tables.votes.len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_comment_detaches_its_replies() {
        let store = MemoryStore::default();
        let post = CommentTarget::Post(Uuid::now_v7());
        let parent = comment(post);
        let reply = Comment {
            reply_to: Some(parent.id),
            root_parent_id: parent.id,
            ..comment(post)
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_comment(&parent).await.unwrap();
        tx.insert_comment(&reply).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete_comment(parent.id).await.unwrap();
        assert_eq!(tx.find_comment(reply.id).await.unwrap().unwrap().reply_to, None);
        tx.commit().await.unwrap();

        let stored = CommentStore::find(&store, reply.id).await.unwrap().unwrap();
        assert_eq!(stored.reply_to, None);
    }
}
