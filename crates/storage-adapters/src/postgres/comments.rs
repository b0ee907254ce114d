use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Comment, CommentStore, CommentTarget, CommentTransaction, Notification, Result, User,
};
use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{comment_from_row, db_err, target_kind, user_from_row, PgStore};

const COMMENT_COLUMNS: &str = "id, target_kind, target_id, user_id, root_parent_id, reply_to, state, \
     body, identity, created_at, updated_at";

/// A comment write scope backed by a database transaction.
///
/// Dropping it without calling `commit` rolls the transaction back.
pub struct PgCommentTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CommentStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn CommentTransaction>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgCommentTransaction { tx }))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(comment_from_row)
            .transpose()
    }

    async fn list_for_target(&self, target: CommentTarget) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE target_kind = $1 AND target_id = $2 ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(target_kind(&target))
            .bind(target.id())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn toggle_vote(&self, user_id: Uuid, comment_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM comment_votes WHERE user_id = $1 AND comment_id = $2")
            .bind(user_id)
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if removed.rows_affected() > 0 {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO comment_votes (user_id, comment_id, created_at) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(comment_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(true)
    }
}

#[async_trait]
impl CommentTransaction for PgCommentTransaction {
    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 FOR UPDATE");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(comment_from_row)
            .transpose()
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<()> {
        let sql = format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        sqlx::query(&sql)
            .bind(comment.id)
            .bind(target_kind(&comment.target))
            .bind(comment.target.id())
            .bind(comment.user_id)
            .bind(comment.root_parent_id)
            .bind(comment.reply_to)
            .bind(comment.state.as_str())
            .bind(&comment.body)
            .bind(&comment.identity)
            .bind(comment.created_at)
            .bind(comment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_comment(&mut self, comment: &Comment) -> Result<()> {
        sqlx::query(
            "UPDATE comments SET user_id = $2, state = $3, body = $4, identity = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(comment.id)
        .bind(comment.user_id)
        .bind(comment.state.as_str())
        .bind(&comment.body)
        .bind(&comment.identity)
        .bind(comment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_comment(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn count_children(&mut self, id: Uuid, include_archived: bool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE reply_to = $1 AND ($2 OR state <> 'archived')")
            .bind(id)
            .bind(include_archived)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn delete_votes(&mut self, comment_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comment_votes WHERE comment_id = $1")
            .bind(comment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn post_author_ids(&mut self, post_id: Uuid) -> Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM post_authors WHERE post_id = $1")
            .bind(post_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn discussion_author_id(&mut self, discussion_id: Uuid) -> Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM discussions WHERE id = $1")
            .bind(discussion_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn find_users_by_usernames(&mut self, usernames: &[String]) -> Result<Vec<User>> {
        let lowered: Vec<String> = usernames.iter().map(|u| u.to_lowercase()).collect();
        let rows = sqlx::query(
            "SELECT id, username, email, password_hash, role, email_on_new_device_login, created_at \
             FROM users WHERE lower(username) = ANY($1)",
        )
        .bind(&lowered)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_notification(&mut self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, initiator_user_id, notification_type, table_name, \
             table_id, title, body, href, read_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.initiator_user_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.table)
        .bind(notification.table_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.href)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_notification_bodies(&mut self, table: &str, table_id: Uuid, body: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET body = $3 WHERE table_name = $1 AND table_id = $2")
            .bind(table)
            .bind(table_id)
            .bind(body)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_notifications(&mut self, table: &str, table_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE table_name = $1 AND table_id = $2")
            .bind(table)
            .bind(table_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { tx } = *self;
        tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let Self { tx } = *self;
        tx.rollback().await.map_err(db_err)?;
        debug!("comment transaction rolled back");
        Ok(())
    }
}
