//! Notification rows raised by comment activity.
//!
//! Rows are written through the caller's transaction; the returned
//! notifications are dispatched as events only after that transaction commits.

use chrono::{DateTime, Utc};
use domains::{
    Comment, CommentTarget, CommentTransaction, DomainEvent, EventEmitter, Notification,
    NotificationType, Result, User,
};
use tracing::error;
use uuid::Uuid;

use crate::utils::{strip_tags, truncate};

pub const COMMENTS_TABLE: &str = "comments";

const PREVIEW_LENGTH: usize = 200;

fn build(
    recipient: Uuid,
    initiator: &User,
    kind: NotificationType,
    title: String,
    comment: &Comment,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::now_v7(),
        user_id: recipient,
        initiator_user_id: Some(initiator.id),
        notification_type: kind,
        table: COMMENTS_TABLE.to_string(),
        table_id: comment.id,
        title,
        body: truncate(&strip_tags(&comment.body), PREVIEW_LENGTH),
        href: comment.go_path(),
        read_at: None,
        created_at: now,
    }
}

async fn insert_all(tx: &mut dyn CommentTransaction, notifications: &[Notification]) -> Result<()> {
    for notification in notifications {
        tx.insert_notification(notification).await?;
    }
    Ok(())
}

/// New top-level comment: notify the authors of what was commented on.
pub async fn on_comment_create(
    tx: &mut dyn CommentTransaction,
    comment: &Comment,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>> {
    let recipients = match comment.target {
        CommentTarget::Post(post_id) => tx.post_author_ids(post_id).await?,
        CommentTarget::Discussion(discussion_id) => {
            tx.discussion_author_id(discussion_id).await?.into_iter().collect()
        }
        CommentTarget::LessonRequest(_) => Vec::new(),
    };

    let title = format!("{} commented on your content", actor.username);
    let notifications: Vec<Notification> = recipients
        .into_iter()
        .filter(|id| *id != actor.id)
        .map(|id| build(id, actor, NotificationType::Comment, title.clone(), comment, now))
        .collect();

    insert_all(tx, &notifications).await?;
    Ok(notifications)
}

/// Reply: notify the author of the comment being answered.
pub async fn on_comment_reply(
    tx: &mut dyn CommentTransaction,
    comment: &Comment,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>> {
    let Some(parent_id) = comment.reply_to else {
        return Ok(Vec::new());
    };
    let recipient = tx.find_comment(parent_id).await?.and_then(|p| p.user_id);

    let notifications: Vec<Notification> = recipient
        .into_iter()
        .filter(|id| *id != actor.id)
        .map(|id| {
            let title = format!("{} replied to your comment", actor.username);
            build(id, actor, NotificationType::Reply, title, comment, now)
        })
        .collect();

    insert_all(tx, &notifications).await?;
    Ok(notifications)
}

/// Notify each mentioned user, skipping the actor and unknown usernames.
pub async fn on_comment_mention(
    tx: &mut dyn CommentTransaction,
    comment: &Comment,
    usernames: &[String],
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }

    let title = format!("{} mentioned you in a comment", actor.username);
    let notifications: Vec<Notification> = tx
        .find_users_by_usernames(usernames)
        .await?
        .into_iter()
        .filter(|user| user.id != actor.id)
        .map(|user| build(user.id, actor, NotificationType::Mention, title.clone(), comment, now))
        .collect();

    insert_all(tx, &notifications).await?;
    Ok(notifications)
}

/// Keeps notification previews in step with an edited body.
pub async fn on_update(tx: &mut dyn CommentTransaction, comment: &Comment) -> Result<u64> {
    let body = truncate(&strip_tags(&comment.body), PREVIEW_LENGTH);
    tx.update_notification_bodies(COMMENTS_TABLE, comment.id, &body)
        .await
}

pub async fn on_delete(tx: &mut dyn CommentTransaction, comment_id: Uuid) -> Result<u64> {
    tx.delete_notifications(COMMENTS_TABLE, comment_id).await
}

/// Post-commit dispatch. Failures are logged and never propagated.
pub async fn dispatch(events: &dyn EventEmitter, notifications: Vec<Notification>) {
    for notification in notifications {
        let id = notification.id;
        if let Err(err) = events.emit(DomainEvent::NotificationCreated(notification)).await {
            error!(notification_id = %id, error = %err, "notification dispatch failed");
        }
    }
}
