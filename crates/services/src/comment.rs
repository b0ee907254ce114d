//! # Comment orchestration
//!
//! Every write runs inside one transaction from the [`CommentStore`]:
//! sanitization, persistence, notification rows and mention scanning either
//! all commit or all roll back. Notification events go out after commit and
//! are best-effort.

use std::sync::Arc;

use domains::{
    AppError, Clock, Comment, CommentStore, CommentTarget, CommentTransaction, EventEmitter,
    Notification, Result, State, User,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::RequestContext;
use crate::mention::{mentions, new_mentions};
use crate::notification;
use crate::sanitize::sanitize_html;
use crate::utils::truncate;
use crate::validators::CommentInput;

/// How a `destroy` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DestroyOutcome {
    /// The comment was kept as an archived stub because replies remain.
    pub archived: bool,
    /// The comment's archived parent had no replies left and was removed too.
    pub parent_removed: bool,
}

pub struct CommentService {
    store: Arc<dyn CommentStore>,
    events: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
    identity_salt: String,
}

fn require_actor<'a>(actor: Option<&'a User>, action: &str) -> Result<&'a User> {
    actor.ok_or_else(|| AppError::Unauthorized(format!("You must be signed in to {action}.")))
}

fn authorize(actor: &User, comment: &Comment) -> Result<()> {
    if actor.is_admin() || comment.user_id == Some(actor.id) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "You are not allowed to modify this comment.".to_string(),
        ))
    }
}

async fn finish<T>(tx: Box<dyn CommentTransaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

impl CommentService {
    pub fn new(
        store: Arc<dyn CommentStore>,
        events: Arc<dyn EventEmitter>,
        clock: Arc<dyn Clock>,
        identity_salt: impl Into<String>,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            identity_salt: identity_salt.into(),
        }
    }

    pub async fn list(&self, target: CommentTarget) -> Result<Vec<Comment>> {
        self.store.list_for_target(target).await
    }

    pub async fn store(
        &self,
        actor: Option<&User>,
        ctx: &RequestContext,
        input: CommentInput,
    ) -> Result<Comment> {
        let actor = require_actor(actor, "create comments")?;
        let target = input.target()?;

        let mut tx = self.store.begin().await?;
        let result = self.write_new(tx.as_mut(), actor, ctx, target, input).await;
        let (comment, notifications) = finish(tx, result).await?;

        notification::dispatch(self.events.as_ref(), notifications).await;

        info!(
            post_id = ?comment.target.post_id(),
            body = %truncate(&comment.body, 100),
            go = %comment.go_path(),
            "NEW COMMENT"
        );

        Ok(comment)
    }

    async fn write_new(
        &self,
        tx: &mut dyn CommentTransaction,
        actor: &User,
        ctx: &RequestContext,
        target: CommentTarget,
        input: CommentInput,
    ) -> Result<(Comment, Vec<Notification>)> {
        let now = self.clock.now();
        let id = Uuid::now_v7();

        let parent = match input.reply_to {
            Some(parent_id) => Some(
                tx.find_comment(parent_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Comment", parent_id))?,
            ),
            None => None,
        };
        let root_parent_id = input
            .root_parent_id
            .or(parent.map(|p| p.root_parent_id))
            .unwrap_or(id);

        let comment = Comment {
            id,
            target,
            comment_type: target.comment_type(),
            user_id: Some(actor.id),
            root_parent_id,
            reply_to: input.reply_to,
            state: State::Public,
            body: sanitize_html(&input.body),
            identity: ctx.identity_hash(&self.identity_salt),
            created_at: now,
            updated_at: now,
        };
        tx.insert_comment(&comment).await?;

        let mut notifications = if comment.is_reply() {
            notification::on_comment_reply(tx, &comment, actor, now).await?
        } else {
            notification::on_comment_create(tx, &comment, actor, now).await?
        };

        let mentioned = mentions(&comment.body);
        notifications
            .extend(notification::on_comment_mention(tx, &comment, &mentioned, actor, now).await?);

        Ok((comment, notifications))
    }

    /// Replaces the body; only mentions that were not already present notify.
    pub async fn update(&self, actor: Option<&User>, id: Uuid, body: &str) -> Result<Comment> {
        let actor = require_actor(actor, "edit comments")?;
        if body.trim().is_empty() {
            return Err(AppError::invalid("body", "required", "is required"));
        }

        let mut tx = self.store.begin().await?;
        let result = self.write_update(tx.as_mut(), actor, id, body).await;
        let (comment, notifications) = finish(tx, result).await?;

        notification::dispatch(self.events.as_ref(), notifications).await;
        Ok(comment)
    }

    async fn write_update(
        &self,
        tx: &mut dyn CommentTransaction,
        actor: &User,
        id: Uuid,
        body: &str,
    ) -> Result<(Comment, Vec<Notification>)> {
        let mut comment = tx
            .find_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))?;
        authorize(actor, &comment)?;

        let now = self.clock.now();
        let old_body = std::mem::replace(&mut comment.body, sanitize_html(body));
        comment.updated_at = now;

        tx.update_comment(&comment).await?;
        notification::on_update(tx, &comment).await?;

        let added = new_mentions(&old_body, &comment.body);
        let notifications =
            notification::on_comment_mention(tx, &comment, &added, actor, now).await?;

        Ok((comment, notifications))
    }

    /// Toggles the actor's vote; returns whether the comment is now liked.
    pub async fn like_toggle(&self, actor: Option<&User>, id: Uuid) -> Result<bool> {
        let actor = require_actor(actor, "like comments")?;
        if self.store.find(id).await?.is_none() {
            return Err(AppError::not_found("Comment", id));
        }
        self.store.toggle_vote(actor.id, id, self.clock.now()).await
    }

    /// Deletes a comment, archiving it instead while live replies remain.
    ///
    /// An archived parent left without any replies is removed as well. The
    /// cleanup stops there; the grandparent is not re-checked.
    pub async fn destroy(&self, actor: Option<&User>, id: Uuid) -> Result<DestroyOutcome> {
        let actor = require_actor(actor, "delete comments")?;

        let mut tx = self.store.begin().await?;
        let result = self.write_destroy(tx.as_mut(), actor, id).await;
        let outcome = finish(tx, result).await?;

        info!(comment_id = %id, archived = outcome.archived, parent_removed = outcome.parent_removed, "comment destroyed");
        Ok(outcome)
    }

    async fn write_destroy(
        &self,
        tx: &mut dyn CommentTransaction,
        actor: &User,
        id: Uuid,
    ) -> Result<DestroyOutcome> {
        let mut comment = tx
            .find_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))?;
        authorize(actor, &comment)?;

        let parent = match comment.reply_to {
            Some(parent_id) => tx.find_comment(parent_id).await?,
            None => None,
        };
        let live_children = tx.count_children(comment.id, false).await?;

        let archived = live_children > 0;
        if archived {
            comment.archive(self.clock.now());
            tx.update_comment(&comment).await?;
        } else {
            remove(tx, comment.id).await?;
        }

        let mut parent_removed = false;
        if let Some(parent) = parent.filter(Comment::is_archived) {
            if tx.count_children(parent.id, true).await? == 0 {
                remove(tx, parent.id).await?;
                parent_removed = true;
            }
        }

        Ok(DestroyOutcome {
            archived,
            parent_removed,
        })
    }
}

/// Hard delete: votes first, then the row, then its notifications.
async fn remove(tx: &mut dyn CommentTransaction, id: Uuid) -> Result<()> {
    tx.delete_votes(id).await?;
    tx.delete_comment(id).await?;
    notification::on_delete(tx, id).await?;
    Ok(())
}
