//! Threaded comments, discussions and the notifications they fan out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::State;

/// Body written over an archived comment.
pub const DELETED_BODY: &str = "[deleted]";

/// What a comment is attached to. The comment type is derived from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentTarget {
    Post(Uuid),
    Discussion(Uuid),
    LessonRequest(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentType {
    Post,
    Discussion,
    LessonRequest,
}

impl CommentTarget {
    pub fn comment_type(&self) -> CommentType {
        match self {
            CommentTarget::Post(_) => CommentType::Post,
            CommentTarget::Discussion(_) => CommentType::Discussion,
            CommentTarget::LessonRequest(_) => CommentType::LessonRequest,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            CommentTarget::Post(id) | CommentTarget::Discussion(id) | CommentTarget::LessonRequest(id) => *id,
        }
    }

    pub fn post_id(&self) -> Option<Uuid> {
        match self {
            CommentTarget::Post(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub target: CommentTarget,
    pub comment_type: CommentType,
    /// `None` once the comment has been archived.
    pub user_id: Option<Uuid>,
    /// Top-level ancestor of the thread; a top-level comment is its own root.
    pub root_parent_id: Uuid,
    /// The comment this one answers, if any.
    pub reply_to: Option<Uuid>,
    pub state: State,
    pub body: String,
    /// Hashed request identity of the author.
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_archived(&self) -> bool {
        self.state == State::Archived
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Redacts the body and detaches the author, keeping the row as a thread anchor.
    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.body = DELETED_BODY.to_string();
        self.user_id = None;
        self.state = State::Archived;
        self.updated_at = now;
    }

    /// Link used in notifications and logs.
    pub fn go_path(&self) -> String {
        match self.target {
            CommentTarget::Post(id) => format!("/go/post/{}/comment/{}", id, self.id),
            CommentTarget::Discussion(id) => format!("/go/discussion/{}/comment/{}", id, self.id),
            CommentTarget::LessonRequest(id) => format!("/go/request/{}/comment/{}", id, self.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub taxonomy_id: Option<Uuid>,
    pub state: State,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Comment,
    Reply,
    Mention,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Comment => "comment",
            NotificationType::Reply => "reply",
            NotificationType::Mention => "mention",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "comment" => Some(NotificationType::Comment),
            "reply" => Some(NotificationType::Reply),
            "mention" => Some(NotificationType::Mention),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub initiator_user_id: Option<Uuid>,
    pub notification_type: NotificationType,
    /// Source table (e.g. `comments`) and row the notification was raised for.
    pub table: String,
    pub table_id: Uuid,
    pub title: String,
    pub body: String,
    pub href: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
