//! learnhub/crates/domains/src/lib.rs
//!
//! The central domain types and port definitions for learnhub.

pub mod error;
pub mod events;
pub mod models;
pub mod ports;
pub mod query;

// Re-exporting for easier access in other crates
pub use error::*;
pub use events::*;
pub use models::*;
pub use ports::*;
pub use query::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn comment(reply_to: Option<Uuid>) -> Comment {
        let id = Uuid::now_v7();
        let target = CommentTarget::Post(Uuid::now_v7());
        Comment {
            id,
            target,
            comment_type: target.comment_type(),
            user_id: Some(Uuid::now_v7()),
            root_parent_id: id,
            reply_to,
            state: State::Public,
            body: "<p>Hello Rust!</p>".to_string(),
            identity: "abc12345".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn archive_redacts_and_detaches() {
        let mut c = comment(None);
        c.archive(Utc::now());
        assert!(c.is_archived());
        assert_eq!(c.body, DELETED_BODY);
        assert!(c.user_id.is_none());
    }

    #[test]
    fn comment_type_follows_target() {
        let t = CommentTarget::Discussion(Uuid::now_v7());
        assert_eq!(t.comment_type(), CommentType::Discussion);
        assert!(t.post_id().is_none());
        assert!(comment(Some(Uuid::now_v7())).is_reply());
    }
}
