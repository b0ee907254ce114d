//! Named events handed to the [`crate::ports::EventEmitter`] after a write commits.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Notification, SessionLog};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum DomainEvent {
    /// `email:new_device`
    #[serde(rename = "email:new_device")]
    NewDeviceLogin {
        user_id: Uuid,
        email: String,
        session: SessionLog,
    },
    /// `notification:created`
    #[serde(rename = "notification:created")]
    NotificationCreated(Notification),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::NewDeviceLogin { .. } => "email:new_device",
            DomainEvent::NotificationCreated(_) => "notification:created",
        }
    }
}
