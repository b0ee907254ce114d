use async_trait::async_trait;
use domains::{AppError, DomainEvent, EventEmitter, Result};
use tokio::sync::broadcast;
use tracing::info;

/// Writes every event to the log. Stands in for a mailer or push channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventEmitter;

#[async_trait]
impl EventEmitter for LoggingEventEmitter {
    async fn emit(&self, event: DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(&event).map_err(|e| AppError::Internal(e.to_string()))?;
        info!(event = event.name(), %payload, "event emitted");
        Ok(())
    }
}

/// Fans events out to in-process subscribers (e.g. a live notification feed).
#[derive(Debug, Clone)]
pub struct BroadcastEventEmitter {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventEmitter for BroadcastEventEmitter {
    async fn emit(&self, event: DomainEvent) -> Result<()> {
        let name = event.name();
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| AppError::Upstream(format!("no subscribers for {name}")))
    }
}
