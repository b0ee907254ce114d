use std::sync::Arc;

use domains::{Clock, Progression, ProgressionRepository, Result, User};
use uuid::Uuid;

pub struct ProgressionService {
    progression: Arc<dyn ProgressionRepository>,
    clock: Arc<dyn Clock>,
}

impl ProgressionService {
    pub fn new(progression: Arc<dyn ProgressionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { progression, clock }
    }

    /// Flips the completed flag, creating the row on first use.
    pub async fn toggle_complete(&self, user: &User, post_id: Uuid) -> Result<Progression> {
        let now = self.clock.now();
        let progression = match self.progression.find(user.id, post_id).await? {
            Some(mut existing) => {
                existing.is_completed = !existing.is_completed;
                existing.updated_at = now;
                existing
            }
            None => Progression {
                id: Uuid::now_v7(),
                user_id: user.id,
                post_id,
                is_completed: true,
                updated_at: now,
            },
        };
        self.progression.save(&progression).await?;
        Ok(progression)
    }
}
