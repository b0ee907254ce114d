use std::sync::Arc;

use domains::{
    AppError, Clock, Result, User, WatchTarget, Watchlist, WatchlistRepository,
};
use uuid::Uuid;

pub struct WatchlistService {
    watchlist: Arc<dyn WatchlistRepository>,
    clock: Arc<dyn Clock>,
}

impl WatchlistService {
    pub fn new(watchlist: Arc<dyn WatchlistRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { watchlist, clock }
    }

    /// Adds the target, or removes it when already watched.
    ///
    /// Returns the entry and whether it was deleted.
    pub async fn toggle(&self, user: &User, target: WatchTarget) -> Result<(Watchlist, bool)> {
        if let Some(existing) = self.watchlist.find(user.id, target).await? {
            self.watchlist.delete(existing.id).await?;
            return Ok((existing, true));
        }

        let entry = Watchlist {
            id: Uuid::now_v7(),
            user_id: user.id,
            target,
            created_at: self.clock.now(),
        };
        self.watchlist.insert(&entry).await?;
        Ok((entry, false))
    }

    pub async fn list(&self, user: &User) -> Result<Vec<Watchlist>> {
        self.watchlist.list(user.id).await
    }

    pub async fn remove(&self, user: &User, id: Uuid) -> Result<Watchlist> {
        let entry = self
            .watchlist
            .find_by_id(id)
            .await?
            .filter(|entry| entry.user_id == user.id)
            .ok_or_else(|| AppError::not_found("Watchlist", id))?;
        self.watchlist.delete(entry.id).await?;
        Ok(entry)
    }
}
