use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AppError, AttemptPurpose, AuthAttempt, AuthAttemptRepository, NewSession, NewUser,
    Progression, ProgressionRepository, Result, SessionEnd, SessionLog, SessionRepository, User,
    UserRepository, WatchTarget, Watchlist, WatchlistRepository,
};
use uuid::Uuid;

use super::MemoryStore;

fn latest_login(sessions: impl Iterator<Item = SessionLog>) -> Option<SessionLog> {
    sessions.max_by(|a, b| a.login_at.cmp(&b.login_at).then(a.id.cmp(&b.id)))
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_latest_by_token(&self, user_id: Uuid, token: &str) -> Result<Option<SessionLog>> {
        let t = self.tables.read().await;
        Ok(latest_login(
            t.sessions
                .iter()
                .filter(|s| s.user_id == user_id && s.login_successful && s.token.as_deref() == Some(token))
                .cloned(),
        ))
    }

    async fn find_open_by_token(&self, token: &str) -> Result<Option<SessionLog>> {
        let t = self.tables.read().await;
        Ok(latest_login(
            t.sessions
                .iter()
                .filter(|s| s.login_successful && s.logout_at.is_none() && s.token.as_deref() == Some(token))
                .cloned(),
        ))
    }

    async fn is_known(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        token: Option<&str>,
    ) -> Result<bool> {
        let t = self.tables.read().await;
        let device = ip_address.zip(user_agent);
        Ok(t.sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.login_successful)
            .any(|s| {
                let by_device = device.is_some_and(|(ip, agent)| {
                    s.ip_address.as_deref() == Some(ip) && s.user_agent.as_deref() == Some(agent)
                });
                let by_token = token.is_some_and(|tok| s.token.as_deref() == Some(tok));
                // Nothing to match on: any successful session counts.
                by_device || by_token || (device.is_none() && token.is_none())
            }))
    }

    async fn create(&self, session: NewSession) -> Result<SessionLog> {
        let log = SessionLog {
            id: Uuid::now_v7(),
            user_id: session.user_id,
            token: session.token,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            city: session.location.city,
            country: session.location.country,
            country_code: session.location.country_code,
            is_remember_session: session.is_remember_session,
            login_successful: session.login_successful,
            login_at: session.login_at,
            last_touched_at: session.last_touched_at,
            logout_at: session.logout_at,
            ended_by: session.ended_by,
            is_current_session: false,
        };
        self.tables.write().await.sessions.push(log.clone());
        Ok(log)
    }

    async fn save(&self, session: &SessionLog) -> Result<()> {
        let mut t = self.tables.write().await;
        let row = t
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or_else(|| AppError::not_found("SessionLog", session.id))?;
        *row = SessionLog {
            is_current_session: false,
            ..session.clone()
        };
        Ok(())
    }

    async fn expire_idle(
        &self,
        user_id: Uuid,
        idle_cutoff: DateTime<Utc>,
        remember_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for s in t.sessions.iter_mut().filter(|s| s.user_id == user_id && s.logout_at.is_none()) {
            let cutoff = if s.is_remember_session { remember_cutoff } else { idle_cutoff };
            if s.last_touched_at.is_some_and(|touched| touched <= cutoff) {
                s.logout_at = Some(now);
                s.ended_by = Some(SessionEnd::Expired);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn force_sign_out(&self, user_id: Uuid, session_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for s in t
            .sessions
            .iter_mut()
            .filter(|s| s.id == session_id && s.user_id == user_id && s.login_successful && s.logout_at.is_none())
        {
            s.logout_at = Some(now);
            s.ended_by = Some(SessionEnd::Forced);
            changed += 1;
        }
        Ok(changed)
    }

    async fn force_sign_out_all_except(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for s in t.sessions.iter_mut().filter(|s| {
            s.user_id == user_id
                && s.login_successful
                && s.logout_at.is_none()
                && (keep_token.is_none() || s.token.as_deref() != keep_token)
        }) {
            s.logout_at = Some(now);
            s.ended_by = Some(SessionEnd::Forced);
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionLog>> {
        let t = self.tables.read().await;
        let mut sessions: Vec<SessionLog> = t
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.login_successful && s.is_active())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_touched_at.cmp(&a.last_touched_at));
        Ok(sessions)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(uid) || u.email.eq_ignore_ascii_case(uid))
            .cloned())
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.users.iter().any(|u| u.username.eq_ignore_ascii_case(username)))
    }

    async fn email_taken(&self, email: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.username.eq_ignore_ascii_case(&user.username)) {
            return Err(AppError::Conflict(format!("username {} is taken", user.username)));
        }
        let user = User {
            id: Uuid::now_v7(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            profile: user.profile,
            created_at: self.clock.now(),
        };
        t.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl AuthAttemptRepository for MemoryStore {
    async fn count_since(&self, uid: &str, purpose: AttemptPurpose, since: DateTime<Utc>) -> Result<i64> {
        let t = self.tables.read().await;
        Ok(t.attempts
            .iter()
            .filter(|a| {
                a.uid.eq_ignore_ascii_case(uid)
                    && a.purpose == purpose
                    && a.deleted_at.is_none()
                    && a.created_at >= since
            })
            .count() as i64)
    }

    async fn record(&self, uid: &str, purpose: AttemptPurpose, now: DateTime<Utc>) -> Result<()> {
        self.tables.write().await.attempts.push(AuthAttempt {
            id: Uuid::now_v7(),
            uid: uid.to_string(),
            purpose,
            deleted_at: None,
            created_at: now,
        });
        Ok(())
    }

    async fn clear(&self, uid: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut cleared = 0;
        for a in t
            .attempts
            .iter_mut()
            .filter(|a| a.uid.eq_ignore_ascii_case(uid) && a.deleted_at.is_none())
        {
            a.deleted_at = Some(now);
            cleared += 1;
        }
        Ok(cleared)
    }
}

#[async_trait]
impl WatchlistRepository for MemoryStore {
    async fn find(&self, user_id: Uuid, target: WatchTarget) -> Result<Option<Watchlist>> {
        let t = self.tables.read().await;
        Ok(t.watchlists
            .iter()
            .find(|w| w.user_id == user_id && w.target == target)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Watchlist>> {
        let t = self.tables.read().await;
        Ok(t.watchlists.iter().find(|w| w.id == id).cloned())
    }

    async fn insert(&self, entry: &Watchlist) -> Result<()> {
        self.tables.write().await.watchlists.push(entry.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.tables.write().await.watchlists.retain(|w| w.id != id);
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Watchlist>> {
        let t = self.tables.read().await;
        let mut entries: Vec<Watchlist> = t
            .watchlists
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

#[async_trait]
impl ProgressionRepository for MemoryStore {
    async fn find(&self, user_id: Uuid, post_id: Uuid) -> Result<Option<Progression>> {
        let t = self.tables.read().await;
        Ok(t.progressions
            .iter()
            .find(|p| p.user_id == user_id && p.post_id == post_id)
            .cloned())
    }

    async fn save(&self, progression: &Progression) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.progressions.iter_mut().find(|p| p.id == progression.id) {
            Some(row) => *row = progression.clone(),
            None => t.progressions.push(progression.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::Location;

    fn new_session(user_id: Uuid, token: &str, touched: DateTime<Utc>, remember: bool) -> NewSession {
        NewSession {
            user_id,
            token: Some(token.to_string()),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("agent".into()),
            location: Location::default(),
            is_remember_session: remember,
            login_successful: true,
            login_at: Some(touched),
            last_touched_at: Some(touched),
            logout_at: None,
            ended_by: None,
        }
    }

    #[tokio::test]
    async fn sweep_uses_the_matching_cutoff() {
        let store = MemoryStore::default();
        let user = Uuid::now_v7();
        let now = Utc::now();
        let old = now - chrono::Duration::hours(3);
        SessionRepository::create(&store, new_session(user, "idle", old, false)).await.unwrap();
        SessionRepository::create(&store, new_session(user, "kept", old, true)).await.unwrap();

        let changed = store
            .expire_idle(user, now - chrono::Duration::hours(2), now - chrono::Duration::days(365), now)
            .await
            .unwrap();

        assert_eq!(changed, 1);
        let active = store.list_active(user).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn force_all_keeps_the_current_token() {
        let store = MemoryStore::default();
        let user = Uuid::now_v7();
        let now = Utc::now();
        for token in ["a", "b", "c"] {
            SessionRepository::create(&store, new_session(user, token, now, false)).await.unwrap();
        }

        let changed = store.force_sign_out_all_except(user, Some("b"), now).await.unwrap();

        assert_eq!(changed, 2);
        let forced = store.find_latest_by_token(user, "a").await.unwrap().unwrap();
        assert!(forced.force_logout());
    }
}
