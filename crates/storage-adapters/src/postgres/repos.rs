use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AppError, AttemptPurpose, AuthAttemptRepository, NewSession, NewUser, Progression,
    ProgressionRepository, Result, SessionEnd, SessionLog, SessionRepository, User, UserRepository,
    WatchTarget, Watchlist, WatchlistRepository,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{bad_value, db_err, session_from_row, user_from_row, PgStore};

const SESSION_COLUMNS: &str = "id, user_id, token, ip_address, user_agent, city, country, country_code, \
     is_remember_session, login_successful, login_at, last_touched_at, logout_at, ended_by";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, email_on_new_device_login, created_at";

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_latest_by_token(&self, user_id: Uuid, token: &str) -> Result<Option<SessionLog>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM session_logs \
             WHERE user_id = $1 AND token = $2 AND login_successful \
             ORDER BY login_at DESC NULLS LAST, id DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(session_from_row)
            .transpose()
    }

    async fn find_open_by_token(&self, token: &str) -> Result<Option<SessionLog>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM session_logs \
             WHERE token = $1 AND login_successful AND logout_at IS NULL \
             ORDER BY login_at DESC NULLS LAST, id DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(session_from_row)
            .transpose()
    }

    async fn is_known(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        token: Option<&str>,
    ) -> Result<bool> {
        let (ip, agent) = match ip_address.zip(user_agent) {
            Some((ip, agent)) => (Some(ip), Some(agent)),
            None => (None, None),
        };
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM session_logs WHERE user_id = $1 AND login_successful AND (\
               ($2::TEXT IS NOT NULL AND ip_address = $2 AND user_agent = $3) \
               OR ($4::TEXT IS NOT NULL AND token = $4) \
               OR ($2::TEXT IS NULL AND $4::TEXT IS NULL)))",
        )
        .bind(user_id)
        .bind(ip)
        .bind(agent)
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn create(&self, session: NewSession) -> Result<SessionLog> {
        let sql = format!(
            "INSERT INTO session_logs ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(session.user_id)
            .bind(session.token)
            .bind(session.ip_address)
            .bind(session.user_agent)
            .bind(session.location.city)
            .bind(session.location.country)
            .bind(session.location.country_code)
            .bind(session.is_remember_session)
            .bind(session.login_successful)
            .bind(session.login_at)
            .bind(session.last_touched_at)
            .bind(session.logout_at)
            .bind(session.ended_by.map(|e| e.as_str()))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        session_from_row(&row)
    }

    async fn save(&self, session: &SessionLog) -> Result<()> {
        let result = sqlx::query(
            "UPDATE session_logs SET token = $2, ip_address = $3, user_agent = $4, city = $5, \
             country = $6, country_code = $7, is_remember_session = $8, login_successful = $9, \
             login_at = $10, last_touched_at = $11, logout_at = $12, ended_by = $13 WHERE id = $1",
        )
        .bind(session.id)
        .bind(&session.token)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.city)
        .bind(&session.country)
        .bind(&session.country_code)
        .bind(session.is_remember_session)
        .bind(session.login_successful)
        .bind(session.login_at)
        .bind(session.last_touched_at)
        .bind(session.logout_at)
        .bind(session.ended_by.map(|e| e.as_str()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("SessionLog", session.id));
        }
        Ok(())
    }

    async fn expire_idle(
        &self,
        user_id: Uuid,
        idle_cutoff: DateTime<Utc>,
        remember_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE session_logs SET logout_at = $4, ended_by = $5 \
             WHERE user_id = $1 AND logout_at IS NULL AND last_touched_at IS NOT NULL AND (\
               (NOT is_remember_session AND last_touched_at <= $2) \
               OR (is_remember_session AND last_touched_at <= $3))",
        )
        .bind(user_id)
        .bind(idle_cutoff)
        .bind(remember_cutoff)
        .bind(now)
        .bind(SessionEnd::Expired.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn force_sign_out(&self, user_id: Uuid, session_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE session_logs SET logout_at = $3, ended_by = $4 \
             WHERE id = $1 AND user_id = $2 AND login_successful AND logout_at IS NULL",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now)
        .bind(SessionEnd::Forced.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn force_sign_out_all_except(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE session_logs SET logout_at = $3, ended_by = $4 \
             WHERE user_id = $1 AND login_successful AND logout_at IS NULL \
             AND ($2::TEXT IS NULL OR token IS DISTINCT FROM $2)",
        )
        .bind(user_id)
        .bind(keep_token)
        .bind(now)
        .bind(SessionEnd::Forced.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionLog>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM session_logs \
             WHERE user_id = $1 AND login_successful AND logout_at IS NULL \
             ORDER BY last_touched_at DESC NULLS LAST"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        // Open rows can still be forced out, so keep the model's definition of active.
        Ok(rows
            .iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(SessionLog::is_active)
            .collect())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1) OR lower(email) = lower($1) LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(username) = lower($1))")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn email_taken(&self, email: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.profile.email_on_new_device_login)
            .bind(self.clock.now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::Conflict(format!("username {} is taken", user.username))
                }
                other => db_err(other),
            })?;
        user_from_row(&row)
    }
}

#[async_trait]
impl AuthAttemptRepository for PgStore {
    async fn count_since(&self, uid: &str, purpose: AttemptPurpose, since: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM auth_attempts \
             WHERE lower(uid) = lower($1) AND purpose = $2 AND deleted_at IS NULL AND created_at >= $3",
        )
        .bind(uid)
        .bind(purpose.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn record(&self, uid: &str, purpose: AttemptPurpose, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO auth_attempts (id, uid, purpose, created_at) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::now_v7())
            .bind(uid)
            .bind(purpose.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self, uid: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE auth_attempts SET deleted_at = $2 WHERE lower(uid) = lower($1) AND deleted_at IS NULL",
        )
        .bind(uid)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

fn watch_kind(target: &WatchTarget) -> (&'static str, Uuid) {
    match target {
        WatchTarget::Post(id) => ("post", *id),
        WatchTarget::Collection(id) => ("collection", *id),
    }
}

fn watchlist_from_row(row: &PgRow) -> Result<Watchlist> {
    let kind: String = row.try_get("target_kind").map_err(db_err)?;
    let target_id = row.try_get("target_id").map_err(db_err)?;
    let target = match kind.as_str() {
        "post" => WatchTarget::Post(target_id),
        "collection" => WatchTarget::Collection(target_id),
        other => return Err(bad_value("target_kind", other)),
    };
    Ok(Watchlist {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        target,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

#[async_trait]
impl WatchlistRepository for PgStore {
    async fn find(&self, user_id: Uuid, target: WatchTarget) -> Result<Option<Watchlist>> {
        let (kind, target_id) = watch_kind(&target);
        sqlx::query(
            "SELECT id, user_id, target_kind, target_id, created_at FROM watchlists \
             WHERE user_id = $1 AND target_kind = $2 AND target_id = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(watchlist_from_row)
        .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Watchlist>> {
        sqlx::query("SELECT id, user_id, target_kind, target_id, created_at FROM watchlists WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(watchlist_from_row)
            .transpose()
    }

    async fn insert(&self, entry: &Watchlist) -> Result<()> {
        let (kind, target_id) = watch_kind(&entry.target);
        sqlx::query(
            "INSERT INTO watchlists (id, user_id, target_kind, target_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(kind)
        .bind(target_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM watchlists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Watchlist>> {
        let rows = sqlx::query(
            "SELECT id, user_id, target_kind, target_id, created_at FROM watchlists \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(watchlist_from_row).collect()
    }
}

#[async_trait]
impl ProgressionRepository for PgStore {
    async fn find(&self, user_id: Uuid, post_id: Uuid) -> Result<Option<Progression>> {
        let row = sqlx::query(
            "SELECT id, user_id, post_id, is_completed, updated_at FROM progressions \
             WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| -> Result<Progression> {
            Ok(Progression {
                id: row.try_get("id").map_err(db_err)?,
                user_id: row.try_get("user_id").map_err(db_err)?,
                post_id: row.try_get("post_id").map_err(db_err)?,
                is_completed: row.try_get("is_completed").map_err(db_err)?,
                updated_at: row.try_get("updated_at").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn save(&self, progression: &Progression) -> Result<()> {
        sqlx::query(
            "INSERT INTO progressions (id, user_id, post_id, is_completed, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET is_completed = EXCLUDED.is_completed, updated_at = EXCLUDED.updated_at",
        )
        .bind(progression.id)
        .bind(progression.user_id)
        .bind(progression.post_id)
        .bind(progression.is_completed)
        .bind(progression.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
