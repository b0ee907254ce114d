//! Session records and the policy that expires them.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    SignedOut,
    Forced,
    Expired,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::SignedOut => "signed_out",
            SessionEnd::Forced => "forced",
            SessionEnd::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signed_out" => Some(SessionEnd::SignedOut),
            "forced" => Some(SessionEnd::Forced),
            "expired" => Some(SessionEnd::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    LoggedOut,
    ForcedOut,
    Expired,
}

/// One sign-in of one user on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub is_remember_session: bool,
    pub login_successful: bool,
    pub login_at: Option<DateTime<Utc>>,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub logout_at: Option<DateTime<Utc>>,
    pub ended_by: Option<SessionEnd>,
    /// Computed on read; never persisted.
    #[serde(default)]
    pub is_current_session: bool,
}

impl SessionLog {
    pub fn force_logout(&self) -> bool {
        self.ended_by == Some(SessionEnd::Forced)
    }

    pub fn status(&self) -> SessionStatus {
        match (self.logout_at, self.ended_by) {
            (None, _) => SessionStatus::Active,
            (Some(_), Some(SessionEnd::Forced)) => SessionStatus::ForcedOut,
            (Some(_), Some(SessionEnd::Expired)) => SessionStatus::Expired,
            (Some(_), _) => SessionStatus::LoggedOut,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }
}

/// Values for a session about to be created.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Location,
    pub is_remember_session: bool,
    pub login_successful: bool,
    pub login_at: Option<DateTime<Utc>>,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub logout_at: Option<DateTime<Utc>>,
    pub ended_by: Option<SessionEnd>,
}

/// Result of a geo-ip lookup. All fields empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// Idle windows after which an untouched session is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub idle: Duration,
    pub remember_years: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle: Duration::hours(2),
            remember_years: 5,
        }
    }
}

impl SessionPolicy {
    /// Non-remembered sessions touched at or before this instant are expired.
    pub fn idle_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.idle
    }

    /// Remembered sessions touched at or before this instant are expired.
    pub fn remember_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(12 * self.remember_years))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired(&self, session: &SessionLog, now: DateTime<Utc>) -> bool {
        if session.logout_at.is_some() {
            return false;
        }
        let Some(touched) = session.last_touched_at else {
            return false;
        };
        let cutoff = if session.is_remember_session {
            self.remember_cutoff(now)
        } else {
            self.idle_cutoff(now)
        };
        touched <= cutoff
    }
}
