//! Conversation session entity
//!
//! The only entity whose lifecycle the scheduler core owns. Terminal rows
//! are retained for audit history and never deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Session lifecycle status
///
/// Moves only forward: `{pending|queued} -> active -> {expired|ended}`,
/// with direct reaping/cancellation of pending and queued rows allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Queued,
    Active,
    Expired,
    Ended,
}

impl SessionStatus {
    /// Whether a status change to `next` respects the forward-only lifecycle
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Active)
                | (Pending, Expired)
                | (Pending, Ended)
                | (Queued, Active)
                | (Queued, Expired)
                | (Queued, Ended)
                | (Active, Expired)
                | (Active, Ended)
        )
    }

    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Ended)
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => SessionStatus::Pending,
            "queued" => SessionStatus::Queued,
            "active" => SessionStatus::Active,
            "expired" => SessionStatus::Expired,
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Ended,
        }
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Pending => "pending".to_string(),
            SessionStatus::Queued => "queued".to_string(),
            SessionStatus::Active => "active".to_string(),
            SessionStatus::Expired => "expired".to_string(),
            SessionStatus::Ended => "ended".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client-held secret, unique, immutable
    #[sea_orm(column_type = "Text", unique)]
    pub token: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Present only while queued; advisory between reconciler passes
    pub queue_position: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,

    /// Accumulated by the conversation handler, read-only to the scheduler
    #[sea_orm(column_type = "Double")]
    pub total_cost: f64,

    pub total_tokens_used: i64,

    pub created_at: DateTimeWithTimeZone,

    pub activated_at: Option<DateTimeWithTimeZone>,

    pub last_activity_at: Option<DateTimeWithTimeZone>,

    /// Hard ceiling set once at creation, independent of activity
    pub expires_at: DateTimeWithTimeZone,

    pub ended_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Get the session status as an enum
    pub fn session_status(&self) -> SessionStatus {
        SessionStatus::from(self.status.clone())
    }

    /// Check if the session is past its hard TTL
    pub fn is_expired(&self) -> bool {
        use chrono::Utc;
        self.expires_at < DateTimeWithTimeZone::from(Utc::now())
    }

    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.session_status().is_terminal()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Queued,
            SessionStatus::Active,
            SessionStatus::Expired,
            SessionStatus::Ended,
        ] {
            let s: String = status.into();
            assert_eq!(SessionStatus::from(s), status);
        }
    }

    #[test]
    fn test_forward_only_transitions() {
        use SessionStatus::*;

        assert!(Queued.can_transition_to(Active));
        assert!(Pending.can_transition_to(Queued));
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Ended));
        assert!(Queued.can_transition_to(Expired));

        // Never backward
        assert!(!Active.can_transition_to(Queued));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Ended.can_transition_to(Queued));
        assert!(!Expired.can_transition_to(Ended));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Ended.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Queued.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
    }
}
