use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returns the current time as an RFC3339 string, the wire/storage format
/// for every timestamp in the system.
pub fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// Parses a stored RFC3339 timestamp back into a UTC instant.
pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Length of the human-facing family alias code.
pub const FAMILY_ALIAS_LEN: usize = 6;

/// Default member capacity for a newly created family.
pub const DEFAULT_FAMILY_MAX_SIZE: u32 = 10;

/// Generates a fresh alias code (A-Z only). Uniqueness is enforced by the
/// caller re-checking the store and retrying on collision.
pub fn generate_alias_name() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(FAMILY_ALIAS_LEN)
        .map(|b| (b'A' + (b % 26)) as char)
        .collect()
}

/// Metadata attached to an invited email that has not yet become a member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvite {
    pub invited_by: String,
    pub message: Option<String>,
    pub invited_at: String,
}

/// A named group of users sharing expense visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub id: String,
    pub alias_name: String,
    pub head_id: String,
    pub name: String,
    pub max_size: u32,
    pub members_ids: Vec<String>,
    #[serde(default)]
    pub pending_member_emails: HashMap<String, PendingInvite>,
    pub created_at: String,
    pub updated_at: String,
}

impl Family {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members_ids.iter().any(|id| id == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.members_ids.len() as u32 >= self.max_size
    }
}

/// A user record. `family_id` is a weak back-reference: it may point at a
/// family that no longer exists, which is what the cleanup service repairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUser {
    pub id: String,
    pub email: String,
    pub alias_name: String,
    pub family_id: Option<String>,
    /// Legacy single-device token, kept alongside the PushToken store.
    pub fcm_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lifecycle of a single join attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestStatus {
    Pending,
    Rejected,
    Cancelled,
    Accepted,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "PENDING",
            JoinRequestStatus::Rejected => "REJECTED",
            JoinRequestStatus::Cancelled => "CANCELLED",
            JoinRequestStatus::Accepted => "ACCEPTED",
        }
    }
}

/// One row per join attempt by a user against a family. Rows are never
/// deleted; resend rejects the previous PENDING row and inserts a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: String,
    pub requester_id: String,
    pub family_id: String,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl JoinRequest {
    pub fn new(requester_id: String, family_id: String, message: Option<String>) -> Self {
        let now = now_str();
        JoinRequest {
            id: Uuid::new_v4().to_string(),
            requester_id,
            family_id,
            message,
            status: JoinRequestStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Persisted inbox/audit record for a delivered domain notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub family_id: String,
    /// Payload type tag, mirrored into the push data.
    pub kind: String,
    pub created_at: String,
    pub read: bool,
}

/// A registered push-notification device token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    pub user_id: String,
    pub push_token: String,
    pub platform: String,
    pub updated_at: String,
}
