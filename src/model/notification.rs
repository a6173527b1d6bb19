use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::account::AccountId;
use super::role::Role;

pub type NotificationId = u64;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Employee,
    Project,
    Task,
    Meeting,
    Attendance,
    Client,
    Report,
    Alert,
}

/// Immutable apart from `is_read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "recipient_id": 7,
    "title": "Meeting Cancelled",
    "message": "Jane Doe has cancelled a meeting \"Sprint review\" on Mon, Mar 2, 2026 at 10:00 AM",
    "type": "meeting",
    "audience_role": "employee",
    "metadata": { "meeting_id": 3, "action": "meeting-cancelled" },
    "is_read": false,
    "created_at": "2026-03-01T18:00:00Z"
}))]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: AccountId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub audience_role: Role,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: AccountId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub audience_role: Role,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
