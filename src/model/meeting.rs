use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::account::AccountId;

pub type MeetingId = u64;

pub const DEFAULT_MEETING_LOCATION: &str = "Office";

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum MeetingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum ParticipantStatus {
    Invited,
    Accepted,
    Declined,
    Tentative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    pub account_id: AccountId,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeetingMinutes {
    pub discussion: String,
    pub decisions: Option<String>,
    pub recorded_by: AccountId,
    #[schema(value_type = String, format = "date-time")]
    pub recorded_at: DateTime<Utc>,
}

/// A meeting and its RSVP list.
///
/// The organizer is always the first participant and always `Accepted`;
/// account ids in `participants` are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Meeting {
    pub id: MeetingId,
    pub title: String,
    pub description: String,
    pub organizer: AccountId,
    pub participants: Vec<Participant>,
    #[schema(value_type = String, format = "date-time")]
    pub start_time: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end_time: DateTime<Utc>,
    pub location: String,
    pub meeting_link: Option<String>,
    pub status: MeetingStatus,
    pub minutes: Option<MeetingMinutes>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: u32,
}

impl Meeting {
    /// Cancelled and completed meetings accept no further transitions.
    pub fn is_closed(&self) -> bool {
        self.status != MeetingStatus::Scheduled
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.participants.iter().map(|p| p.account_id)
    }

    pub fn participant_mut(&mut self, account_id: AccountId) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.account_id == account_id)
    }

    /// Organizer first as `Accepted`, then everyone else as `Invited`.
    /// Duplicates and the organizer's own id are dropped from `invitees`.
    pub fn roster(organizer: AccountId, invitees: &[AccountId]) -> Vec<Participant> {
        let mut roster = vec![Participant {
            account_id: organizer,
            status: ParticipantStatus::Accepted,
        }];
        for &account_id in invitees {
            if roster.iter().all(|p| p.account_id != account_id) {
                roster.push(Participant {
                    account_id,
                    status: ParticipantStatus::Invited,
                });
            }
        }
        roster
    }
}
