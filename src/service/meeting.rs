use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{
    MAX_WRITE_ATTEMPTS, ServiceResult,
    notification::{NotificationEvent, NotificationFanout},
    resolver::ParticipantResolver,
};
use crate::{
    clock::Clock,
    error::{ConflictError, ServiceError, UnauthorizedError, ValidationError},
    model::{
        account::{Account, AccountId},
        meeting::{
            DEFAULT_MEETING_LOCATION, Meeting, MeetingId, MeetingMinutes, MeetingStatus,
            ParticipantStatus,
        },
        notification::NotificationKind,
        role::Role,
    },
    store::{AccountStore, MeetingStore, StoreError},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "title": "Sprint review",
    "description": "Demo of the attendance module",
    "start_time": "2026-03-02T10:00:00Z",
    "end_time": "2026-03-02T11:00:00Z",
    "location": "Room 4",
    "participants": [7, 12]
}))]
pub struct MeetingDraft {
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub start_time: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
    /// Account ids or person-profile ids.
    pub participants: Vec<u64>,
}

/// Absent fields are left alone. `participants`, when given, replaces the
/// whole list and resets everyone but the organizer to `Invited`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MeetingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub start_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
    pub participants: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MinutesInput {
    pub discussion: String,
    pub decisions: Option<String>,
}

pub struct MeetingScheduler {
    meetings: Arc<dyn MeetingStore>,
    accounts: Arc<dyn AccountStore>,
    resolver: ParticipantResolver,
    fanout: Arc<NotificationFanout>,
    clock: Arc<dyn Clock>,
}

impl MeetingScheduler {
    pub fn new(
        meetings: Arc<dyn MeetingStore>,
        accounts: Arc<dyn AccountStore>,
        resolver: ParticipantResolver,
        fanout: Arc<NotificationFanout>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            meetings,
            accounts,
            resolver,
            fanout,
            clock,
        }
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn schedule(&self, organizer_id: AccountId, draft: MeetingDraft) -> ServiceResult<Meeting> {
        let organizer = self.account(organizer_id).await?;
        if !matches!(organizer.role, Role::Admin | Role::Client) {
            return Err(UnauthorizedError::RoleNotAllowed.into());
        }

        let title = draft.title.trim();
        if title.is_empty() {
            return Err(ServiceError::invalid("title is required"));
        }
        if draft.participants.is_empty() {
            return Err(ValidationError::EmptyParticipants.into());
        }
        let invitees = self.resolver.resolve_all(&draft.participants).await?;
        if draft.start_time >= draft.end_time {
            return Err(ValidationError::InvalidWindow.into());
        }

        let meeting = self
            .meetings
            .insert(Meeting {
                id: 0,
                title: title.to_string(),
                description: draft.description.unwrap_or_default(),
                organizer: organizer.id,
                participants: Meeting::roster(organizer.id, &invitees),
                start_time: draft.start_time,
                end_time: draft.end_time,
                location: draft
                    .location
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_MEETING_LOCATION.to_string()),
                meeting_link: draft.meeting_link,
                status: MeetingStatus::Scheduled,
                minutes: None,
                created_at: self.clock.now(),
                version: 0,
            })
            .await?;
        tracing::info!(meeting_id = meeting.id, participants = meeting.participants.len(), "meeting scheduled");

        self.announce(
            &meeting,
            &organizer,
            "meeting-scheduled",
            "New Meeting Scheduled",
            format!(
                "{} scheduled \"{}\" on {}",
                organizer.name,
                meeting.title,
                when(&meeting)
            ),
        )
        .await;
        self.refresh_lists("meeting-created", &meeting).await;

        Ok(meeting)
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update(
        &self,
        meeting_id: MeetingId,
        actor_id: AccountId,
        patch: MeetingPatch,
    ) -> ServiceResult<Meeting> {
        let actor = self.account(actor_id).await?;
        let current = self.meeting(meeting_id).await?;
        authorize(&actor, &current)?;
        if current.is_closed() {
            return Err(ConflictError::MeetingClosed.into());
        }

        let replacement = match &patch.participants {
            Some(raw) if raw.is_empty() => return Err(ValidationError::EmptyParticipants.into()),
            Some(raw) => Some(self.resolver.resolve_all(raw).await?),
            None => None,
        };

        let mut meeting = current;
        let mut saved = None;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if meeting.is_closed() {
                return Err(ConflictError::MeetingClosed.into());
            }
            apply_patch(&mut meeting, &patch, replacement.as_deref())?;
            if let Some(updated) = self.meetings.update(&meeting).await? {
                saved = Some(updated);
                break;
            }
            meeting = self.meeting(meeting_id).await?;
        }
        let meeting = saved.ok_or(StoreError::Contention)?;

        let organizer = self.account(meeting.organizer).await?;
        self.announce(
            &meeting,
            &organizer,
            "meeting-updated",
            "Meeting Updated",
            format!("\"{}\" was updated and now takes place on {}", meeting.title, when(&meeting)),
        )
        .await;
        self.refresh_lists("meeting-updated", &meeting).await;

        Ok(meeting)
    }

    /// Notifies every participant first, then marks the meeting cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, meeting_id: MeetingId, actor_id: AccountId) -> ServiceResult<Meeting> {
        let actor = self.account(actor_id).await?;
        let meeting = self.meeting(meeting_id).await?;
        authorize(&actor, &meeting)?;
        if meeting.is_closed() {
            return Err(ConflictError::MeetingClosed.into());
        }

        let organizer = self.account(meeting.organizer).await?;
        self.announce(
            &meeting,
            &organizer,
            "meeting-cancelled",
            "Meeting Cancelled",
            format!(
                "{} has cancelled \"{}\" on {}",
                actor.name,
                meeting.title,
                when(&meeting)
            ),
        )
        .await;

        let cancelled = self
            .transition(meeting, |m| {
                if m.is_closed() {
                    return Err(ConflictError::MeetingClosed.into());
                }
                m.status = MeetingStatus::Cancelled;
                Ok(())
            })
            .await?;
        tracing::info!(meeting_id, "meeting cancelled");
        self.refresh_lists("meeting-updated", &cancelled).await;

        Ok(cancelled)
    }

    /// Admin-only hard delete. Participants are told before the record goes.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, meeting_id: MeetingId, actor_id: AccountId) -> ServiceResult<()> {
        let actor = self.account(actor_id).await?;
        if actor.role != Role::Admin {
            return Err(UnauthorizedError::RoleNotAllowed.into());
        }
        let meeting = self.meeting(meeting_id).await?;

        let organizer = self.account(meeting.organizer).await?;
        self.announce(
            &meeting,
            &organizer,
            "meeting-deleted",
            "Meeting Cancelled",
            format!("\"{}\" scheduled for {} has been cancelled", meeting.title, when(&meeting)),
        )
        .await;

        if !self.meetings.delete(meeting_id).await? {
            return Err(ServiceError::not_found("meeting", meeting_id));
        }
        tracing::info!(meeting_id, "meeting deleted");
        self.refresh_lists("meeting-deleted", &meeting).await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_participant_status(
        &self,
        meeting_id: MeetingId,
        account_id: AccountId,
        status: ParticipantStatus,
    ) -> ServiceResult<Meeting> {
        let meeting = self.meeting(meeting_id).await?;
        self.transition(meeting, |m| {
            if m.is_closed() {
                return Err(ConflictError::MeetingClosed.into());
            }
            if m.organizer == account_id && status != ParticipantStatus::Accepted {
                return Err(ServiceError::invalid("the organizer always attends"));
            }
            let participant = m
                .participant_mut(account_id)
                .ok_or(UnauthorizedError::NotAParticipant)?;
            participant.status = status;
            Ok(())
        })
        .await
    }

    /// `Scheduled -> Completed`.
    #[tracing::instrument(skip(self, input))]
    pub async fn record_minutes(
        &self,
        meeting_id: MeetingId,
        actor_id: AccountId,
        input: MinutesInput,
    ) -> ServiceResult<Meeting> {
        if input.discussion.trim().is_empty() {
            return Err(ServiceError::invalid("discussion is required"));
        }
        let actor = self.account(actor_id).await?;
        let meeting = self.meeting(meeting_id).await?;
        authorize(&actor, &meeting)?;

        let minutes = MeetingMinutes {
            discussion: input.discussion,
            decisions: input.decisions,
            recorded_by: actor.id,
            recorded_at: self.clock.now(),
        };
        let completed = self
            .transition(meeting, |m| {
                if m.is_closed() {
                    return Err(ConflictError::MeetingClosed.into());
                }
                m.minutes = Some(minutes.clone());
                m.status = MeetingStatus::Completed;
                Ok(())
            })
            .await?;
        self.refresh_lists("meeting-updated", &completed).await;
        Ok(completed)
    }

    pub async fn get(&self, meeting_id: MeetingId) -> ServiceResult<Meeting> {
        self.meeting(meeting_id).await
    }

    /// Admins see any meeting; everyone else only the ones they attend.
    pub async fn view(&self, meeting_id: MeetingId, viewer: AccountId, role: Role) -> ServiceResult<Meeting> {
        let meeting = self.meeting(meeting_id).await?;
        if role != Role::Admin && !meeting.participant_ids().any(|id| id == viewer) {
            return Err(UnauthorizedError::NotAParticipant.into());
        }
        Ok(meeting)
    }

    pub async fn list_for_account(&self, account_id: AccountId) -> ServiceResult<Vec<Meeting>> {
        Ok(self.meetings.list(Some(account_id)).await?)
    }

    pub async fn list_all(&self) -> ServiceResult<Vec<Meeting>> {
        Ok(self.meetings.list(None).await?)
    }

    async fn account(&self, id: AccountId) -> ServiceResult<Account> {
        self.accounts
            .account(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", id))
    }

    async fn meeting(&self, id: MeetingId) -> ServiceResult<Meeting> {
        self.meetings
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("meeting", id))
    }

    /// Optimistic read-modify-write, re-reading on a lost race.
    async fn transition<F>(&self, mut meeting: Meeting, mut change: F) -> ServiceResult<Meeting>
    where
        F: FnMut(&mut Meeting) -> ServiceResult<()> + Send,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            change(&mut meeting)?;
            if let Some(saved) = self.meetings.update(&meeting).await? {
                return Ok(saved);
            }
            tracing::debug!(meeting_id = meeting.id, "meeting write raced, retrying");
            meeting = self.meeting(meeting.id).await?;
        }
        Err(StoreError::Contention.into())
    }

    /// Organizer, every participant, and all active admins when a client
    /// organized the meeting.
    async fn announce(
        &self,
        meeting: &Meeting,
        organizer: &Account,
        action: &str,
        title: &str,
        message: String,
    ) -> usize {
        let mut event = NotificationEvent::new(NotificationKind::Meeting, title, message)
            .to(meeting.organizer)
            .to_all(meeting.participant_ids())
            .with_metadata(json!({
                "meeting_id": meeting.id,
                "action": action,
                "start_time": meeting.start_time,
                "organizer": organizer.id,
            }));
        if organizer.role == Role::Client {
            event = event.to_all(self.fanout.admins().await);
        }
        self.fanout.notify(event).await.len()
    }

    async fn refresh_lists(&self, name: &str, meeting: &Meeting) {
        self.fanout
            .broadcast(Role::Admin, name, json!({ "meeting_id": meeting.id, "status": meeting.status }))
            .await;
    }
}

fn authorize(actor: &Account, meeting: &Meeting) -> ServiceResult<()> {
    if actor.role == Role::Admin || actor.id == meeting.organizer {
        Ok(())
    } else {
        Err(UnauthorizedError::NotOrganizer.into())
    }
}

fn apply_patch(
    meeting: &mut Meeting,
    patch: &MeetingPatch,
    participants: Option<&[AccountId]>,
) -> ServiceResult<()> {
    if let Some(title) = &patch.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::invalid("title is required"));
        }
        meeting.title = title.to_string();
    }
    if let Some(description) = &patch.description {
        meeting.description = description.clone();
    }
    if let Some(start) = patch.start_time {
        meeting.start_time = start;
    }
    if let Some(end) = patch.end_time {
        meeting.end_time = end;
    }
    if meeting.start_time >= meeting.end_time {
        return Err(ValidationError::InvalidWindow.into());
    }
    if let Some(location) = &patch.location {
        meeting.location = location.clone();
    }
    if let Some(link) = &patch.meeting_link {
        meeting.meeting_link = Some(link.clone());
    }
    if let Some(invitees) = participants {
        meeting.participants = Meeting::roster(meeting.organizer, invitees);
    }
    Ok(())
}

fn when(meeting: &Meeting) -> String {
    meeting
        .start_time
        .format("%a, %b %-d, %Y at %I:%M %p")
        .to_string()
}
