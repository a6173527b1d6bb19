use std::collections::BTreeSet;
use std::sync::Arc;

use futures::{StreamExt, future, stream};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use super::ServiceResult;
use crate::{
    clock::Clock,
    error::ServiceError,
    model::{
        account::{AccountId, AccountStatus},
        notification::{NewNotification, Notification, NotificationId, NotificationKind},
        role::Role,
    },
    realtime::{ChannelKey, Publisher},
    store::{AccountStore, NotificationStore},
};

/// Event name used on per-account channels for freshly persisted notifications.
pub const NEW_NOTIFICATION: &str = "new-notification";

/// A domain event plus the accounts that should hear about it.
///
/// The audience is a set, so an account added twice still receives a single
/// notification.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub audience: BTreeSet<AccountId>,
    pub title: String,
    pub message: String,
    pub metadata: Value,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            audience: BTreeSet::new(),
            title: title.into(),
            message: message.into(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn to(mut self, account_id: AccountId) -> Self {
        self.audience.insert(account_id);
        self
    }

    pub fn to_all(mut self, accounts: impl IntoIterator<Item = AccountId>) -> Self {
        self.audience.extend(accounts);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub struct NotificationFanout {
    accounts: Arc<dyn AccountStore>,
    notifications: Arc<dyn NotificationStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl NotificationFanout {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        notifications: Arc<dyn NotificationStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            accounts,
            notifications,
            publisher,
            clock,
            concurrency: concurrency.max(1),
        }
    }

    /// Persists one notification per audience member and pushes it on that
    /// member's channel. Recipients are handled independently: a failure for
    /// one is logged and skipped. Returns what was persisted, by recipient.
    #[tracing::instrument(skip(self, event), fields(kind = %event.kind, audience = event.audience.len()))]
    pub async fn notify(&self, event: NotificationEvent) -> Vec<Notification> {
        let created_at = self.clock.now();
        let event = &event;

        let mut delivered: Vec<Notification> = stream::iter(event.audience.iter().copied())
            .map(|recipient| self.deliver(event, recipient, created_at))
            .buffer_unordered(self.concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        delivered.sort_by_key(|n| n.recipient_id);
        delivered
    }

    async fn deliver(
        &self,
        event: &NotificationEvent,
        recipient: AccountId,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Option<Notification> {
        let role = match self.accounts.account(recipient).await {
            Ok(Some(account)) => account.role,
            Ok(None) => {
                tracing::warn!(recipient, "notification recipient does not exist, skipping");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, recipient, "failed to load notification recipient");
                return None;
            }
        };

        let notification = match self
            .notifications
            .insert(NewNotification {
                recipient_id: recipient,
                title: event.title.clone(),
                message: event.message.clone(),
                kind: event.kind,
                audience_role: role,
                metadata: event.metadata.clone(),
                created_at,
            })
            .await
        {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, recipient, "failed to persist notification");
                return None;
            }
        };

        let payload = serde_json::to_value(&notification).unwrap_or_default();
        let channel = ChannelKey::Account(role, recipient);
        if let Err(e) = self.publisher.publish(channel, NEW_NOTIFICATION, payload).await {
            tracing::warn!(error = %e, %channel, "realtime publish failed");
        }

        Some(notification)
    }

    /// Role-wide event with no persisted notification behind it.
    pub async fn broadcast(&self, role: Role, name: &str, payload: Value) {
        let channel = ChannelKey::Role(role);
        if let Err(e) = self.publisher.publish(channel, name, payload).await {
            tracing::warn!(error = %e, %channel, event = name, "realtime broadcast failed");
        }
    }

    /// Every active admin. A lookup failure yields an empty audience, since
    /// notifications never fail the operation that triggered them.
    pub async fn admins(&self) -> BTreeSet<AccountId> {
        match self
            .accounts
            .accounts(Some(Role::Admin), Some(AccountStatus::Active))
            .await
        {
            Ok(admins) => admins.into_iter().map(|a| a.id).collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to load admin audience");
                BTreeSet::new()
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InboxPage {
    pub notifications: Vec<Notification>,
    pub total: u64,
    pub unread: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Read side of notifications, always scoped to one recipient.
pub struct Inbox {
    notifications: Arc<dyn NotificationStore>,
}

impl Inbox {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }

    pub async fn list(
        &self,
        recipient: AccountId,
        unread_only: bool,
        page: u64,
        per_page: u64,
    ) -> ServiceResult<InboxPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);

        let (notifications, total) = self
            .notifications
            .list(recipient, unread_only, per_page, offset)
            .await?;
        let unread = self.notifications.unread_count(recipient).await?;

        Ok(InboxPage {
            notifications,
            total,
            unread,
            page,
            per_page,
        })
    }

    pub async fn unread_count(&self, recipient: AccountId) -> ServiceResult<u64> {
        Ok(self.notifications.unread_count(recipient).await?)
    }

    pub async fn mark_read(
        &self,
        id: NotificationId,
        recipient: AccountId,
    ) -> ServiceResult<Notification> {
        self.set_read(id, recipient, true).await
    }

    pub async fn mark_unread(
        &self,
        id: NotificationId,
        recipient: AccountId,
    ) -> ServiceResult<Notification> {
        self.set_read(id, recipient, false).await
    }

    async fn set_read(
        &self,
        id: NotificationId,
        recipient: AccountId,
        is_read: bool,
    ) -> ServiceResult<Notification> {
        self.notifications
            .set_read(id, recipient, is_read)
            .await?
            .ok_or_else(|| ServiceError::not_found("notification", id))
    }

    pub async fn mark_all_read(&self, recipient: AccountId) -> ServiceResult<u64> {
        Ok(self.notifications.mark_all_read(recipient).await?)
    }

    /// Someone else's notification is reported as missing.
    pub async fn delete(&self, id: NotificationId, recipient: AccountId) -> ServiceResult<()> {
        if self.notifications.delete(id, recipient).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("notification", id))
        }
    }

    pub async fn purge(&self, ids: &[NotificationId]) -> ServiceResult<u64> {
        let deleted = self.notifications.delete_many(ids).await?;
        tracing::info!(requested = ids.len(), deleted, "notifications purged");
        Ok(deleted)
    }
}
