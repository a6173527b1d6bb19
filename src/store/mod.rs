//! Persistence seams.
//!
//! Every collection sits behind an async trait so the services can run
//! against MySQL in production and against [`memory::MemoryStore`] in tests.
//! Attendance records and meetings are versioned: `update` is a
//! compare-and-set on the caller's `version` and returns `None` when another
//! writer got there first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;
use sqlx::MySqlPool;

use crate::model::{
    account::{
        Account, AccountId, AccountStatus, NewAccount, NewProfile, Profile, ProfileId, ProfileKind,
    },
    attendance::{AttendanceRecord, RecordId},
    meeting::{Meeting, MeetingId},
    notification::{NewNotification, Notification, NotificationId},
    role::Role,
};

pub mod memory;
pub mod mysql;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "duplicate key")]
    Duplicate,
    #[display(fmt = "concurrent modification, retries exhausted")]
    Contention,
    #[display(fmt = "storage backend error: {}", _0)]
    Backend(anyhow::Error),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // 23000 = integrity constraint violation (duplicate key on MySQL)
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("23000") {
                return StoreError::Duplicate;
            }
        }
        StoreError::Backend(e.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts the account and, with `profile`, its person profile as one
    /// unit. `Duplicate` when the email is taken. Account and profile ids
    /// share a single sequence.
    async fn insert_account(
        &self,
        account: NewAccount,
        profile: Option<ProfileKind>,
    ) -> StoreResult<(Account, Option<Profile>)>;
    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    async fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    async fn accounts(
        &self,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<Account>>;
    async fn set_status(&self, id: AccountId, status: AccountStatus) -> StoreResult<bool>;
    async fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile>;
    async fn profile(&self, id: ProfileId) -> StoreResult<Option<Profile>>;
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub employee_id: Option<AccountId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pending_correction: bool,
    pub pending_leave: bool,
}

impl AttendanceFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.employee_id.is_none_or(|id| record.employee_id == id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
            && (!self.pending_correction || record.has_pending_correction())
            && (!self.pending_leave || record.has_pending_leave())
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get(&self, id: RecordId) -> StoreResult<Option<AttendanceRecord>>;
    async fn find(
        &self,
        employee_id: AccountId,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>>;
    /// `Duplicate` when a record for `(employee_id, date)` already exists.
    async fn insert(&self, record: AttendanceRecord) -> StoreResult<AttendanceRecord>;
    async fn update(&self, record: &AttendanceRecord) -> StoreResult<Option<AttendanceRecord>>;
    async fn delete(&self, id: RecordId) -> StoreResult<bool>;
    /// Ordered by date, then employee.
    async fn query(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn insert(&self, meeting: Meeting) -> StoreResult<Meeting>;
    async fn get(&self, id: MeetingId) -> StoreResult<Option<Meeting>>;
    async fn update(&self, meeting: &Meeting) -> StoreResult<Option<Meeting>>;
    async fn delete(&self, id: MeetingId) -> StoreResult<bool>;
    /// Newest first. With `participant`, only meetings that account attends.
    async fn list(&self, participant: Option<AccountId>) -> StoreResult<Vec<Meeting>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: NewNotification) -> StoreResult<Notification>;
    /// Newest first, plus the total matching count.
    async fn list(
        &self,
        recipient: AccountId,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Notification>, u64)>;
    async fn unread_count(&self, recipient: AccountId) -> StoreResult<u64>;
    async fn set_read(
        &self,
        id: NotificationId,
        recipient: AccountId,
        is_read: bool,
    ) -> StoreResult<Option<Notification>>;
    async fn mark_all_read(&self, recipient: AccountId) -> StoreResult<u64>;
    async fn delete(&self, id: NotificationId, recipient: AccountId) -> StoreResult<bool>;
    async fn delete_many(&self, ids: &[NotificationId]) -> StoreResult<u64>;
}

/// The four collections, wired to one backend.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub meetings: Arc<dyn MeetingStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(memory::MemoryStore::default()))
    }

    pub fn from_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            attendance: store.clone(),
            meetings: store.clone(),
            notifications: store,
        }
    }

    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            accounts: Arc::new(mysql::MySqlAccountStore::new(pool.clone())),
            attendance: Arc::new(mysql::MySqlAttendanceStore::new(pool.clone())),
            meetings: Arc::new(mysql::MySqlMeetingStore::new(pool.clone())),
            notifications: Arc::new(mysql::MySqlNotificationStore::new(pool)),
        }
    }
}
