use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    AccountStore, AttendanceFilter, AttendanceStore, MeetingStore, NotificationStore, StoreError,
    StoreResult,
};
use crate::model::{
    account::{
        Account, AccountId, AccountStatus, NewAccount, NewProfile, Profile, ProfileId, ProfileKind,
    },
    attendance::{AttendanceRecord, RecordId},
    meeting::{Meeting, MeetingId},
    notification::{NewNotification, Notification, NotificationId},
    role::Role,
};

/// Process-local store backing every collection. Each operation takes the
/// single lock once, so inserts and compare-and-set updates are atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    accounts: BTreeMap<AccountId, Account>,
    profiles: BTreeMap<ProfileId, Profile>,
    attendance: BTreeMap<RecordId, AttendanceRecord>,
    attendance_keys: HashMap<(AccountId, NaiveDate), RecordId>,
    meetings: BTreeMap<MeetingId, Meeting>,
    notifications: BTreeMap<NotificationId, Notification>,
}

impl Inner {
    // one sequence for every collection, so account and profile ids never collide
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_profile(&mut self, profile: NewProfile) -> Profile {
        let id = self.next_id();
        let profile = Profile {
            id,
            account_id: profile.account_id,
            kind: profile.kind,
            display_name: profile.display_name,
            code: profile.code,
        };
        self.profiles.insert(id, profile.clone());
        profile
    }
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        profile: Option<ProfileKind>,
    ) -> StoreResult<(Account, Option<Profile>)> {
        let mut inner = self.lock();
        if inner
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(StoreError::Duplicate);
        }
        let id = inner.next_id();
        let account = Account {
            id,
            name: account.name,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            status: account.status,
            created_at: account.created_at,
        };
        inner.accounts.insert(id, account.clone());

        let profile = profile.map(|kind| inner.add_profile(NewProfile::for_account(&account, kind)));
        Ok((account, profile))
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.lock().accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn accounts(
        &self,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<Account>> {
        Ok(self
            .lock()
            .accounts
            .values()
            .filter(|a| role.is_none_or(|r| a.role == r))
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: AccountId, status: AccountStatus) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.accounts.get_mut(&id) {
            Some(account) => {
                account.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile> {
        Ok(self.lock().add_profile(profile))
    }

    async fn profile(&self, id: ProfileId) -> StoreResult<Option<Profile>> {
        Ok(self.lock().profiles.get(&id).cloned())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn get(&self, id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.lock().attendance.get(&id).cloned())
    }

    async fn find(
        &self,
        employee_id: AccountId,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let inner = self.lock();
        Ok(inner
            .attendance_keys
            .get(&(employee_id, date))
            .and_then(|id| inner.attendance.get(id))
            .cloned())
    }

    async fn insert(&self, mut record: AttendanceRecord) -> StoreResult<AttendanceRecord> {
        let mut inner = self.lock();
        let key = (record.employee_id, record.date);
        if inner.attendance_keys.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }
        record.id = inner.next_id();
        record.version = 1;
        inner.attendance_keys.insert(key, record.id);
        inner.attendance.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &AttendanceRecord) -> StoreResult<Option<AttendanceRecord>> {
        let mut inner = self.lock();
        let Some(current) = inner.attendance.get_mut(&record.id) else {
            return Ok(None);
        };
        if current.version != record.version {
            return Ok(None);
        }
        let mut next = record.clone();
        // the unique key never moves
        next.employee_id = current.employee_id;
        next.date = current.date;
        next.version = current.version + 1;
        *current = next.clone();
        Ok(Some(next))
    }

    async fn delete(&self, id: RecordId) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.attendance.remove(&id) {
            Some(record) => {
                inner
                    .attendance_keys
                    .remove(&(record.employee_id, record.date));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
        let mut records: Vec<_> = self
            .lock()
            .attendance
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.date, r.employee_id));
        Ok(records)
    }
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn insert(&self, mut meeting: Meeting) -> StoreResult<Meeting> {
        let mut inner = self.lock();
        meeting.id = inner.next_id();
        meeting.version = 1;
        inner.meetings.insert(meeting.id, meeting.clone());
        Ok(meeting)
    }

    async fn get(&self, id: MeetingId) -> StoreResult<Option<Meeting>> {
        Ok(self.lock().meetings.get(&id).cloned())
    }

    async fn update(&self, meeting: &Meeting) -> StoreResult<Option<Meeting>> {
        let mut inner = self.lock();
        let Some(current) = inner.meetings.get_mut(&meeting.id) else {
            return Ok(None);
        };
        if current.version != meeting.version {
            return Ok(None);
        }
        let mut next = meeting.clone();
        next.version = current.version + 1;
        *current = next.clone();
        Ok(Some(next))
    }

    async fn delete(&self, id: MeetingId) -> StoreResult<bool> {
        Ok(self.lock().meetings.remove(&id).is_some())
    }

    async fn list(&self, participant: Option<AccountId>) -> StoreResult<Vec<Meeting>> {
        let mut meetings: Vec<_> = self
            .lock()
            .meetings
            .values()
            .filter(|m| participant.is_none_or(|id| m.participant_ids().any(|p| p == id)))
            .cloned()
            .collect();
        meetings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(meetings)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: NewNotification) -> StoreResult<Notification> {
        let mut inner = self.lock();
        let id = inner.next_id();
        let notification = Notification {
            id,
            recipient_id: notification.recipient_id,
            title: notification.title,
            message: notification.message,
            kind: notification.kind,
            audience_role: notification.audience_role,
            metadata: notification.metadata,
            is_read: false,
            created_at: notification.created_at,
        };
        inner.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    async fn list(
        &self,
        recipient: AccountId,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Notification>, u64)> {
        let inner = self.lock();
        let mut matching: Vec<_> = inner
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient && (!unread_only || !n.is_read))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn unread_count(&self, recipient: AccountId) -> StoreResult<u64> {
        Ok(self
            .lock()
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient && !n.is_read)
            .count() as u64)
    }

    async fn set_read(
        &self,
        id: NotificationId,
        recipient: AccountId,
        is_read: bool,
    ) -> StoreResult<Option<Notification>> {
        let mut inner = self.lock();
        match inner.notifications.get_mut(&id) {
            Some(n) if n.recipient_id == recipient => {
                n.is_read = is_read;
                Ok(Some(n.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_all_read(&self, recipient: AccountId) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut changed = 0;
        for n in inner
            .notifications
            .values_mut()
            .filter(|n| n.recipient_id == recipient && !n.is_read)
        {
            n.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, id: NotificationId, recipient: AccountId) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner
            .notifications
            .get(&id)
            .is_some_and(|n| n.recipient_id == recipient)
        {
            inner.notifications.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_many(&self, ids: &[NotificationId]) -> StoreResult<u64> {
        let mut inner = self.lock();
        Ok(ids
            .iter()
            .filter(|id| inner.notifications.remove(*id).is_some())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;
    use chrono::Utc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn new_account(email: &str, role: Role) -> NewAccount {
        NewAccount {
            name: email.to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            role,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn accounts_and_profiles_never_share_an_id() {
        let store = MemoryStore::default();
        let (admin, none) = store
            .insert_account(new_account("ada@x.io", Role::Admin), None)
            .await
            .unwrap();
        assert!(none.is_none());
        let (emp, profile) = store
            .insert_account(new_account("eve@x.io", Role::Employee), Some(ProfileKind::Employee))
            .await
            .unwrap();
        let profile = profile.unwrap();

        assert_eq!(profile.account_id, emp.id);
        assert_eq!(profile.code, Some(format!("EMP{:04}", emp.id)));
        for id in [admin.id, emp.id] {
            assert!(store.profile(id).await.unwrap().is_none());
        }
        assert!(store.account(profile.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_writes_neither_account_nor_profile() {
        let store = MemoryStore::default();
        store
            .insert_account(new_account("eve@x.io", Role::Employee), Some(ProfileKind::Employee))
            .await
            .unwrap();
        let again = store
            .insert_account(new_account("EVE@x.io", Role::Employee), Some(ProfileKind::Employee))
            .await;
        assert!(matches!(again, Err(StoreError::Duplicate)));
        assert_eq!(store.lock().profiles.len(), 1);
        assert_eq!(store.lock().accounts.len(), 1);
    }

    #[tokio::test]
    async fn second_insert_for_the_same_day_is_a_duplicate() {
        let store = MemoryStore::default();
        AttendanceStore::insert(&store, AttendanceRecord::new(1, day(), AttendanceStatus::Present))
            .await
            .unwrap();
        let again =
            AttendanceStore::insert(&store, AttendanceRecord::new(1, day(), AttendanceStatus::Present))
                .await;
        assert!(matches!(again, Err(StoreError::Duplicate)));
    }

    #[tokio::test]
    async fn stale_version_loses_the_update() {
        let store = MemoryStore::default();
        let record =
            AttendanceStore::insert(&store, AttendanceRecord::new(1, day(), AttendanceStatus::Absent))
                .await
                .unwrap();

        let mut first = record.clone();
        first.status = AttendanceStatus::Present;
        let saved = AttendanceStore::update(&store, &first).await.unwrap().unwrap();
        assert_eq!(saved.version, record.version + 1);

        let mut stale = record;
        stale.status = AttendanceStatus::Leave;
        assert!(AttendanceStore::update(&store, &stale).await.unwrap().is_none());
        let current = AttendanceStore::get(&store, saved.id).await.unwrap().unwrap();
        assert_eq!(current.status, AttendanceStatus::Present);
    }
}
