use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder, types::Json};

use super::{
    AccountStore, AttendanceFilter, AttendanceStore, MeetingStore, NotificationStore, StoreError,
    StoreResult,
};
use crate::model::{
    account::{
        Account, AccountId, AccountStatus, NewAccount, NewProfile, Profile, ProfileId, ProfileKind,
    },
    attendance::{AttendanceRecord, CorrectionRequest, LeaveRequest, RecordId},
    meeting::{Meeting, MeetingId, MeetingMinutes, Participant},
    notification::{NewNotification, Notification, NotificationId},
    role::Role,
};

fn parse<T>(column: &str, raw: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| StoreError::Backend(anyhow!("bad {column} value {raw:?}: {e}")))
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Date(NaiveDate),
    Str(&'a str),
}

/* =========================
Accounts & profiles
========================= */

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, status, created_at";

#[derive(FromRow)]
struct AccountRow {
    id: u64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> StoreResult<Self> {
        Ok(Account {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: parse("accounts.role", &row.role)?,
            status: parse("accounts.status", &row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: u64,
    account_id: u64,
    kind: String,
    display_name: String,
    code: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> StoreResult<Self> {
        Ok(Profile {
            id: row.id,
            account_id: row.account_id,
            kind: parse("profiles.kind", &row.kind)?,
            display_name: row.display_name,
            code: row.code,
        })
    }
}

async fn next_party_id(tx: &mut sqlx::Transaction<'_, MySql>) -> StoreResult<u64> {
    let result = sqlx::query("INSERT INTO party_ids () VALUES ()")
        .execute(&mut **tx)
        .await?;
    Ok(result.last_insert_id())
}

async fn insert_profile(
    tx: &mut sqlx::Transaction<'_, MySql>,
    profile: NewProfile,
) -> StoreResult<Profile> {
    let id = next_party_id(tx).await?;
    sqlx::query(
        "INSERT INTO profiles (id, account_id, kind, display_name, code) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(profile.account_id)
    .bind(profile.kind.as_ref())
    .bind(&profile.display_name)
    .bind(&profile.code)
    .execute(&mut **tx)
    .await?;

    Ok(Profile {
        id,
        account_id: profile.account_id,
        kind: profile.kind,
        display_name: profile.display_name,
        code: profile.code,
    })
}

pub struct MySqlAccountStore {
    pool: MySqlPool,
}

impl MySqlAccountStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for MySqlAccountStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        profile: Option<ProfileKind>,
    ) -> StoreResult<(Account, Option<Profile>)> {
        let mut tx = self.pool.begin().await?;

        let id = next_party_id(&mut tx).await?;
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password_hash, role, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_ref())
        .bind(account.status.as_ref())
        .bind(account.created_at)
        .execute(&mut *tx)
        .await?;

        let account = Account {
            id,
            name: account.name,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            status: account.status,
            created_at: account.created_at,
        };
        let profile = match profile {
            Some(kind) => Some(insert_profile(&mut tx, NewProfile::for_account(&account, kind)).await?),
            None => None,
        };

        // dropping `tx` on an early return rolls both inserts back
        tx.commit().await?;
        Ok((account, profile))
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Account::try_from)
        .transpose()
    }

    async fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Account::try_from)
        .transpose()
    }

    async fn accounts(
        &self,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<Account>> {
        let mut sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(role) = role.as_ref() {
            sql.push_str(" AND role = ?");
            args.push(FilterValue::Str(role.as_ref()));
        }
        if let Some(status) = status.as_ref() {
            sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.as_ref()));
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query_as::<_, AccountRow>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Date(d) => query.bind(d),
                FilterValue::Str(s) => query.bind(s),
            };
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn set_status(&self, id: AccountId, status: AccountStatus) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE accounts SET status = ? WHERE id = ?")
            .bind(status.as_ref())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // an unchanged row reports zero affected rows
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found > 0)
    }

    async fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile> {
        let mut tx = self.pool.begin().await?;
        let profile = insert_profile(&mut tx, profile).await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn profile(&self, id: ProfileId) -> StoreResult<Option<Profile>> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, account_id, kind, display_name, code FROM profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Profile::try_from)
        .transpose()
    }
}

/* =========================
Attendance
========================= */

const ATTENDANCE_COLUMNS: &str = "id, employee_id, date, check_in_time, check_out_time, \
    check_in_location, check_out_location, work_hours, status, is_late, late_by_minutes, \
    notes, correction_request, leave_request, version";

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    check_in_time: Option<DateTime<Utc>>,
    check_out_time: Option<DateTime<Utc>>,
    check_in_location: String,
    check_out_location: Option<String>,
    work_hours: f64,
    status: String,
    is_late: bool,
    late_by_minutes: i64,
    notes: Option<String>,
    correction_request: Option<Json<CorrectionRequest>>,
    leave_request: Option<Json<LeaveRequest>>,
    version: u32,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> StoreResult<Self> {
        Ok(AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            check_in_location: row.check_in_location,
            check_out_location: row.check_out_location,
            work_hours: row.work_hours,
            status: parse("attendance.status", &row.status)?,
            is_late: row.is_late,
            late_by_minutes: row.late_by_minutes,
            notes: row.notes,
            correction_request: row.correction_request.map(|Json(c)| c),
            leave_request: row.leave_request.map(|Json(l)| l),
            version: row.version,
        })
    }
}

pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn get(&self, id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
        sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(AttendanceRecord::try_from)
        .transpose()
    }

    async fn find(
        &self,
        employee_id: AccountId,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND date = ?"
        ))
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?
        .map(AttendanceRecord::try_from)
        .transpose()
    }

    async fn insert(&self, mut record: AttendanceRecord) -> StoreResult<AttendanceRecord> {
        // uq_attendance_employee_date turns a lost race into StoreError::Duplicate
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, date, check_in_time, check_out_time, check_in_location,
                 check_out_location, work_hours, status, is_late, late_by_minutes, notes,
                 correction_request, leave_request, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(record.employee_id)
        .bind(record.date)
        .bind(record.check_in_time)
        .bind(record.check_out_time)
        .bind(&record.check_in_location)
        .bind(&record.check_out_location)
        .bind(record.work_hours)
        .bind(record.status.as_ref())
        .bind(record.is_late)
        .bind(record.late_by_minutes)
        .bind(&record.notes)
        .bind(record.correction_request.as_ref().map(Json))
        .bind(record.leave_request.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        record.id = result.last_insert_id();
        record.version = 1;
        Ok(record)
    }

    async fn update(&self, record: &AttendanceRecord) -> StoreResult<Option<AttendanceRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET check_in_time = ?,
                check_out_time = ?,
                check_in_location = ?,
                check_out_location = ?,
                work_hours = ?,
                status = ?,
                is_late = ?,
                late_by_minutes = ?,
                notes = ?,
                correction_request = ?,
                leave_request = ?,
                version = version + 1
            WHERE id = ?
            AND version = ?
            "#,
        )
        .bind(record.check_in_time)
        .bind(record.check_out_time)
        .bind(&record.check_in_location)
        .bind(&record.check_out_location)
        .bind(record.work_hours)
        .bind(record.status.as_ref())
        .bind(record.is_late)
        .bind(record.late_by_minutes)
        .bind(&record.notes)
        .bind(record.correction_request.as_ref().map(Json))
        .bind(record.leave_request.as_ref().map(Json))
        .bind(record.id)
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(record.id).await
    }

    async fn delete(&self, id: RecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM attendance WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
        let mut sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(employee_id) = filter.employee_id {
            sql.push_str(" AND employee_id = ?");
            args.push(FilterValue::U64(employee_id));
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }
        if filter.pending_correction {
            sql.push_str(
                " AND JSON_UNQUOTE(JSON_EXTRACT(correction_request, '$.status')) = 'pending'",
            );
        }
        if filter.pending_leave {
            sql.push_str(" AND JSON_UNQUOTE(JSON_EXTRACT(leave_request, '$.status')) = 'pending'");
        }
        sql.push_str(" ORDER BY date, employee_id");

        let mut query = sqlx::query_as::<_, AttendanceRow>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Date(d) => query.bind(d),
                FilterValue::Str(s) => query.bind(s),
            };
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect()
    }
}

/* =========================
Meetings
========================= */

const MEETING_COLUMNS: &str = "id, title, description, organizer, start_time, end_time, \
    location, meeting_link, status, minutes, created_at, version";

#[derive(FromRow)]
struct MeetingRow {
    id: u64,
    title: String,
    description: String,
    organizer: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    location: String,
    meeting_link: Option<String>,
    status: String,
    minutes: Option<Json<MeetingMinutes>>,
    created_at: DateTime<Utc>,
    version: u32,
}

#[derive(FromRow)]
struct ParticipantRow {
    meeting_id: u64,
    account_id: u64,
    status: String,
}

impl MeetingRow {
    fn into_meeting(self, participants: Vec<Participant>) -> StoreResult<Meeting> {
        Ok(Meeting {
            id: self.id,
            title: self.title,
            description: self.description,
            organizer: self.organizer,
            participants,
            start_time: self.start_time,
            end_time: self.end_time,
            location: self.location,
            meeting_link: self.meeting_link,
            status: parse("meetings.status", &self.status)?,
            minutes: self.minutes.map(|Json(m)| m),
            created_at: self.created_at,
            version: self.version,
        })
    }
}

pub struct MySqlMeetingStore {
    pool: MySqlPool,
}

impl MySqlMeetingStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn participants_of(
        &self,
        meeting_ids: &[MeetingId],
    ) -> StoreResult<HashMap<MeetingId, Vec<Participant>>> {
        let mut grouped: HashMap<MeetingId, Vec<Participant>> = HashMap::new();
        if meeting_ids.is_empty() {
            return Ok(grouped);
        }

        let mut builder = QueryBuilder::<MySql>::new(
            "SELECT meeting_id, account_id, status FROM meeting_participants WHERE meeting_id IN (",
        );
        let mut ids = builder.separated(", ");
        for id in meeting_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY meeting_id, position");

        let rows: Vec<ParticipantRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        for row in rows {
            grouped.entry(row.meeting_id).or_default().push(Participant {
                account_id: row.account_id,
                status: parse("meeting_participants.status", &row.status)?,
            });
        }
        Ok(grouped)
    }

    async fn write_participants(
        tx: &mut sqlx::Transaction<'_, MySql>,
        meeting_id: MeetingId,
        participants: &[Participant],
    ) -> StoreResult<()> {
        for (position, participant) in participants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO meeting_participants (meeting_id, account_id, status, position)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(meeting_id)
            .bind(participant.account_id)
            .bind(participant.status.as_ref())
            .bind(position as u32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn hydrate(&self, rows: Vec<MeetingRow>) -> StoreResult<Vec<Meeting>> {
        let ids: Vec<MeetingId> = rows.iter().map(|r| r.id).collect();
        let mut participants = self.participants_of(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let list = participants.remove(&row.id).unwrap_or_default();
                row.into_meeting(list)
            })
            .collect()
    }
}

#[async_trait]
impl MeetingStore for MySqlMeetingStore {
    async fn insert(&self, mut meeting: Meeting) -> StoreResult<Meeting> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO meetings
                (title, description, organizer, start_time, end_time, location,
                 meeting_link, status, minutes, created_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&meeting.title)
        .bind(&meeting.description)
        .bind(meeting.organizer)
        .bind(meeting.start_time)
        .bind(meeting.end_time)
        .bind(&meeting.location)
        .bind(&meeting.meeting_link)
        .bind(meeting.status.as_ref())
        .bind(meeting.minutes.as_ref().map(Json))
        .bind(meeting.created_at)
        .execute(&mut *tx)
        .await?;

        meeting.id = result.last_insert_id();
        meeting.version = 1;
        Self::write_participants(&mut tx, meeting.id, &meeting.participants).await?;
        tx.commit().await?;
        Ok(meeting)
    }

    async fn get(&self, id: MeetingId) -> StoreResult<Option<Meeting>> {
        let row = sqlx::query_as::<_, MeetingRow>(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update(&self, meeting: &Meeting) -> StoreResult<Option<Meeting>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE meetings
            SET title = ?,
                description = ?,
                start_time = ?,
                end_time = ?,
                location = ?,
                meeting_link = ?,
                status = ?,
                minutes = ?,
                version = version + 1
            WHERE id = ?
            AND version = ?
            "#,
        )
        .bind(&meeting.title)
        .bind(&meeting.description)
        .bind(meeting.start_time)
        .bind(meeting.end_time)
        .bind(&meeting.location)
        .bind(&meeting.meeting_link)
        .bind(meeting.status.as_ref())
        .bind(meeting.minutes.as_ref().map(Json))
        .bind(meeting.id)
        .bind(meeting.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM meeting_participants WHERE meeting_id = ?")
            .bind(meeting.id)
            .execute(&mut *tx)
            .await?;
        Self::write_participants(&mut tx, meeting.id, &meeting.participants).await?;
        tx.commit().await?;

        self.get(meeting.id).await
    }

    async fn delete(&self, id: MeetingId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM meetings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, participant: Option<AccountId>) -> StoreResult<Vec<Meeting>> {
        let rows = match participant {
            Some(account_id) => {
                sqlx::query_as::<_, MeetingRow>(&format!(
                    r#"
                    SELECT {MEETING_COLUMNS} FROM meetings m
                    WHERE EXISTS (
                        SELECT 1 FROM meeting_participants p
                        WHERE p.meeting_id = m.id AND p.account_id = ?
                    )
                    ORDER BY start_time DESC
                    "#
                ))
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MeetingRow>(&format!(
                    "SELECT {MEETING_COLUMNS} FROM meetings ORDER BY start_time DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        self.hydrate(rows).await
    }
}

/* =========================
Notifications
========================= */

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, title, message, kind, audience_role, metadata, is_read, created_at";

#[derive(FromRow)]
struct NotificationRow {
    id: u64,
    recipient_id: u64,
    title: String,
    message: String,
    kind: String,
    audience_role: String,
    metadata: Json<Value>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> StoreResult<Self> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            title: row.title,
            message: row.message,
            kind: parse("notifications.kind", &row.kind)?,
            audience_role: parse("notifications.audience_role", &row.audience_role)?,
            metadata: row.metadata.0,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

pub struct MySqlNotificationStore {
    pool: MySqlPool,
}

impl MySqlNotificationStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for MySqlNotificationStore {
    async fn insert(&self, notification: NewNotification) -> StoreResult<Notification> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (recipient_id, title, message, kind, audience_role, metadata, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, FALSE, ?)
            "#,
        )
        .bind(notification.recipient_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_ref())
        .bind(notification.audience_role.as_ref())
        .bind(Json(&notification.metadata))
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id: result.last_insert_id(),
            recipient_id: notification.recipient_id,
            title: notification.title,
            message: notification.message,
            kind: notification.kind,
            audience_role: notification.audience_role,
            metadata: notification.metadata,
            is_read: false,
            created_at: notification.created_at,
        })
    }

    async fn list(
        &self,
        recipient: AccountId,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Notification>, u64)> {
        let where_sql = if unread_only {
            " WHERE recipient_id = ? AND is_read = FALSE"
        } else {
            " WHERE recipient_id = ?"
        };

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM notifications{where_sql}"
        ))
        .bind(recipient)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            {where_sql}
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(recipient)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let page = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((page, total.max(0) as u64))
    }

    async fn unread_count(&self, recipient: AccountId) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE",
        )
        .bind(recipient)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn set_read(
        &self,
        id: NotificationId,
        recipient: AccountId,
        is_read: bool,
    ) -> StoreResult<Option<Notification>> {
        // rows_affected is 0 for a no-op flip, so re-read instead of trusting it
        sqlx::query("UPDATE notifications SET is_read = ? WHERE id = ? AND recipient_id = ?")
            .bind(is_read)
            .bind(id)
            .bind(recipient)
            .execute(&self.pool)
            .await?;

        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ? AND recipient_id = ?"
        ))
        .bind(id)
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await?
        .map(Notification::try_from)
        .transpose()
    }

    async fn mark_all_read(&self, recipient: AccountId) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE",
        )
        .bind(recipient)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: NotificationId, recipient: AccountId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(id)
            .bind(recipient)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[NotificationId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::<MySql>::new("DELETE FROM notifications WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
