use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{
    MAX_WRITE_ATTEMPTS, ServiceResult,
    notification::{NotificationEvent, NotificationFanout},
};
use crate::{
    clock::Clock,
    config::AttendancePolicy,
    error::{ConflictError, ServiceError, UnauthorizedError},
    model::{
        account::{Account, AccountId},
        attendance::{
            AttendanceRecord, AttendanceStatus, CorrectionRequest, LeaveRequest, LeaveType,
            RecordId, RequestStatus,
        },
        notification::NotificationKind,
        role::Role,
    },
    store::{AccountStore, AttendanceFilter, AttendanceStore, StoreError},
};

/// Longest leave range accepted in one request.
const MAX_LEAVE_DAYS: i64 = 366;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "date": "2026-03-02",
    "reason": "Badge reader was down",
    "proposed_check_in": "2026-03-02T09:00:00Z",
    "proposed_check_out": "2026-03-02T17:30:00Z"
}))]
pub struct CorrectionInput {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub reason: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub proposed_check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub proposed_check_out: Option<DateTime<Utc>>,
}

/// Admin entry for an employee who could not check in themselves.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "employee_id": 7,
    "date": "2026-03-02",
    "check_in_time": "2026-03-02T08:58:00Z",
    "check_in_location": "Client site",
    "status": "work-from-home"
}))]
pub struct MarkInput {
    pub employee_id: AccountId,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    /// Now for today, the start of the working day for other dates.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_in_location: Option<String>,
    /// Present or late from the check-in time when omitted.
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "start_date": "2026-03-09",
    "end_date": "2026-03-11",
    "leave_type": "vacation",
    "reason": "Family trip"
}))]
pub struct LeaveInput {
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    /// Single-day leave when omitted.
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub leave_type: LeaveType,
    pub reason: String,
}

/// Owns attendance records: one per employee per UTC day.
///
/// Writes are compare-and-set on the record version. A missing day is
/// created through an insert that the store rejects as `Duplicate` when
/// another writer created it first, after which the write is retried against
/// the winner's record.
pub struct AttendanceLedger {
    pub(super) records: Arc<dyn AttendanceStore>,
    pub(super) accounts: Arc<dyn AccountStore>,
    fanout: Arc<NotificationFanout>,
    pub(super) clock: Arc<dyn Clock>,
    policy: AttendancePolicy,
}

impl AttendanceLedger {
    pub fn new(
        records: Arc<dyn AttendanceStore>,
        accounts: Arc<dyn AccountStore>,
        fanout: Arc<NotificationFanout>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
    ) -> Self {
        Self {
            records,
            accounts,
            fanout,
            clock,
            policy,
        }
    }

    #[tracing::instrument(skip(self, location))]
    pub async fn check_in(
        &self,
        employee_id: AccountId,
        at: Option<DateTime<Utc>>,
        location: Option<String>,
    ) -> ServiceResult<AttendanceRecord> {
        let employee = self.employee(employee_id).await?;
        let at = at.unwrap_or_else(|| self.clock.now());
        let minutes_late = self.policy.minutes_late(at);

        let record = self
            .write_day(employee_id, at.date_naive(), |record| {
                if record.check_in_time.is_some() {
                    return Err(ConflictError::AlreadyCheckedIn.into());
                }
                record.check_in_time = Some(at);
                if let Some(location) = location.as_ref().filter(|l| !l.trim().is_empty()) {
                    record.check_in_location = location.clone();
                }
                record.is_late = minutes_late.is_some();
                record.late_by_minutes = minutes_late.unwrap_or(0);
                record.status = if record.is_late {
                    AttendanceStatus::Late
                } else {
                    AttendanceStatus::Present
                };
                record.recompute_work_hours();
                Ok(())
            })
            .await?;
        tracing::info!(record_id = record.id, is_late = record.is_late, "checked in");

        self.tell_admins(
            &record,
            "check-in",
            "Employee Check-In",
            format!(
                "{} checked in at {}{}",
                employee.name,
                at.format("%H:%M"),
                if record.is_late { " (Late)" } else { "" }
            ),
        )
        .await;
        Ok(record)
    }

    #[tracing::instrument(skip(self, location))]
    pub async fn check_out(
        &self,
        employee_id: AccountId,
        at: Option<DateTime<Utc>>,
        location: Option<String>,
    ) -> ServiceResult<AttendanceRecord> {
        let employee = self.employee(employee_id).await?;
        let at = at.unwrap_or_else(|| self.clock.now());
        let date = at.date_naive();

        let mut saved = None;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut record = self
                .records
                .find(employee_id, date)
                .await?
                .ok_or(ConflictError::NoCheckInFound)?;
            let check_in = record.check_in_time.ok_or(ConflictError::NoCheckInFound)?;
            if record.check_out_time.is_some() {
                return Err(ConflictError::AlreadyCheckedOut.into());
            }
            if at < check_in {
                return Err(ServiceError::invalid("check-out cannot be earlier than check-in"));
            }
            record.check_out_time = Some(at);
            record.check_out_location = location.clone().filter(|l| !l.trim().is_empty());
            record.recompute_work_hours();

            if let Some(updated) = self.records.update(&record).await? {
                saved = Some(updated);
                break;
            }
            tracing::debug!(employee_id, %date, "check-out raced, retrying");
        }
        let record = saved.ok_or(StoreError::Contention)?;
        tracing::info!(record_id = record.id, work_hours = record.work_hours, "checked out");

        self.tell_admins(
            &record,
            "check-out",
            "Employee Check-Out",
            format!(
                "{} checked out at {}. Total hours: {:.2}",
                employee.name,
                at.format("%H:%M"),
                record.work_hours
            ),
        )
        .await;
        Ok(record)
    }

    #[tracing::instrument(skip(self, input), fields(employee_id = input.employee_id, date = %input.date))]
    pub async fn mark_attendance(
        &self,
        admin_id: AccountId,
        input: MarkInput,
    ) -> ServiceResult<AttendanceRecord> {
        let employee = self.employee(input.employee_id).await?;
        let check_in = match input.check_in_time {
            Some(at) => at,
            None if input.date == self.clock.today() => self.clock.now(),
            None => input.date.and_time(self.policy.workday_start).and_utc(),
        };
        if check_in.date_naive() != input.date {
            return Err(ServiceError::invalid("check-in time must fall on the marked date"));
        }
        if let Some(status) = input.status {
            if !matches!(
                status,
                AttendanceStatus::Present
                    | AttendanceStatus::Late
                    | AttendanceStatus::HalfDay
                    | AttendanceStatus::WorkFromHome
            ) {
                return Err(ServiceError::invalid(format!(
                    "attendance cannot be marked as {status}"
                )));
            }
        }
        let minutes_late = self.policy.minutes_late(check_in);

        let record = self
            .write_day(employee.id, input.date, |record| {
                if record.check_in_time.is_some() {
                    return Err(ConflictError::AlreadyMarked.into());
                }
                record.check_in_time = Some(check_in);
                if let Some(location) = input.check_in_location.as_ref().filter(|l| !l.trim().is_empty()) {
                    record.check_in_location = location.clone();
                }
                record.is_late = minutes_late.is_some();
                record.late_by_minutes = minutes_late.unwrap_or(0);
                let status = input.status.unwrap_or_else(|| status_from_clock(record));
                record.status = status;
                record.notes = Some(format!("Marked by admin {admin_id}"));
                record.recompute_work_hours();
                Ok(())
            })
            .await?;
        tracing::info!(record_id = record.id, admin_id, status = %record.status, "attendance marked");

        self.fanout
            .broadcast(
                Role::Admin,
                "attendance-marked",
                json!({
                    "employee_id": employee.id,
                    "employee_name": employee.name,
                    "check_in": record.check_in_time,
                    "status": record.status,
                    "date": record.date,
                    "location": record.check_in_location,
                }),
            )
            .await;
        self.tell_employee(
            &record,
            "attendance-marked",
            "Attendance Marked",
            format!("An admin marked your attendance for {} as {}", record.date, record.status),
        )
        .await;
        Ok(record)
    }

    /// Last request wins: a new request replaces whatever correction the
    /// record carried before.
    #[tracing::instrument(skip(self, input), fields(date = %input.date))]
    pub async fn request_correction(
        &self,
        employee_id: AccountId,
        input: CorrectionInput,
    ) -> ServiceResult<AttendanceRecord> {
        let employee = self.employee(employee_id).await?;
        if input.reason.trim().is_empty() {
            return Err(ServiceError::invalid("reason is required"));
        }
        if let (Some(check_in), Some(check_out)) = (input.proposed_check_in, input.proposed_check_out)
        {
            if check_out < check_in {
                return Err(ServiceError::invalid(
                    "proposed check-out cannot be earlier than proposed check-in",
                ));
            }
        }

        let requested_at = self.clock.now();
        let record = self
            .write_day(employee_id, input.date, |record| {
                record.correction_request = Some(CorrectionRequest {
                    requested_by: employee_id,
                    reason: input.reason.clone(),
                    proposed_check_in: input.proposed_check_in,
                    proposed_check_out: input.proposed_check_out,
                    status: RequestStatus::Pending,
                    requested_at,
                    approved_by: None,
                    approved_at: None,
                    admin_notes: None,
                });
                Ok(())
            })
            .await?;

        self.tell_admins(
            &record,
            "correction-requested",
            "Attendance Correction Request",
            format!("{} requested attendance correction for {}", employee.name, record.date),
        )
        .await;
        Ok(record)
    }

    /// Applies the proposed times, then refreshes hours, lateness and status.
    #[tracing::instrument(skip(self, notes))]
    pub async fn approve_correction(
        &self,
        record_id: RecordId,
        admin_id: AccountId,
        notes: Option<String>,
    ) -> ServiceResult<AttendanceRecord> {
        let decided_at = self.clock.now();
        let policy = self.policy;
        let record = self
            .write_record(record_id, |record| {
                let request = record
                    .correction_request
                    .as_ref()
                    .filter(|c| c.status == RequestStatus::Pending)
                    .ok_or(ConflictError::NoPendingCorrection)?;

                let check_in = request.proposed_check_in.or(record.check_in_time);
                let check_out = request.proposed_check_out.or(record.check_out_time);
                if let (Some(i), Some(o)) = (check_in, check_out) {
                    if o < i {
                        return Err(ServiceError::invalid(
                            "corrected check-out would be earlier than check-in",
                        ));
                    }
                }
                record.check_in_time = check_in;
                record.check_out_time = check_out;
                record.recompute_work_hours();

                if let Some(check_in) = record.check_in_time {
                    let late = policy.minutes_late(check_in);
                    record.is_late = late.is_some();
                    record.late_by_minutes = late.unwrap_or(0);
                    if matches!(
                        record.status,
                        AttendanceStatus::Absent | AttendanceStatus::Present | AttendanceStatus::Late
                    ) {
                        record.status = if record.is_late {
                            AttendanceStatus::Late
                        } else {
                            AttendanceStatus::Present
                        };
                    }
                }

                if let Some(request) = record.correction_request.as_mut() {
                    request.status = RequestStatus::Approved;
                    request.approved_by = Some(admin_id);
                    request.approved_at = Some(decided_at);
                    request.admin_notes = notes.clone();
                }
                Ok(())
            })
            .await?;

        self.tell_employee(
            &record,
            "correction-approved",
            "Attendance Correction Approved",
            format!("Your attendance correction for {} was approved", record.date),
        )
        .await;
        Ok(record)
    }

    /// Leaves the record untouched apart from the request itself.
    #[tracing::instrument(skip(self, notes))]
    pub async fn reject_correction(
        &self,
        record_id: RecordId,
        admin_id: AccountId,
        notes: String,
    ) -> ServiceResult<AttendanceRecord> {
        if notes.trim().is_empty() {
            return Err(ServiceError::invalid("a reason for the rejection is required"));
        }
        let decided_at = self.clock.now();
        let record = self
            .write_record(record_id, |record| {
                let request = record
                    .correction_request
                    .as_mut()
                    .filter(|c| c.status == RequestStatus::Pending)
                    .ok_or(ConflictError::NoPendingCorrection)?;
                request.status = RequestStatus::Rejected;
                request.approved_by = Some(admin_id);
                request.approved_at = Some(decided_at);
                request.admin_notes = Some(notes.clone());
                Ok(())
            })
            .await?;

        self.tell_employee(
            &record,
            "correction-rejected",
            "Attendance Correction Rejected",
            format!("Your attendance correction for {} was rejected: {}", record.date, notes),
        )
        .await;
        Ok(record)
    }

    /// One record per day of the inclusive range, each marked `leave`.
    #[tracing::instrument(skip(self, input), fields(start = %input.start_date))]
    pub async fn request_leave(
        &self,
        employee_id: AccountId,
        input: LeaveInput,
    ) -> ServiceResult<Vec<AttendanceRecord>> {
        let employee = self.employee(employee_id).await?;
        let start = input.start_date;
        let end = input.end_date.unwrap_or(start);
        if input.reason.trim().is_empty() {
            return Err(ServiceError::invalid("reason is required"));
        }
        if end < start {
            return Err(ServiceError::invalid("leave cannot end before it starts"));
        }
        if (end - start).num_days() >= MAX_LEAVE_DAYS {
            return Err(ServiceError::invalid(format!(
                "leave cannot span more than {MAX_LEAVE_DAYS} days"
            )));
        }

        let overlapping = self
            .records
            .query(&AttendanceFilter {
                employee_id: Some(employee_id),
                from: Some(start),
                to: Some(end),
                pending_leave: true,
                ..Default::default()
            })
            .await?;
        if !overlapping.is_empty() {
            return Err(ConflictError::OverlappingLeaveRequest.into());
        }

        let requested_at = self.clock.now();
        let mut written: Vec<(AttendanceRecord, Option<Prior>)> = Vec::new();
        for day in start.iter_days().take_while(|d| *d <= end) {
            let mut prior = None;
            let outcome = self
                .write_day(employee_id, day, |record| {
                    // a concurrent request may have landed since the range check
                    if record.has_pending_leave() {
                        return Err(ConflictError::OverlappingLeaveRequest.into());
                    }
                    prior = (record.id != 0).then(|| Prior {
                        leave_request: record.leave_request.clone(),
                        status: record.status,
                    });
                    record.leave_request = Some(LeaveRequest {
                        leave_type: input.leave_type,
                        reason: input.reason.clone(),
                        status: RequestStatus::Pending,
                        requested_at,
                        approved_by: None,
                        approved_at: None,
                        admin_notes: None,
                    });
                    record.status = AttendanceStatus::Leave;
                    Ok(())
                })
                .await;
            match outcome {
                Ok(record) => written.push((record, prior)),
                Err(e) => {
                    tracing::warn!(%day, error = %e, undo = written.len(), "leave request failed part way");
                    self.undo_leave(written, requested_at).await;
                    return Err(e);
                }
            }
        }
        let records: Vec<AttendanceRecord> = written.into_iter().map(|(record, _)| record).collect();
        tracing::info!(days = records.len(), "leave requested");

        if let Some(first) = records.first() {
            self.tell_admins(
                first,
                "leave-requested",
                "Leave Request",
                format!(
                    "{} requested {} leave from {} to {}",
                    employee.name, input.leave_type, start, end
                ),
            )
            .await;
        }
        Ok(records)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn approve_leave(
        &self,
        record_id: RecordId,
        admin_id: AccountId,
        notes: Option<String>,
    ) -> ServiceResult<AttendanceRecord> {
        let decided_at = self.clock.now();
        let record = self
            .write_record(record_id, |record| {
                let request = record
                    .leave_request
                    .as_mut()
                    .filter(|l| l.status == RequestStatus::Pending)
                    .ok_or(ConflictError::NoPendingLeave)?;
                request.status = RequestStatus::Approved;
                request.approved_by = Some(admin_id);
                request.approved_at = Some(decided_at);
                request.admin_notes = notes.clone();
                record.status = AttendanceStatus::Leave;
                Ok(())
            })
            .await?;

        self.tell_employee(
            &record,
            "leave-approved",
            "Leave Approved",
            format!("Your leave on {} was approved", record.date),
        )
        .await;
        Ok(record)
    }

    /// The day falls back to what the clock data says: present or late when
    /// there is a check-in, absent otherwise.
    #[tracing::instrument(skip(self, notes))]
    pub async fn reject_leave(
        &self,
        record_id: RecordId,
        admin_id: AccountId,
        notes: String,
    ) -> ServiceResult<AttendanceRecord> {
        if notes.trim().is_empty() {
            return Err(ServiceError::invalid("a reason for the rejection is required"));
        }
        let decided_at = self.clock.now();
        let record = self
            .write_record(record_id, |record| {
                let request = record
                    .leave_request
                    .as_mut()
                    .filter(|l| l.status == RequestStatus::Pending)
                    .ok_or(ConflictError::NoPendingLeave)?;
                request.status = RequestStatus::Rejected;
                request.approved_by = Some(admin_id);
                request.approved_at = Some(decided_at);
                request.admin_notes = Some(notes.clone());
                record.status = status_from_clock(record);
                Ok(())
            })
            .await?;

        self.tell_employee(
            &record,
            "leave-rejected",
            "Leave Rejected",
            format!("Your leave on {} was rejected: {}", record.date, notes),
        )
        .await;
        Ok(record)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn today_status(&self, employee_id: AccountId) -> ServiceResult<Option<AttendanceRecord>> {
        Ok(self.records.find(employee_id, self.clock.today()).await?)
    }

    pub async fn get(&self, record_id: RecordId) -> ServiceResult<AttendanceRecord> {
        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("attendance record", record_id))
    }

    pub async fn records(&self, filter: &AttendanceFilter) -> ServiceResult<Vec<AttendanceRecord>> {
        Ok(self.records.query(filter).await?)
    }

    pub async fn pending_corrections(&self) -> ServiceResult<Vec<AttendanceRecord>> {
        self.records(&AttendanceFilter {
            pending_correction: true,
            ..Default::default()
        })
        .await
    }

    pub async fn pending_leaves(&self) -> ServiceResult<Vec<AttendanceRecord>> {
        self.records(&AttendanceFilter {
            pending_leave: true,
            ..Default::default()
        })
        .await
    }

    /// Every record of the employee that carries a correction request.
    pub async fn corrections_of(&self, employee_id: AccountId) -> ServiceResult<Vec<AttendanceRecord>> {
        let mut records = self
            .records(&AttendanceFilter {
                employee_id: Some(employee_id),
                ..Default::default()
            })
            .await?;
        records.retain(|r| r.correction_request.is_some());
        Ok(records)
    }

    pub async fn leaves_of(&self, employee_id: AccountId) -> ServiceResult<Vec<AttendanceRecord>> {
        let mut records = self
            .records(&AttendanceFilter {
                employee_id: Some(employee_id),
                ..Default::default()
            })
            .await?;
        records.retain(|r| r.leave_request.is_some());
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_record(&self, record_id: RecordId) -> ServiceResult<()> {
        if !self.records.delete(record_id).await? {
            return Err(ServiceError::not_found("attendance record", record_id));
        }
        tracing::info!(record_id, "attendance record deleted");
        Ok(())
    }

    pub(super) async fn employee(&self, employee_id: AccountId) -> ServiceResult<Account> {
        let account = self
            .accounts
            .account(employee_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("employee", employee_id))?;
        if account.role != Role::Employee {
            return Err(UnauthorizedError::RoleNotAllowed.into());
        }
        if !account.is_active() {
            return Err(UnauthorizedError::InactiveAccount.into());
        }
        Ok(account)
    }

    /// Read-modify-write of the `(employee_id, date)` record, creating it as
    /// an `absent` placeholder when the day has none yet.
    async fn write_day<F>(
        &self,
        employee_id: AccountId,
        date: NaiveDate,
        mut apply: F,
    ) -> ServiceResult<AttendanceRecord>
    where
        F: FnMut(&mut AttendanceRecord) -> ServiceResult<()> + Send,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.records.find(employee_id, date).await? {
                Some(mut record) => {
                    apply(&mut record)?;
                    if let Some(saved) = self.records.update(&record).await? {
                        return Ok(saved);
                    }
                }
                None => {
                    let mut record = AttendanceRecord::new(employee_id, date, AttendanceStatus::Absent);
                    apply(&mut record)?;
                    match self.records.insert(record).await {
                        Ok(saved) => return Ok(saved),
                        Err(StoreError::Duplicate) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            tracing::debug!(employee_id, %date, "attendance write raced, retrying");
        }
        Err(StoreError::Contention.into())
    }

    /// Reverts the days a failed leave request already wrote, newest first.
    /// Placeholders it created are dropped if nobody touched them since;
    /// other days get their previous leave and status back, provided they
    /// still carry this request.
    async fn undo_leave(&self, written: Vec<(AttendanceRecord, Option<Prior>)>, requested_at: DateTime<Utc>) {
        for (record, prior) in written.into_iter().rev() {
            let undone = match prior {
                None => self.drop_placeholder(&record).await,
                Some(prior) => self
                    .write_record(record.id, |r| {
                        let ours = r
                            .leave_request
                            .as_ref()
                            .is_some_and(|l| l.requested_at == requested_at && l.status == RequestStatus::Pending);
                        if ours {
                            r.leave_request = prior.leave_request.clone();
                            r.status = prior.status;
                        }
                        Ok(())
                    })
                    .await
                    .map(drop),
            };
            if let Err(e) = undone {
                tracing::error!(record_id = record.id, error = %e, "failed to undo partial leave request");
            }
        }
    }

    async fn drop_placeholder(&self, created: &AttendanceRecord) -> ServiceResult<()> {
        match self.records.get(created.id).await? {
            Some(current) if current.version == created.version => {
                self.records.delete(created.id).await?;
            }
            Some(_) => {
                self.write_record(created.id, |r| {
                    if r.has_pending_leave() {
                        r.leave_request = None;
                        r.status = status_from_clock(r);
                    }
                    Ok(())
                })
                .await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn write_record<F>(&self, record_id: RecordId, mut apply: F) -> ServiceResult<AttendanceRecord>
    where
        F: FnMut(&mut AttendanceRecord) -> ServiceResult<()> + Send,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut record = self.get(record_id).await?;
            apply(&mut record)?;
            if let Some(saved) = self.records.update(&record).await? {
                return Ok(saved);
            }
            tracing::debug!(record_id, "attendance write raced, retrying");
        }
        Err(StoreError::Contention.into())
    }

    async fn tell_admins(&self, record: &AttendanceRecord, action: &str, title: &str, message: String) {
        let admins = self.fanout.admins().await;
        self.fanout
            .notify(
                NotificationEvent::new(NotificationKind::Attendance, title, message)
                    .to_all(admins)
                    .with_metadata(metadata(record, action)),
            )
            .await;
    }

    async fn tell_employee(&self, record: &AttendanceRecord, action: &str, title: &str, message: String) {
        self.fanout
            .notify(
                NotificationEvent::new(NotificationKind::Attendance, title, message)
                    .to(record.employee_id)
                    .with_metadata(metadata(record, action)),
            )
            .await;
    }
}

/// Present or late when there is a check-in, absent otherwise.
fn status_from_clock(record: &AttendanceRecord) -> AttendanceStatus {
    match (record.check_in_time, record.is_late) {
        (Some(_), true) => AttendanceStatus::Late,
        (Some(_), false) => AttendanceStatus::Present,
        (None, _) => AttendanceStatus::Absent,
    }
}

/// What a leave request overwrote on a day that already had a record.
struct Prior {
    leave_request: Option<LeaveRequest>,
    status: AttendanceStatus,
}

fn metadata(record: &AttendanceRecord, action: &str) -> serde_json::Value {
    json!({
        "record_id": record.id,
        "employee_id": record.employee_id,
        "date": record.date,
        "action": action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{Harness, at};
    use crate::store::{StoreResult, Stores, memory::MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn lateness_follows_the_grace_period() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let e1 = h.account("E One", Role::Employee).await;
        let e2 = h.account("E Two", Role::Employee).await;
        let ledger = &h.services.attendance;

        let on_time = ledger.check_in(e1.id, Some(at(2026, 3, 2, 9, 5)), None).await.unwrap();
        assert!(!on_time.is_late);
        assert_eq!(on_time.status, AttendanceStatus::Present);
        assert_eq!(on_time.check_in_location, "Office");

        let late = ledger.check_in(e2.id, Some(at(2026, 3, 2, 9, 15)), None).await.unwrap();
        assert!(late.is_late);
        assert_eq!(late.late_by_minutes, 15);
        assert_eq!(late.status, AttendanceStatus::Late);

        let out = ledger.check_out(e2.id, Some(at(2026, 3, 2, 17, 15)), None).await.unwrap();
        assert_eq!(out.work_hours, 8.0);
    }

    #[tokio::test]
    async fn check_in_and_out_happen_once_per_day() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        assert!(matches!(
            ledger.check_out(emp.id, None, None).await,
            Err(ServiceError::Conflict(ConflictError::NoCheckInFound))
        ));

        let record = ledger.check_in(emp.id, None, Some("Home".into())).await.unwrap();
        assert_eq!(record.work_hours, 0.0);
        assert_eq!(record.check_in_location, "Home");
        assert!(matches!(
            ledger.check_in(emp.id, None, None).await,
            Err(ServiceError::Conflict(ConflictError::AlreadyCheckedIn))
        ));

        h.clock.advance(chrono::Duration::minutes(50));
        let out = ledger.check_out(emp.id, None, None).await.unwrap();
        assert_eq!(out.work_hours, 0.83);
        assert!(matches!(
            ledger.check_out(emp.id, None, None).await,
            Err(ServiceError::Conflict(ConflictError::AlreadyCheckedOut))
        ));

        let today = ledger.today_status(emp.id).await.unwrap().unwrap();
        assert_eq!(today.id, record.id);
    }

    #[tokio::test]
    async fn concurrent_check_ins_produce_one_record() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let emp = h.account("Eve", Role::Employee).await;

        let emp_id = emp.id;
        let mut tasks = Vec::new();
        for i in 0..8 {
            let ledger = h.services.attendance.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .check_in(emp_id, Some(at(2026, 3, 2, 9, i)), None)
                    .await
            }));
        }

        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ServiceError::Conflict(ConflictError::AlreadyCheckedIn)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);

        let records = ledger_records(&h, emp.id).await;
        assert_eq!(records.len(), 1);
    }

    async fn ledger_records(h: &Harness, employee_id: AccountId) -> Vec<AttendanceRecord> {
        h.services
            .attendance
            .records(&AttendanceFilter {
                employee_id: Some(employee_id),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn check_ins_notify_active_admins() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;

        h.services.attendance.check_in(emp.id, None, None).await.unwrap();
        assert_eq!(
            h.publisher.named("new-notification"),
            vec![format!("admin-{}", admin.id)]
        );
    }

    #[tokio::test]
    async fn approving_a_correction_twice_fails_the_second_time() {
        let h = Harness::new(at(2026, 3, 3, 8, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        let record = ledger
            .request_correction(
                emp.id,
                CorrectionInput {
                    date: day(2),
                    reason: "Forgot to check in".into(),
                    proposed_check_in: Some(at(2026, 3, 2, 9, 0)),
                    proposed_check_out: Some(at(2026, 3, 2, 17, 30)),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert!(record.has_pending_correction());
        assert_eq!(ledger.pending_corrections().await.unwrap().len(), 1);

        let approved = ledger.approve_correction(record.id, admin.id, None).await.unwrap();
        assert_eq!(approved.status, AttendanceStatus::Present);
        assert_eq!(approved.work_hours, 8.5);
        assert!(!approved.is_late);
        let request = approved.correction_request.as_ref().unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.approved_by, Some(admin.id));

        assert!(matches!(
            ledger.approve_correction(record.id, admin.id, None).await,
            Err(ServiceError::Conflict(ConflictError::NoPendingCorrection))
        ));
        assert!(ledger.pending_corrections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn late_correction_marks_the_day_late_and_rejection_keeps_times() {
        let h = Harness::new(at(2026, 3, 3, 8, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        let record = ledger
            .check_in(emp.id, Some(at(2026, 3, 3, 8, 55)), None)
            .await
            .unwrap();
        let request = |reason: &str| CorrectionInput {
            date: day(3),
            reason: reason.into(),
            proposed_check_in: Some(at(2026, 3, 3, 9, 40)),
            proposed_check_out: None,
        };

        ledger.request_correction(emp.id, request("first")).await.unwrap();
        let rejected = ledger
            .reject_correction(record.id, admin.id, "Badge logs disagree".into())
            .await
            .unwrap();
        assert_eq!(rejected.check_in_time, Some(at(2026, 3, 3, 8, 55)));
        assert!(matches!(
            ledger.reject_correction(record.id, admin.id, " ".into()).await,
            Err(ServiceError::Validation(_))
        ));

        ledger.request_correction(emp.id, request("second")).await.unwrap();
        let approved = ledger.approve_correction(record.id, admin.id, None).await.unwrap();
        assert!(approved.is_late);
        assert_eq!(approved.status, AttendanceStatus::Late);
        assert_eq!(approved.late_by_minutes, 40);
        assert_eq!(ledger.corrections_of(emp.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leave_over_n_days_writes_n_records() {
        let h = Harness::new(at(2026, 3, 1, 8, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        // an existing day inside the range is updated, not duplicated
        ledger.check_in(emp.id, Some(at(2026, 3, 10, 9, 0)), None).await.unwrap();

        let records = ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(9),
                    end_date: Some(day(12)),
                    leave_type: LeaveType::Vacation,
                    reason: "Family trip".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Leave));
        assert!(records
            .iter()
            .all(|r| r.leave_request.as_ref().unwrap().reason == "Family trip"));
        assert_eq!(ledger_records(&h, emp.id).await.len(), 4);

        let overlap = ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(12),
                    end_date: Some(day(14)),
                    leave_type: LeaveType::Sick,
                    reason: "Flu".into(),
                },
            )
            .await;
        assert!(matches!(
            overlap,
            Err(ServiceError::Conflict(ConflictError::OverlappingLeaveRequest))
        ));

        let backwards = ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(20),
                    end_date: Some(day(19)),
                    leave_type: LeaveType::Sick,
                    reason: "Flu".into(),
                },
            )
            .await;
        assert!(matches!(backwards, Err(ServiceError::Validation(_))));
    }

    /// Plants a competing pending leave on `day` the first time it is read,
    /// as if another request slipped in after the overlap check.
    struct RivalLeave {
        inner: Arc<MemoryStore>,
        day: NaiveDate,
        planted: AtomicBool,
    }

    #[async_trait]
    impl AttendanceStore for RivalLeave {
        async fn get(&self, id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
            AttendanceStore::get(self.inner.as_ref(), id).await
        }
        async fn find(&self, employee_id: AccountId, date: NaiveDate) -> StoreResult<Option<AttendanceRecord>> {
            if date == self.day && !self.planted.swap(true, Ordering::SeqCst) {
                let mut rival = AttendanceRecord::new(employee_id, date, AttendanceStatus::Leave);
                rival.leave_request = Some(LeaveRequest {
                    leave_type: LeaveType::Sick,
                    reason: "rival".into(),
                    status: RequestStatus::Pending,
                    requested_at: at(2026, 3, 1, 7, 0),
                    approved_by: None,
                    approved_at: None,
                    admin_notes: None,
                });
                AttendanceStore::insert(self.inner.as_ref(), rival).await?;
            }
            AttendanceStore::find(self.inner.as_ref(), employee_id, date).await
        }
        async fn insert(&self, record: AttendanceRecord) -> StoreResult<AttendanceRecord> {
            AttendanceStore::insert(self.inner.as_ref(), record).await
        }
        async fn update(&self, record: &AttendanceRecord) -> StoreResult<Option<AttendanceRecord>> {
            AttendanceStore::update(self.inner.as_ref(), record).await
        }
        async fn delete(&self, id: RecordId) -> StoreResult<bool> {
            AttendanceStore::delete(self.inner.as_ref(), id).await
        }
        async fn query(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
            AttendanceStore::query(self.inner.as_ref(), filter).await
        }
    }

    #[tokio::test]
    async fn leave_that_fails_part_way_leaves_no_trace() {
        let memory = Arc::new(MemoryStore::default());
        let mut stores = Stores::from_memory(memory.clone());
        stores.attendance = Arc::new(RivalLeave {
            inner: memory,
            day: day(11),
            planted: AtomicBool::new(false),
        });
        let h = Harness::with_stores(at(2026, 3, 1, 8, 0), stores);
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;
        let worked = ledger.check_in(emp.id, Some(at(2026, 3, 10, 9, 0)), None).await.unwrap();

        let result = ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(9),
                    end_date: Some(day(12)),
                    leave_type: LeaveType::Vacation,
                    reason: "Family trip".into(),
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Conflict(ConflictError::OverlappingLeaveRequest))
        ));

        // day 9 was created by the request and is gone again, day 10 is
        // back to the check-in, day 11 belongs to the rival, day 12 untouched
        let records = ledger_records(&h, emp.id).await;
        assert_eq!(records.iter().map(|r| r.date).collect::<Vec<_>>(), vec![day(10), day(11)]);
        assert_eq!(records[0].id, worked.id);
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert!(records[0].leave_request.is_none());
        assert_eq!(records[1].leave_request.as_ref().unwrap().reason, "rival");
        assert_eq!(ledger.pending_leaves().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leave_decisions_settle_the_day_status() {
        let h = Harness::new(at(2026, 3, 1, 8, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        ledger.check_in(emp.id, Some(at(2026, 3, 5, 9, 30)), None).await.unwrap();
        let records = ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(5),
                    end_date: Some(day(6)),
                    leave_type: LeaveType::Casual,
                    reason: "Errands".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(ledger.pending_leaves().await.unwrap().len(), 2);

        let rejected = ledger
            .reject_leave(records[0].id, admin.id, "Deadline week".into())
            .await
            .unwrap();
        assert_eq!(rejected.status, AttendanceStatus::Late);

        let approved = ledger.approve_leave(records[1].id, admin.id, None).await.unwrap();
        assert_eq!(approved.status, AttendanceStatus::Leave);
        assert!(matches!(
            ledger.approve_leave(records[1].id, admin.id, None).await,
            Err(ServiceError::Conflict(ConflictError::NoPendingLeave))
        ));
        assert_eq!(ledger.leaves_of(emp.id).await.unwrap().len(), 2);
        // the employee heard about both decisions
        assert_eq!(h.services.inbox.unread_count(emp.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn only_active_employees_keep_attendance() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let client = h.account("Acme", Role::Client).await;
        let gone = h
            .account_with_status("Gus", Role::Employee, crate::model::account::AccountStatus::Inactive)
            .await;
        let ledger = &h.services.attendance;

        assert!(matches!(
            ledger.check_in(client.id, None, None).await,
            Err(ServiceError::Unauthorized(UnauthorizedError::RoleNotAllowed))
        ));
        assert!(matches!(
            ledger.check_in(gone.id, None, None).await,
            Err(ServiceError::Unauthorized(UnauthorizedError::InactiveAccount))
        ));
        assert!(matches!(
            ledger.check_in(999, None, None).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn admin_marks_attendance_once_per_day() {
        let h = Harness::new(at(2026, 3, 4, 11, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;
        let mark = |date: NaiveDate, status: Option<AttendanceStatus>| MarkInput {
            employee_id: emp.id,
            date,
            check_in_time: None,
            check_in_location: None,
            status,
        };

        // past day: check-in defaults to the start of the working day
        let past = ledger.mark_attendance(admin.id, mark(day(2), None)).await.unwrap();
        assert_eq!(past.check_in_time, Some(at(2026, 3, 2, 9, 0)));
        assert_eq!(past.status, AttendanceStatus::Present);
        assert_eq!(past.notes.as_deref(), Some(format!("Marked by admin {}", admin.id).as_str()));

        // today: now, which is well past the grace period
        let today = ledger.mark_attendance(admin.id, mark(day(4), None)).await.unwrap();
        assert!(today.is_late);
        assert_eq!(today.status, AttendanceStatus::Late);

        let wfh = ledger
            .mark_attendance(admin.id, mark(day(3), Some(AttendanceStatus::WorkFromHome)))
            .await
            .unwrap();
        assert_eq!(wfh.status, AttendanceStatus::WorkFromHome);

        assert!(matches!(
            ledger.mark_attendance(admin.id, mark(day(2), None)).await,
            Err(ServiceError::Conflict(ConflictError::AlreadyMarked))
        ));
        assert!(matches!(
            ledger.mark_attendance(admin.id, mark(day(5), Some(AttendanceStatus::Leave))).await,
            Err(ServiceError::Validation(_))
        ));
        let mut elsewhere = mark(day(5), None);
        elsewhere.check_in_time = Some(at(2026, 3, 6, 9, 0));
        assert!(matches!(
            ledger.mark_attendance(admin.id, elsewhere).await,
            Err(ServiceError::Validation(_))
        ));

        assert_eq!(h.publisher.named("attendance-marked"), vec!["admin"; 3]);
        assert_eq!(h.services.inbox.unread_count(emp.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn admin_can_delete_a_record() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        let record = ledger.check_in(emp.id, None, None).await.unwrap();
        ledger.delete_record(record.id).await.unwrap();
        assert!(ledger.today_status(emp.id).await.unwrap().is_none());
        assert!(matches!(
            ledger.delete_record(record.id).await,
            Err(ServiceError::NotFound { .. })
        ));
        // the day is free again
        ledger.check_in(emp.id, None, None).await.unwrap();
    }
}
