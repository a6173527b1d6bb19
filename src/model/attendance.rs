use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::account::AccountId;

pub type RecordId = u64;

pub const DEFAULT_CHECK_IN_LOCATION: &str = "Office";

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Leave,
    HalfDay,
    WorkFromHome,
}

impl AttendanceStatus {
    /// Present for counting purposes: on time or late.
    pub fn counts_as_present(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Casual,
    Vacation,
    Emergency,
    Unpaid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CorrectionRequest {
    pub requested_by: AccountId,
    pub reason: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub proposed_check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub proposed_check_out: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    #[schema(value_type = String, format = "date-time")]
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<AccountId>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveRequest {
    pub leave_type: LeaveType,
    pub reason: String,
    pub status: RequestStatus,
    #[schema(value_type = String, format = "date-time")]
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<AccountId>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

/// One employee's attendance for one UTC calendar day.
///
/// `(employee_id, date)` is unique. `work_hours` is derived from the two
/// timestamps and must be refreshed with [`AttendanceRecord::recompute_work_hours`]
/// whenever either of them changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub employee_id: AccountId,
    #[schema(value_type = String, format = "date", example = "2026-01-05")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_location: String,
    pub check_out_location: Option<String>,
    pub work_hours: f64,
    pub status: AttendanceStatus,
    pub is_late: bool,
    pub late_by_minutes: i64,
    pub notes: Option<String>,
    pub correction_request: Option<CorrectionRequest>,
    pub leave_request: Option<LeaveRequest>,
    /// Optimistic concurrency token, bumped by the store on every update.
    #[serde(skip)]
    pub version: u32,
}

impl AttendanceRecord {
    pub fn new(employee_id: AccountId, date: NaiveDate, status: AttendanceStatus) -> Self {
        Self {
            id: 0,
            employee_id,
            date,
            check_in_time: None,
            check_out_time: None,
            check_in_location: DEFAULT_CHECK_IN_LOCATION.to_string(),
            check_out_location: None,
            work_hours: 0.0,
            status,
            is_late: false,
            late_by_minutes: 0,
            notes: None,
            correction_request: None,
            leave_request: None,
            version: 0,
        }
    }

    pub fn recompute_work_hours(&mut self) {
        self.work_hours = match (self.check_in_time, self.check_out_time) {
            (Some(check_in), Some(check_out)) => work_hours(check_in, check_out),
            _ => 0.0,
        };
    }

    pub fn has_pending_correction(&self) -> bool {
        self.correction_request
            .as_ref()
            .is_some_and(|c| c.status == RequestStatus::Pending)
    }

    pub fn has_pending_leave(&self) -> bool {
        self.leave_request
            .as_ref()
            .is_some_and(|l| l.status == RequestStatus::Pending)
    }
}

/// Hours between two instants, rounded to 2 decimals.
pub fn work_hours(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    let hours = (check_out - check_in).num_milliseconds() as f64 / 3_600_000.0;
    round2(hours)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn work_hours_round_to_two_decimals() {
        assert_eq!(work_hours(at(9, 15), at(17, 15)), 8.0);
        assert_eq!(work_hours(at(9, 0), at(9, 20)), 0.33);
        assert_eq!(work_hours(at(9, 0), at(9, 50)), 0.83);
    }

    #[test]
    fn work_hours_stay_zero_until_both_timestamps_exist() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut record = AttendanceRecord::new(1, date, AttendanceStatus::Present);
        record.check_in_time = Some(at(9, 0));
        record.recompute_work_hours();
        assert_eq!(record.work_hours, 0.0);

        record.check_out_time = Some(at(12, 30));
        record.recompute_work_hours();
        assert_eq!(record.work_hours, 3.5);
    }

    #[test]
    fn statuses_use_kebab_case_names() {
        assert_eq!(AttendanceStatus::WorkFromHome.to_string(), "work-from-home");
        assert_eq!(
            serde_json::to_value(AttendanceStatus::HalfDay).unwrap(),
            serde_json::json!("half-day")
        );
    }
}
