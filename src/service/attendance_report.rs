//! Read-only aggregates over the attendance ledger. Days without a record are
//! never an error; they count as absent where the report says so.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Context;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ServiceResult, attendance::AttendanceLedger};
use crate::{
    error::ServiceError,
    model::{
        account::{Account, AccountId, AccountStatus},
        attendance::{AttendanceRecord, AttendanceStatus, round2},
        role::Role,
    },
    store::AttendanceFilter,
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub employee_id: AccountId,
    pub month: u32,
    pub year: i32,
    pub total_days: usize,
    pub present_days: usize,
    pub absent_days: usize,
    pub late_days: usize,
    pub leave_days: usize,
    pub half_days: usize,
    pub work_from_home_days: usize,
    pub total_work_hours: f64,
    pub average_work_hours: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailyReport {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub total_employees: usize,
    pub present: usize,
    pub late: usize,
    pub on_leave: usize,
    pub absent: usize,
    pub records: Vec<AttendanceRecord>,
    /// Active employees with no record for the day.
    pub not_checked_in: Vec<Account>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceReport {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub employee_id: Option<AccountId>,
    pub total_records: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub on_leave: usize,
    pub total_work_hours: f64,
    /// Present records over all records, as a percentage with 2 decimals.
    pub attendance_rate: f64,
    pub records: Vec<AttendanceRecord>,
}

/// One employee's month, as seen across the whole company.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmployeeMonth {
    pub employee_id: AccountId,
    pub name: String,
    pub email: String,
    pub total_days: usize,
    /// On time or late.
    pub present_days: usize,
    pub late_days: usize,
    pub absent_days: usize,
    pub leave_days: usize,
    pub total_work_hours: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MonthlyAttendance {
    pub month: u32,
    pub year: i32,
    /// Only employees with at least one record in the month, by account id.
    pub report: Vec<EmployeeMonth>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Flat, spreadsheet-friendly view of one record.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExportRow {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub employee_id: AccountId,
    pub employee_name: String,
    pub email: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub work_hours: f64,
    pub status: AttendanceStatus,
    pub is_late: bool,
    pub location: String,
    pub notes: String,
}

const EXPORT_COLUMNS: [&str; 11] = [
    "Date",
    "EmployeeID",
    "EmployeeName",
    "Email",
    "CheckIn",
    "CheckOut",
    "WorkHours",
    "Status",
    "IsLate",
    "Location",
    "Notes",
];

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceExport {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub total_records: usize,
    pub records: Vec<ExportRow>,
}

impl AttendanceExport {
    /// Header line first, even when there are no records.
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(EXPORT_COLUMNS)?;
        for row in &self.records {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush csv export: {}", e.error()))?;
        String::from_utf8(bytes).context("csv export is not utf-8")
    }
}

fn month_bounds(month: u32, year: i32) -> ServiceResult<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ServiceError::invalid(format!("invalid month {month}/{year}")))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ServiceError::invalid(format!("invalid month {month}/{year}")))?;
    Ok((first, last))
}

impl AttendanceLedger {
    /// Weekdays of the month up to today that have no record are counted as
    /// absent alongside records explicitly marked absent.
    pub async fn summary(
        &self,
        employee_id: AccountId,
        month: u32,
        year: i32,
    ) -> ServiceResult<AttendanceSummary> {
        self.accounts
            .account(employee_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("employee", employee_id))?;

        let (first, last) = month_bounds(month, year)?;

        let records = self
            .records(&AttendanceFilter {
                employee_id: Some(employee_id),
                from: Some(first),
                to: Some(last),
                ..Default::default()
            })
            .await?;

        let recorded: HashSet<NaiveDate> = records.iter().map(|r| r.date).collect();
        let today = self.clock.today();
        let unrecorded_weekdays = first
            .iter_days()
            .take_while(|d| *d <= last && *d <= today)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .filter(|d| !recorded.contains(d))
            .count();

        let count = |status: AttendanceStatus| records.iter().filter(|r| r.status == status).count();
        let total_work_hours: f64 = records.iter().map(|r| r.work_hours).sum();
        let with_hours = records.iter().filter(|r| r.work_hours > 0.0).count();

        Ok(AttendanceSummary {
            employee_id,
            month,
            year,
            total_days: records.len(),
            present_days: records.iter().filter(|r| r.status.counts_as_present()).count(),
            absent_days: count(AttendanceStatus::Absent) + unrecorded_weekdays,
            late_days: records.iter().filter(|r| r.is_late).count(),
            leave_days: count(AttendanceStatus::Leave),
            half_days: count(AttendanceStatus::HalfDay),
            work_from_home_days: count(AttendanceStatus::WorkFromHome),
            total_work_hours: round2(total_work_hours),
            average_work_hours: if with_hours > 0 {
                round2(total_work_hours / with_hours as f64)
            } else {
                0.0
            },
        })
    }

    /// Per-employee totals for every record in the month. Unlike `summary`,
    /// days without a record are not counted.
    pub async fn monthly_attendance(&self, month: u32, year: i32) -> ServiceResult<MonthlyAttendance> {
        let (first, last) = month_bounds(month, year)?;
        let records = self
            .records(&AttendanceFilter {
                from: Some(first),
                to: Some(last),
                ..Default::default()
            })
            .await?;
        let people = self.people().await?;

        let mut months: BTreeMap<AccountId, EmployeeMonth> = BTreeMap::new();
        for record in &records {
            let entry = months.entry(record.employee_id).or_insert_with(|| {
                let (name, email) = contact(&people, record.employee_id);
                EmployeeMonth {
                    employee_id: record.employee_id,
                    name,
                    email,
                    total_days: 0,
                    present_days: 0,
                    late_days: 0,
                    absent_days: 0,
                    leave_days: 0,
                    total_work_hours: 0.0,
                }
            });
            entry.total_days += 1;
            if record.status == AttendanceStatus::Present || record.is_late {
                entry.present_days += 1;
            }
            if record.is_late {
                entry.late_days += 1;
            }
            match record.status {
                AttendanceStatus::Absent => entry.absent_days += 1,
                AttendanceStatus::Leave => entry.leave_days += 1,
                _ => {}
            }
            entry.total_work_hours += record.work_hours;
        }

        let report = months
            .into_values()
            .map(|mut m| {
                m.total_work_hours = round2(m.total_work_hours);
                m
            })
            .collect();
        Ok(MonthlyAttendance { month, year, report })
    }

    /// Every record in the inclusive range, newest day first.
    pub async fn export(&self, from: NaiveDate, to: NaiveDate) -> ServiceResult<AttendanceExport> {
        if to < from {
            return Err(ServiceError::invalid("export range ends before it starts"));
        }
        let mut records = self
            .records(&AttendanceFilter {
                from: Some(from),
                to: Some(to),
                ..Default::default()
            })
            .await?;
        records.sort_by(|a, b| b.date.cmp(&a.date).then(a.employee_id.cmp(&b.employee_id)));
        let people = self.people().await?;

        let rows: Vec<ExportRow> = records
            .into_iter()
            .map(|r| {
                let (employee_name, email) = contact(&people, r.employee_id);
                ExportRow {
                    date: r.date,
                    employee_id: r.employee_id,
                    employee_name,
                    email,
                    check_in: r.check_in_time,
                    check_out: r.check_out_time,
                    work_hours: r.work_hours,
                    status: r.status,
                    is_late: r.is_late,
                    location: r.check_in_location,
                    notes: r.notes.unwrap_or_default(),
                }
            })
            .collect();
        tracing::info!(%from, %to, rows = rows.len(), "attendance exported");

        Ok(AttendanceExport {
            from,
            to,
            total_records: rows.len(),
            records: rows,
        })
    }

    // employees of any status; past records outlive deactivation
    async fn people(&self) -> ServiceResult<HashMap<AccountId, Account>> {
        Ok(self
            .accounts
            .accounts(Some(Role::Employee), None)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect())
    }

    pub async fn daily_report(&self, date: NaiveDate) -> ServiceResult<DailyReport> {
        let mut records = self
            .records(&AttendanceFilter {
                from: Some(date),
                to: Some(date),
                ..Default::default()
            })
            .await?;
        records.sort_by_key(|r| r.check_in_time);

        let employees = self
            .accounts
            .accounts(Some(Role::Employee), Some(AccountStatus::Active))
            .await?;
        let seen: HashSet<AccountId> = records.iter().map(|r| r.employee_id).collect();
        let not_checked_in: Vec<Account> = employees
            .iter()
            .filter(|e| !seen.contains(&e.id))
            .cloned()
            .collect();

        Ok(DailyReport {
            date,
            total_employees: employees.len(),
            present: records.iter().filter(|r| r.status.counts_as_present()).count(),
            late: records.iter().filter(|r| r.is_late).count(),
            on_leave: records
                .iter()
                .filter(|r| r.status == AttendanceStatus::Leave)
                .count(),
            absent: not_checked_in.len()
                + records
                    .iter()
                    .filter(|r| r.status == AttendanceStatus::Absent)
                    .count(),
            records,
            not_checked_in,
        })
    }

    /// Late check-ins of the day, latest first.
    pub async fn late_arrivals(&self, date: NaiveDate) -> ServiceResult<Vec<AttendanceRecord>> {
        let mut records = self
            .records(&AttendanceFilter {
                from: Some(date),
                to: Some(date),
                ..Default::default()
            })
            .await?;
        records.retain(|r| r.is_late);
        records.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));
        Ok(records)
    }

    pub async fn report(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        employee_id: Option<AccountId>,
    ) -> ServiceResult<AttendanceReport> {
        if to < from {
            return Err(ServiceError::invalid("report range ends before it starts"));
        }
        let mut records = self
            .records(&AttendanceFilter {
                employee_id,
                from: Some(from),
                to: Some(to),
                ..Default::default()
            })
            .await?;
        records.sort_by(|a, b| b.date.cmp(&a.date));

        let total = records.len();
        let present = records.iter().filter(|r| r.status.counts_as_present()).count();

        Ok(AttendanceReport {
            from,
            to,
            employee_id,
            total_records: total,
            present,
            late: records.iter().filter(|r| r.is_late).count(),
            absent: records
                .iter()
                .filter(|r| r.status == AttendanceStatus::Absent)
                .count(),
            on_leave: records
                .iter()
                .filter(|r| r.status == AttendanceStatus::Leave)
                .count(),
            total_work_hours: round2(records.iter().map(|r| r.work_hours).sum()),
            attendance_rate: if total > 0 {
                round2(present as f64 / total as f64 * 100.0)
            } else {
                0.0
            },
            records,
        })
    }
}

fn contact(people: &HashMap<AccountId, Account>, id: AccountId) -> (String, String) {
    match people.get(&id) {
        Some(a) => (a.name.clone(), a.email.clone()),
        None => ("N/A".to_string(), "N/A".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::ExportRow;
    use crate::model::attendance::{AttendanceStatus, LeaveType};
    use crate::model::role::Role;
    use crate::service::attendance::{LeaveInput, MarkInput};
    use crate::service::testing::{Harness, at};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn summary_counts_unrecorded_weekdays_as_absent() {
        // Friday evening; March 2026 starts on a Sunday
        let h = Harness::new(at(2026, 3, 6, 18, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        ledger.check_in(emp.id, Some(at(2026, 3, 2, 9, 0)), None).await.unwrap();
        ledger.check_out(emp.id, Some(at(2026, 3, 2, 17, 0)), None).await.unwrap();
        ledger.check_in(emp.id, Some(at(2026, 3, 3, 9, 30)), None).await.unwrap();
        ledger.check_out(emp.id, Some(at(2026, 3, 3, 17, 30)), None).await.unwrap();
        ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(4),
                    end_date: None,
                    leave_type: LeaveType::Sick,
                    reason: "Dentist".into(),
                },
            )
            .await
            .unwrap();

        let summary = ledger.summary(emp.id, 3, 2026).await.unwrap();
        assert_eq!(summary.total_days, 3);
        assert_eq!(summary.present_days, 2);
        assert_eq!(summary.late_days, 1);
        assert_eq!(summary.leave_days, 1);
        assert_eq!(summary.absent_days, 2);
        assert_eq!(summary.total_work_hours, 16.0);
        assert_eq!(summary.average_work_hours, 8.0);

        assert!(ledger.summary(emp.id, 13, 2026).await.is_err());
    }

    #[tokio::test]
    async fn daily_report_lists_who_has_not_checked_in() {
        let h = Harness::new(at(2026, 3, 2, 12, 0));
        let e1 = h.account("Eve", Role::Employee).await;
        let e2 = h.account("Pat", Role::Employee).await;
        h.account("Ada", Role::Admin).await;
        let ledger = &h.services.attendance;

        ledger.check_in(e1.id, Some(at(2026, 3, 2, 9, 20)), None).await.unwrap();

        let report = ledger.daily_report(day(2)).await.unwrap();
        assert_eq!(report.total_employees, 2);
        assert_eq!(report.present, 1);
        assert_eq!(report.late, 1);
        assert_eq!(report.absent, 1);
        assert_eq!(report.not_checked_in.len(), 1);
        assert_eq!(report.not_checked_in[0].id, e2.id);

        let late = ledger.late_arrivals(day(2)).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].late_by_minutes, 20);
    }

    #[tokio::test]
    async fn report_computes_attendance_rate() {
        let h = Harness::new(at(2026, 3, 6, 18, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let ledger = &h.services.attendance;

        for d in [2, 3] {
            ledger.check_in(emp.id, Some(at(2026, 3, d, 9, 0)), None).await.unwrap();
        }
        ledger
            .request_leave(
                emp.id,
                LeaveInput {
                    start_date: day(4),
                    end_date: None,
                    leave_type: LeaveType::Casual,
                    reason: "Move".into(),
                },
            )
            .await
            .unwrap();

        let report = ledger.report(day(1), day(31), Some(emp.id)).await.unwrap();
        assert_eq!(report.total_records, 3);
        assert_eq!(report.present, 2);
        assert_eq!(report.on_leave, 1);
        assert_eq!(report.attendance_rate, 66.67);
        assert_eq!(report.records[0].date, day(4));

        assert!(ledger.report(day(5), day(4), None).await.is_err());
    }

    #[tokio::test]
    async fn monthly_attendance_groups_records_by_employee() {
        let h = Harness::new(at(2026, 3, 20, 18, 0));
        let eve = h.account("Eve", Role::Employee).await;
        let pat = h.account("Pat", Role::Employee).await;
        h.account("Idle", Role::Employee).await;
        let ledger = &h.services.attendance;

        ledger.check_in(eve.id, Some(at(2026, 3, 2, 9, 0)), None).await.unwrap();
        ledger.check_out(eve.id, Some(at(2026, 3, 2, 17, 0)), None).await.unwrap();
        ledger.check_in(eve.id, Some(at(2026, 3, 3, 9, 45)), None).await.unwrap();
        ledger.check_in(pat.id, Some(at(2026, 3, 2, 8, 50)), None).await.unwrap();
        ledger
            .request_leave(
                pat.id,
                LeaveInput {
                    start_date: day(5),
                    end_date: Some(day(6)),
                    leave_type: LeaveType::Vacation,
                    reason: "Trip".into(),
                },
            )
            .await
            .unwrap();
        // another month is ignored
        ledger.check_in(eve.id, Some(at(2026, 2, 27, 9, 0)), None).await.unwrap();

        let monthly = ledger.monthly_attendance(3, 2026).await.unwrap();
        assert_eq!(monthly.report.len(), 2);
        let e = &monthly.report[0];
        assert_eq!((e.employee_id, e.name.as_str()), (eve.id, "Eve"));
        assert_eq!((e.total_days, e.present_days, e.late_days), (2, 2, 1));
        assert_eq!(e.total_work_hours, 8.0);
        let p = &monthly.report[1];
        assert_eq!((p.total_days, p.present_days, p.leave_days), (3, 1, 2));

        assert!(ledger.monthly_attendance(0, 2026).await.is_err());
    }

    #[tokio::test]
    async fn export_renders_json_rows_and_csv() {
        let h = Harness::new(at(2026, 3, 6, 18, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve, Jr.", Role::Employee).await;
        let ledger = &h.services.attendance;

        ledger.check_in(emp.id, Some(at(2026, 3, 2, 9, 30)), None).await.unwrap();
        ledger
            .mark_attendance(
                admin.id,
                MarkInput {
                    employee_id: emp.id,
                    date: day(3),
                    check_in_time: None,
                    check_in_location: Some("Client site".into()),
                    status: Some(AttendanceStatus::WorkFromHome),
                },
            )
            .await
            .unwrap();

        let export = ledger.export(day(1), day(31)).await.unwrap();
        assert_eq!(export.total_records, 2);
        let newest: &ExportRow = &export.records[0];
        assert_eq!(newest.date, day(3));
        assert_eq!(newest.location, "Client site");
        assert!(export.records[1].is_late);

        let csv = export.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Date,EmployeeID,EmployeeName,Email,CheckIn,CheckOut,WorkHours,Status,IsLate,Location,Notes"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with(&format!("2026-03-03,{},\"Eve, Jr.\",", emp.id)));
        assert!(lines[1].contains(",work-from-home,false,Client site,"));

        let empty = ledger.export(day(20), day(21)).await.unwrap();
        assert_eq!(empty.to_csv().unwrap().lines().count(), 1);
        assert!(ledger.export(day(5), day(4)).await.is_err());
    }
}
