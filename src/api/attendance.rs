use crate::{
    auth::auth::AuthUser,
    model::{account::AccountId, attendance::AttendanceRecord},
    service::{
        Services,
        attendance::{CorrectionInput, LeaveInput, MarkInput},
        attendance_report::{
            AttendanceExport, AttendanceReport, AttendanceSummary, DailyReport, ExportFormat,
            MonthlyAttendance,
        },
    },
    store::AttendanceFilter,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Default, ToSchema)]
pub struct PunchReq {
    /// Defaults to now
    #[schema(value_type = Option<String>, format = "date-time")]
    pub at: Option<DateTime<Utc>>,
    #[schema(example = "Office")]
    pub location: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionReq {
    /// Required when rejecting
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct RangeQuery {
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    /// Admins only; employees always see their own records
    pub employee_id: Option<AccountId>,
}

#[derive(Deserialize, IntoParams)]
pub struct SummaryQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    /// Admins only
    pub employee_id: Option<AccountId>,
}

#[derive(Deserialize, IntoParams)]
pub struct DateQuery {
    /// Defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    #[param(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[param(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub employee_id: Option<AccountId>,
}

#[derive(Deserialize, IntoParams)]
pub struct MonthQuery {
    /// 1-12, defaults to the current month
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Deserialize, IntoParams)]
pub struct ExportQuery {
    #[param(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[param(value_type = String, format = "date")]
    pub to: NaiveDate,
    /// `json` (default) or `csv`
    #[param(value_type = Option<String>)]
    pub format: Option<ExportFormat>,
}

/// Admins may look at anyone, everyone else only at themselves.
fn subject(auth: &AuthUser, requested: Option<AccountId>) -> AccountId {
    match requested {
        Some(id) if auth.is_admin() => id,
        _ => auth.account_id,
    }
}

fn rejection_notes(body: DecisionReq) -> String {
    body.notes.unwrap_or_default()
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = PunchReq,
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceRecord),
        (status = 403, description = "Only active employees record attendance"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "message": "already checked in today"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    services: web::Data<Services>,
    body: Option<web::Json<PunchReq>>,
) -> actix_web::Result<impl Responder> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let record = services
        .attendance
        .check_in(auth.account_id, body.at, body.location)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": if record.is_late { "Checked in late" } else { "Checked in successfully" },
        "attendance": record,
    })))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = PunchReq,
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceRecord),
        (status = 409, description = "No check-in today or already checked out", body = Object, example = json!({
            "message": "no check-in found for today"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    services: web::Data<Services>,
    body: Option<web::Json<PunchReq>>,
) -> actix_web::Result<impl Responder> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let record = services
        .attendance
        .check_out(auth.account_id, body.at, body.location)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked out successfully",
        "attendance": record,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Today's record, null before check-in", body = AttendanceRecord)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, services: web::Data<Services>) -> actix_web::Result<impl Responder> {
    let record = services.attendance.today_status(auth.account_id).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Attendance history, filtered by date range
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(RangeQuery),
    responses((status = 200, description = "Matching records", body = [AttendanceRecord])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = match query.employee_id {
        None if auth.is_admin() => None,
        requested => Some(subject(&auth, requested)),
    };
    let records = services
        .attendance
        .records(&AttendanceFilter {
            employee_id,
            from: query.from,
            to: query.to,
            ..Default::default()
        })
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(SummaryQuery),
    responses((status = 200, description = "Monthly summary", body = AttendanceSummary)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn summary(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    let today = services.attendance.today();
    let summary = services
        .attendance
        .summary(
            subject(&auth, query.employee_id),
            query.month.unwrap_or(today.month()),
            query.year.unwrap_or(today.year()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    post,
    path = "/api/attendance/corrections",
    request_body = CorrectionInput,
    responses(
        (status = 200, description = "Correction requested", body = AttendanceRecord),
        (status = 400, description = "Missing reason or bad times")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn request_correction(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<CorrectionInput>,
) -> actix_web::Result<impl Responder> {
    let record = services
        .attendance
        .request_correction(auth.account_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Correction request submitted",
        "attendance": record,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/corrections/my",
    responses((status = 200, description = "Records carrying a correction request", body = [AttendanceRecord])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_corrections(
    auth: AuthUser,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    Ok(HttpResponse::Ok().json(services.attendance.corrections_of(auth.account_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/attendance/corrections/pending",
    responses(
        (status = 200, description = "Corrections awaiting a decision", body = [AttendanceRecord]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn pending_corrections(
    auth: AuthUser,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(services.attendance.pending_corrections().await?))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{id}/correction/approve",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Correction applied", body = AttendanceRecord),
        (status = 409, description = "No pending correction")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn approve_correction(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionReq>>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let notes = body.and_then(|b| b.into_inner().notes);
    let record = services
        .attendance
        .approve_correction(path.into_inner(), auth.account_id, notes)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{id}/correction/reject",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Correction rejected", body = AttendanceRecord),
        (status = 400, description = "Notes are required")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reject_correction(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: web::Json<DecisionReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let record = services
        .attendance
        .reject_correction(path.into_inner(), auth.account_id, rejection_notes(body.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    post,
    path = "/api/attendance/leaves",
    request_body = LeaveInput,
    responses(
        (status = 201, description = "One leave record per requested day", body = [AttendanceRecord]),
        (status = 409, description = "Overlaps a pending leave request")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn request_leave(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<LeaveInput>,
) -> actix_web::Result<impl Responder> {
    let records = services
        .attendance
        .request_leave(auth.account_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "days": records.len(),
        "attendance": records,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/leaves/my",
    responses((status = 200, description = "Records carrying a leave request", body = [AttendanceRecord])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_leaves(auth: AuthUser, services: web::Data<Services>) -> actix_web::Result<impl Responder> {
    Ok(HttpResponse::Ok().json(services.attendance.leaves_of(auth.account_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/attendance/leaves/pending",
    responses(
        (status = 200, description = "Leave days awaiting a decision", body = [AttendanceRecord]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn pending_leaves(
    auth: AuthUser,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(services.attendance.pending_leaves().await?))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{id}/leave/approve",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Leave approved", body = AttendanceRecord),
        (status = 409, description = "No pending leave")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn approve_leave(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionReq>>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let notes = body.and_then(|b| b.into_inner().notes);
    let record = services
        .attendance
        .approve_leave(path.into_inner(), auth.account_id, notes)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{id}/leave/reject",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Leave rejected", body = AttendanceRecord),
        (status = 400, description = "Notes are required")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reject_leave(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: web::Json<DecisionReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let record = services
        .attendance
        .reject_leave(path.into_inner(), auth.account_id, rejection_notes(body.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/attendance/daily",
    params(DateQuery),
    responses((status = 200, description = "Who is in, late, away or missing", body = DailyReport)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn daily_report(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<DateQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let date = query.date.unwrap_or_else(|| services.attendance.today());
    Ok(HttpResponse::Ok().json(services.attendance.daily_report(date).await?))
}

#[utoipa::path(
    get,
    path = "/api/attendance/late",
    params(DateQuery),
    responses((status = 200, description = "Late check-ins, latest first", body = [AttendanceRecord])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn late_arrivals(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<DateQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let date = query.date.unwrap_or_else(|| services.attendance.today());
    Ok(HttpResponse::Ok().json(services.attendance.late_arrivals(date).await?))
}

#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Totals and attendance rate for a date range", body = AttendanceReport),
        (status = 400, description = "Range ends before it starts")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn report(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<ReportQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let report = services
        .attendance
        .report(query.from, query.to, query.employee_id)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Manual mark by an admin
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body = MarkInput,
    responses(
        (status = 200, description = "Attendance marked", body = AttendanceRecord),
        (status = 403, description = "Admins only, and only for active employees"),
        (status = 409, description = "The day already has a check-in")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<MarkInput>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let record = services
        .attendance
        .mark_attendance(auth.account_id, body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Attendance marked successfully",
        "attendance": record,
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/monthly",
    params(MonthQuery),
    responses((status = 200, description = "Per-employee totals for the month", body = MonthlyAttendance)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn monthly(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<MonthQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let today = services.attendance.today();
    let monthly = services
        .attendance
        .monthly_attendance(
            query.month.unwrap_or(today.month()),
            query.year.unwrap_or(today.year()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(monthly))
}

#[utoipa::path(
    get,
    path = "/api/attendance/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Records as JSON, or as a CSV attachment", body = AttendanceExport),
        (status = 400, description = "Range ends before it starts")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn export(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<ExportQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let export = services.attendance.export(query.from, query.to).await?;

    match query.format.unwrap_or_default() {
        ExportFormat::Json => Ok(HttpResponse::Ok().json(export)),
        ExportFormat::Csv => {
            let csv = export.to_csv().map_err(|e| {
                tracing::error!(error = %e, "failed to render attendance csv");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?;
            Ok(HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    "Content-Disposition",
                    format!("attachment; filename=attendance_{}_{}.csv", query.from, query.to),
                ))
                .body(csv))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "The record", body = AttendanceRecord),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_record(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let record = services.attendance.get(path.into_inner()).await?;
    if !auth.is_admin() && record.employee_id != auth.account_id {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": format!("attendance record {} not found", record.id)
        })));
    }
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    delete,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Deleted", body = Object, example = json!({
            "message": "Attendance record deleted"
        })),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_record(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    services.attendance.delete_record(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Attendance record deleted"
    })))
}
