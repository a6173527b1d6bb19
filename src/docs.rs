use crate::api::{
    attendance::{DecisionReq, PunchReq},
    meeting::RsvpReq,
    notification::PurgeReq,
};
use crate::model::{
    account::{Account, AccountStatus},
    attendance::{AttendanceRecord, AttendanceStatus, CorrectionRequest, LeaveRequest, LeaveType, RequestStatus},
    meeting::{Meeting, MeetingMinutes, MeetingStatus, Participant, ParticipantStatus},
    notification::{Notification, NotificationKind},
    role::Role,
};
use crate::models::{LoginReqDto, SignupReq, TokenResponse};
use crate::service::{
    attendance::{CorrectionInput, LeaveInput, MarkInput},
    attendance_report::{
        AttendanceExport, AttendanceReport, AttendanceSummary, DailyReport, EmployeeMonth,
        ExportFormat, ExportRow, MonthlyAttendance,
    },
    identity::Registration,
    meeting::{MeetingDraft, MeetingPatch, MinutesInput},
    notification::InboxPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

/// Registers the `bearer_auth` scheme referenced by the protected paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "OfficeSphere API",
        version = "1.0.0",
        description = r#"
## OfficeSphere

Backend for a small office: **employees** record attendance, **clients** book
meetings with staff, **admins** approve everything in between.

### 🔹 Key Features
- **Attendance**
  - Daily check-in / check-out with lateness tracking
  - Correction and leave requests with admin review
  - Monthly summaries, daily and range reports
- **Meetings**
  - Scheduling with participant resolution, RSVPs, cancellation and minutes
- **Notifications**
  - Persisted inbox per account plus realtime delivery over server-sent events
- **Accounts**
  - Client self-registration with admin approval

### 🔐 Security
Everything under `/api` needs a **JWT Bearer** access token from `/auth/login`.
Refresh tokens rotate on use and are revoked on logout.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::account::create_account,
        crate::api::account::list_accounts,
        crate::api::account::get_account,
        crate::api::account::approve_account,
        crate::api::account::reject_account,
        crate::api::account::deactivate_account,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::list,
        crate::api::attendance::summary,
        crate::api::attendance::request_correction,
        crate::api::attendance::my_corrections,
        crate::api::attendance::pending_corrections,
        crate::api::attendance::approve_correction,
        crate::api::attendance::reject_correction,
        crate::api::attendance::request_leave,
        crate::api::attendance::my_leaves,
        crate::api::attendance::pending_leaves,
        crate::api::attendance::approve_leave,
        crate::api::attendance::reject_leave,
        crate::api::attendance::daily_report,
        crate::api::attendance::late_arrivals,
        crate::api::attendance::report,
        crate::api::attendance::mark_attendance,
        crate::api::attendance::monthly,
        crate::api::attendance::export,
        crate::api::attendance::get_record,
        crate::api::attendance::delete_record,

        crate::api::meeting::schedule,
        crate::api::meeting::list,
        crate::api::meeting::get_meeting,
        crate::api::meeting::update,
        crate::api::meeting::cancel,
        crate::api::meeting::delete,
        crate::api::meeting::rsvp,
        crate::api::meeting::record_minutes,

        crate::api::notification::list,
        crate::api::notification::unread_count,
        crate::api::notification::mark_read,
        crate::api::notification::mark_unread,
        crate::api::notification::mark_all_read,
        crate::api::notification::delete,
        crate::api::notification::purge,

        crate::api::events::subscribe
    ),
    components(
        schemas(
            SignupReq,
            LoginReqDto,
            TokenResponse,
            Registration,
            Role,
            Account,
            AccountStatus,
            AttendanceRecord,
            AttendanceStatus,
            CorrectionRequest,
            LeaveRequest,
            LeaveType,
            RequestStatus,
            CorrectionInput,
            LeaveInput,
            PunchReq,
            DecisionReq,
            AttendanceSummary,
            DailyReport,
            AttendanceReport,
            MarkInput,
            MonthlyAttendance,
            EmployeeMonth,
            ExportFormat,
            ExportRow,
            AttendanceExport,
            Meeting,
            MeetingStatus,
            Participant,
            ParticipantStatus,
            MeetingMinutes,
            MeetingDraft,
            MeetingPatch,
            MinutesInput,
            RsvpReq,
            Notification,
            NotificationKind,
            InboxPage,
            PurgeReq
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-up, sign-in and token rotation"),
        (name = "Accounts", description = "Account administration"),
        (name = "Attendance", description = "Attendance, corrections, leave and reports"),
        (name = "Meetings", description = "Meeting scheduling APIs"),
        (name = "Notifications", description = "Per-account notification inbox"),
        (name = "Realtime", description = "Server-sent event stream"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_protected_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/meetings"));
        assert!(doc.paths.paths.contains_key("/auth/login"));
        assert!(doc.paths.paths.contains_key("/api/attendance/export"));
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
