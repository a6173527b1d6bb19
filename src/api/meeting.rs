use crate::{
    auth::auth::AuthUser,
    model::meeting::{Meeting, ParticipantStatus},
    service::{
        Services,
        meeting::{MeetingDraft, MeetingPatch, MinutesInput},
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct RsvpReq {
    #[schema(example = "Accepted")]
    pub status: ParticipantStatus,
}

#[utoipa::path(
    post,
    path = "/api/meetings",
    request_body = MeetingDraft,
    responses(
        (status = 201, description = "Meeting scheduled, participants notified", body = Meeting),
        (status = 400, description = "No participants or start not before end"),
        (status = 403, description = "Only admins and clients schedule meetings"),
        (status = 422, description = "Some participants could not be resolved", body = Object, example = json!({
            "message": "could not resolve participants [4242]",
            "unresolved": [4242]
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn schedule(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<MeetingDraft>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .schedule(auth.account_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(meeting))
}

/// Admins see every meeting, everyone else the ones they take part in
#[utoipa::path(
    get,
    path = "/api/meetings",
    responses((status = 200, description = "Meetings, latest start first", body = [Meeting])),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn list(auth: AuthUser, services: web::Data<Services>) -> actix_web::Result<impl Responder> {
    let meetings = if auth.is_admin() {
        services.meetings.list_all().await?
    } else {
        services.meetings.list_for_account(auth.account_id).await?
    };
    Ok(HttpResponse::Ok().json(meetings))
}

#[utoipa::path(
    get,
    path = "/api/meetings/{id}",
    params(("id" = u64, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "The meeting", body = Meeting),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn get_meeting(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .view(path.into_inner(), auth.account_id, auth.role)
        .await?;
    Ok(HttpResponse::Ok().json(meeting))
}

#[utoipa::path(
    put,
    path = "/api/meetings/{id}",
    params(("id" = u64, Path, description = "Meeting id")),
    request_body = MeetingPatch,
    responses(
        (status = 200, description = "Meeting updated, participants notified", body = Meeting),
        (status = 403, description = "Only the organizer or an admin"),
        (status = 409, description = "Meeting already cancelled or completed")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn update(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: web::Json<MeetingPatch>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .update(path.into_inner(), auth.account_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(meeting))
}

#[utoipa::path(
    post,
    path = "/api/meetings/{id}/cancel",
    params(("id" = u64, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "Meeting cancelled, participants notified", body = Meeting),
        (status = 403, description = "Only the organizer or an admin"),
        (status = 409, description = "Meeting already cancelled or completed")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn cancel(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .cancel(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Meeting cancelled",
        "meeting": meeting,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/meetings/{id}",
    params(("id" = u64, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "Meeting deleted", body = Object, example = json!({
            "message": "Meeting deleted"
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn delete(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    services
        .meetings
        .delete(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Meeting deleted"
    })))
}

#[utoipa::path(
    put,
    path = "/api/meetings/{id}/rsvp",
    params(("id" = u64, Path, description = "Meeting id")),
    request_body = RsvpReq,
    responses(
        (status = 200, description = "Response recorded", body = Meeting),
        (status = 403, description = "Not a participant")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn rsvp(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: web::Json<RsvpReq>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .set_participant_status(path.into_inner(), auth.account_id, body.status)
        .await?;
    Ok(HttpResponse::Ok().json(meeting))
}

#[utoipa::path(
    post,
    path = "/api/meetings/{id}/minutes",
    params(("id" = u64, Path, description = "Meeting id")),
    request_body = MinutesInput,
    responses(
        (status = 200, description = "Minutes recorded, meeting completed", body = Meeting),
        (status = 403, description = "Only the organizer or an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Meetings"
)]
pub async fn record_minutes(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
    body: web::Json<MinutesInput>,
) -> actix_web::Result<impl Responder> {
    let meeting = services
        .meetings
        .record_minutes(path.into_inner(), auth.account_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(meeting))
}
