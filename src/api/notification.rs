use crate::{
    auth::auth::AuthUser,
    model::notification::{Notification, NotificationId},
    service::{Services, notification::InboxPage},
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct PurgeReq {
    #[schema(example = json!([3, 4, 5]))]
    pub ids: Vec<NotificationId>,
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(InboxQuery),
    responses((status = 200, description = "The caller's notifications, newest first", body = InboxPage)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<InboxQuery>,
) -> actix_web::Result<impl Responder> {
    let page = services
        .inbox
        .list(
            auth.account_id,
            query.unread_only,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(20),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses((status = 200, description = "Unread count", body = Object, example = json!({ "count": 3 }))),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(
    auth: AuthUser,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    let count = services.inbox.unread_count(auth.account_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read", body = Notification),
        (status = 404, description = "Not found or not yours")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let notification = services
        .inbox
        .mark_read(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(notification))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/unread",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked unread", body = Notification),
        (status = 404, description = "Not found or not yours")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_unread(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let notification = services
        .inbox
        .mark_unread(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(notification))
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses((status = 200, description = "Everything marked read", body = Object, example = json!({ "updated": 4 }))),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(
    auth: AuthUser,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    let updated = services.inbox.mark_all_read(auth.account_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found or not yours")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn delete(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    services
        .inbox
        .delete(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Notification deleted" })))
}

/// Bulk delete across all recipients
#[utoipa::path(
    post,
    path = "/api/notifications/purge",
    request_body = PurgeReq,
    responses(
        (status = 200, description = "Deleted count", body = Object, example = json!({ "deleted": 3 })),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn purge(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<PurgeReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let deleted = services.inbox.purge(&body.ids).await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}
