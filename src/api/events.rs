use crate::{
    auth::auth::AuthUser,
    realtime::{ChannelHub, ChannelKey, Event},
};
use actix_web::{HttpResponse, Responder, web, web::Bytes};
use futures::{StreamExt, future, stream};
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

fn frame(event: &Event) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.name, event.payload))
}

/// Server-sent events for the caller's own channel and their role channel
#[utoipa::path(
    get,
    path = "/api/events",
    responses((status = 200, description = "text/event-stream of realtime events, e.g. new-notification or meeting-created")),
    security(("bearer_auth" = [])),
    tag = "Realtime"
)]
pub async fn subscribe(auth: AuthUser, hub: web::Data<ChannelHub>) -> impl Responder {
    let own = hub.listen(ChannelKey::Account(auth.role, auth.account_id));
    let shared = hub.listen(ChannelKey::Role(auth.role));
    let account_id = auth.account_id;

    let events = stream::select(own, shared).filter_map(move |item| {
        future::ready(match item {
            Ok(event) => Some(Ok::<_, Infallible>(frame(&event))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(account_id, skipped, "event subscriber lagged");
                None
            }
        })
    });
    let hello = stream::once(future::ready(Ok(Bytes::from_static(b": connected\n\n"))));

    tracing::debug!(account_id, role = %auth.role, "event stream opened");
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(hello.chain(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_framed_for_sse() {
        let bytes = frame(&Event {
            channel: "employee-7".to_string(),
            name: "new-notification".to_string(),
            payload: json!({ "id": 1 }),
        });
        assert_eq!(&bytes[..], b"event: new-notification\ndata: {\"id\":1}\n\n");
    }
}
