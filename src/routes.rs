use crate::{
    api::{account, attendance, events, meeting, notification},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter keyed on the peer address
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

/// `/auth/*` is public. Everything under `api_prefix` needs an access token;
/// refresh tokens only work against `/auth/refresh` and `/auth/logout`.
pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes. Fixed segments are registered before `/{id}`.
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(handlers::me)
            .service(web::resource("/events").route(web::get().to(events::subscribe)))
            .service(
                web::scope("/accounts")
                    .service(
                        web::resource("")
                            .route(web::post().to(account::create_account))
                            .route(web::get().to(account::list_accounts)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(account::get_account)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(account::approve_account)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(account::reject_account)),
                    )
                    .service(
                        web::resource("/{id}/deactivate")
                            .route(web::put().to(account::deactivate_account)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("").route(web::get().to(attendance::list)))
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(
                        web::resource("/check-out").route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/summary").route(web::get().to(attendance::summary)))
                    .service(
                        web::resource("/corrections")
                            .route(web::post().to(attendance::request_correction)),
                    )
                    .service(
                        web::resource("/corrections/my")
                            .route(web::get().to(attendance::my_corrections)),
                    )
                    .service(
                        web::resource("/corrections/pending")
                            .route(web::get().to(attendance::pending_corrections)),
                    )
                    .service(
                        web::resource("/leaves").route(web::post().to(attendance::request_leave)),
                    )
                    .service(web::resource("/leaves/my").route(web::get().to(attendance::my_leaves)))
                    .service(
                        web::resource("/leaves/pending")
                            .route(web::get().to(attendance::pending_leaves)),
                    )
                    .service(web::resource("/daily").route(web::get().to(attendance::daily_report)))
                    .service(web::resource("/late").route(web::get().to(attendance::late_arrivals)))
                    .service(web::resource("/report").route(web::get().to(attendance::report)))
                    .service(
                        web::resource("/mark").route(web::post().to(attendance::mark_attendance)),
                    )
                    .service(web::resource("/monthly").route(web::get().to(attendance::monthly)))
                    .service(web::resource("/export").route(web::get().to(attendance::export)))
                    // /attendance/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_record))
                            .route(web::delete().to(attendance::delete_record)),
                    )
                    .service(
                        web::resource("/{id}/correction/approve")
                            .route(web::put().to(attendance::approve_correction)),
                    )
                    .service(
                        web::resource("/{id}/correction/reject")
                            .route(web::put().to(attendance::reject_correction)),
                    )
                    .service(
                        web::resource("/{id}/leave/approve")
                            .route(web::put().to(attendance::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/leave/reject")
                            .route(web::put().to(attendance::reject_leave)),
                    ),
            )
            .service(
                web::scope("/meetings")
                    .service(
                        web::resource("")
                            .route(web::post().to(meeting::schedule))
                            .route(web::get().to(meeting::list)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(meeting::get_meeting))
                            .route(web::put().to(meeting::update))
                            .route(web::delete().to(meeting::delete)),
                    )
                    .service(web::resource("/{id}/cancel").route(web::post().to(meeting::cancel)))
                    .service(web::resource("/{id}/rsvp").route(web::put().to(meeting::rsvp)))
                    .service(
                        web::resource("/{id}/minutes").route(web::post().to(meeting::record_minutes)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    .service(web::resource("").route(web::get().to(notification::list)))
                    .service(
                        web::resource("/unread-count")
                            .route(web::get().to(notification::unread_count)),
                    )
                    .service(
                        web::resource("/read-all").route(web::put().to(notification::mark_all_read)),
                    )
                    .service(web::resource("/purge").route(web::post().to(notification::purge)))
                    .service(web::resource("/{id}").route(web::delete().to(notification::delete)))
                    .service(
                        web::resource("/{id}/read").route(web::put().to(notification::mark_read)),
                    )
                    .service(
                        web::resource("/{id}/unread").route(web::put().to(notification::mark_unread)),
                    ),
            ),
    );
}
