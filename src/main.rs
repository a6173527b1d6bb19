use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

use officesphere::{
    clock::SystemClock,
    config::{Config, StoreBackend},
    db::init_db,
    docs::ApiDoc,
    mail::{HttpMailer, LogMailer, Mailer},
    state::AppState,
    store::Stores,
};
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "OfficeSphere is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let stores = match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Mysql, Some(url)) => Stores::mysql(init_db(url).await?),
        (StoreBackend::Mysql, None) => anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=mysql"),
        (StoreBackend::Memory, _) => {
            warn!("Using the in-memory store, data is lost on restart");
            Stores::memory()
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mail_api_url {
        Some(url) => Arc::new(HttpMailer::new(
            url.as_str(),
            config.mail_from.as_str(),
            config.mail_timeout,
        )?),
        None => {
            warn!("MAIL_API_URL not set, emails are only logged");
            Arc::new(LogMailer)
        }
    };

    let server_addr = config.server_addr.clone();
    let state = AppState::new(config, stores, mailer, Arc::new(SystemClock));

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .service(index)
            // /auth plus the rate-limited API scope
            .configure(move |cfg| state.configure(cfg))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
