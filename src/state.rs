use std::sync::Arc;

use actix_web::web::{self, Data};

use crate::{
    auth::revocation::RevocationList,
    clock::Clock,
    config::Config,
    mail::Mailer,
    realtime::ChannelHub,
    routes,
    service::Services,
    store::Stores,
};

/// Everything the HTTP layer shares across workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub services: Services,
    pub hub: Arc<ChannelHub>,
    pub revocations: RevocationList,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        let hub = Arc::new(ChannelHub::default());
        let services = Services::new(stores, hub.clone(), mailer, clock, &config);
        let revocations = RevocationList::new(config.refresh_token_ttl);

        Self {
            config,
            services,
            hub,
            revocations,
        }
    }

    /// App data plus the public and protected routes.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(Data::new(self.config.clone()))
            .app_data(Data::new(self.services.clone()))
            .app_data(Data::from(self.hub.clone()))
            .app_data(Data::new(self.revocations.clone()));
        routes::configure(cfg, self.config.clone());
    }
}
