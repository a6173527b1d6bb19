//! The domain core: attendance, participant resolution, meetings and
//! notification fan-out. Everything here is transport agnostic; the HTTP
//! layer in `crate::api` only translates requests into these calls.

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::Config,
    error::ServiceError,
    mail::Mailer,
    realtime::Publisher,
    store::Stores,
};

pub mod attendance;
pub mod attendance_report;
pub mod identity;
pub mod meeting;
pub mod notification;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

use attendance::AttendanceLedger;
use identity::IdentityService;
use meeting::MeetingScheduler;
use notification::{Inbox, NotificationFanout};
use resolver::ParticipantResolver;

/// Bound on compare-and-set retries before a write gives up with
/// `StoreError::Contention`.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Clone)]
pub struct Services {
    pub identity: Arc<IdentityService>,
    pub attendance: Arc<AttendanceLedger>,
    pub meetings: Arc<MeetingScheduler>,
    pub notifications: Arc<NotificationFanout>,
    pub inbox: Arc<Inbox>,
}

impl Services {
    pub fn new(
        stores: Stores,
        publisher: Arc<dyn Publisher>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let fanout = Arc::new(NotificationFanout::new(
            stores.accounts.clone(),
            stores.notifications.clone(),
            publisher,
            clock.clone(),
            config.fanout_concurrency,
        ));
        let resolver = ParticipantResolver::new(stores.accounts.clone());

        Self {
            identity: Arc::new(IdentityService::new(
                stores.accounts.clone(),
                fanout.clone(),
                mailer,
                clock.clone(),
                config.mail_timeout,
            )),
            attendance: Arc::new(AttendanceLedger::new(
                stores.attendance.clone(),
                stores.accounts.clone(),
                fanout.clone(),
                clock.clone(),
                config.attendance,
            )),
            meetings: Arc::new(MeetingScheduler::new(
                stores.meetings.clone(),
                stores.accounts.clone(),
                resolver,
                fanout.clone(),
                clock,
            )),
            inbox: Arc::new(Inbox::new(stores.notifications.clone())),
            notifications: fanout,
        }
    }
}
