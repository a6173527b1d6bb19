use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::Services;
use crate::{
    clock::ManualClock,
    config::Config,
    mail::{Email, Mailer},
    model::{
        account::{Account, AccountStatus, NewAccount, NewProfile, Profile, ProfileKind},
        role::Role,
    },
    realtime::{ChannelKey, Publisher},
    store::Stores,
};

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, Value)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingPublisher {
    pub fn fail_on(&self, channel: ChannelKey) {
        self.failing.lock().unwrap().insert(channel.to_string());
    }

    pub fn events(&self) -> Vec<(String, String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(_, n, _)| n == name)
            .map(|(channel, _, _)| channel)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: ChannelKey, name: &str, payload: Value) -> anyhow::Result<()> {
        let key = channel.to_string();
        if self.failing.lock().unwrap().contains(&key) {
            anyhow::bail!("channel {key} is down");
        }
        self.events
            .lock()
            .unwrap()
            .push((key, name.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    pub broken: bool,
    pub hanging: bool,
}

impl RecordingMailer {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Never answers, like a relay that accepted the connection and stalled.
    pub fn hanging() -> Self {
        Self {
            hanging: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("smtp relay refused connection");
        }
        if self.hanging {
            futures::future::pending::<()>().await;
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Harness {
    pub stores: Stores,
    pub publisher: Arc<RecordingPublisher>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
    pub services: Services,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_mailer(now, RecordingMailer::default())
    }

    pub fn with_mailer(now: DateTime<Utc>, mailer: RecordingMailer) -> Self {
        Self::with_config(now, &Config::default(), mailer)
    }

    pub fn with_config(now: DateTime<Utc>, config: &Config, mailer: RecordingMailer) -> Self {
        Self::build(now, Stores::memory(), config, mailer)
    }

    /// For tests that wrap a collection to stage interleavings.
    pub fn with_stores(now: DateTime<Utc>, stores: Stores) -> Self {
        Self::build(now, stores, &Config::default(), RecordingMailer::default())
    }

    fn build(now: DateTime<Utc>, stores: Stores, config: &Config, mailer: RecordingMailer) -> Self {
        let publisher = Arc::new(RecordingPublisher::default());
        let mailer = Arc::new(mailer);
        let clock = Arc::new(ManualClock::new(now));
        let services = Services::new(
            stores.clone(),
            publisher.clone(),
            mailer.clone(),
            clock.clone(),
            config,
        );
        Self {
            stores,
            publisher,
            mailer,
            clock,
            services,
        }
    }

    pub async fn account(&self, name: &str, role: Role) -> Account {
        self.account_with_status(name, role, AccountStatus::Active)
            .await
    }

    pub async fn account_with_status(
        &self,
        name: &str,
        role: Role,
        status: AccountStatus,
    ) -> Account {
        let account = NewAccount {
            name: name.to_string(),
            email: format!("{}@officesphere.test", name.to_lowercase().replace(' ', ".")),
            password_hash: String::new(),
            role,
            status,
            created_at: Utc::now(),
        };
        self.stores
            .accounts
            .insert_account(account, None)
            .await
            .unwrap()
            .0
    }

    pub async fn profile(&self, account: &Account, kind: ProfileKind) -> Profile {
        self.stores
            .accounts
            .insert_profile(NewProfile {
                account_id: account.id,
                kind,
                display_name: account.name.clone(),
                code: None,
            })
            .await
            .unwrap()
    }
}
