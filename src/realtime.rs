//! In-process publish channels.
//!
//! Every channel is a `tokio::sync::broadcast` sender created lazily on first
//! subscribe. Publishing to a channel nobody listens on is not an error.
//! A channel is dropped from the hub once its last receiver goes away, either
//! when a [`Subscription`] is dropped or on the next publish.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::model::{account::AccountId, role::Role};

/// `"{role}-{account_id}"` for one account, `"{role}"` for everyone in a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Account(Role, AccountId),
    Role(Role),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Account(role, id) => write!(f, "{role}-{id}"),
            ChannelKey::Role(role) => write!(f, "{role}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub channel: String,
    pub name: String,
    pub payload: Value,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: ChannelKey, name: &str, payload: Value) -> anyhow::Result<()>;
}

pub struct ChannelHub {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, channel: ChannelKey) -> broadcast::Receiver<Event> {
        let key = channel.to_string();
        if let Some(sender) = self.read().get(&key) {
            return sender.subscribe();
        }
        self.write()
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Like [`ChannelHub::subscribe`], but the channel is pruned as soon as
    /// the returned stream is dropped and nobody else listens.
    pub fn listen(self: &Arc<Self>, channel: ChannelKey) -> Subscription {
        Subscription {
            hub: Arc::clone(self),
            key: channel.to_string(),
            events: Some(BroadcastStream::new(self.subscribe(channel))),
        }
    }

    pub fn subscriber_count(&self, channel: ChannelKey) -> usize {
        self.read()
            .get(&channel.to_string())
            .map_or(0, |s| s.receiver_count())
    }

    fn prune(&self, key: &str) -> bool {
        let mut channels = self.write();
        if channels.get(key).is_some_and(|s| s.receiver_count() == 0) {
            channels.remove(key);
            return true;
        }
        false
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, broadcast::Sender<Event>>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, broadcast::Sender<Event>>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Publisher for ChannelHub {
    async fn publish(&self, channel: ChannelKey, name: &str, payload: Value) -> anyhow::Result<()> {
        let key = channel.to_string();
        let delivered = {
            let channels = self.read();
            let Some(sender) = channels.get(&key) else {
                return Ok(());
            };
            sender
                .send(Event {
                    channel: key.clone(),
                    name: name.to_string(),
                    payload,
                })
                .is_ok()
        };

        // every receiver is gone; drop the sender so the map does not grow
        if !delivered {
            self.prune(&key);
        }
        tracing::debug!(channel = %key, event = name, delivered, "published");
        Ok(())
    }
}

/// One listener on one channel, as a stream of events.
pub struct Subscription {
    hub: Arc<ChannelHub>,
    key: String,
    events: Option<BroadcastStream<Event>>,
}

impl Stream for Subscription {
    type Item = Result<Event, BroadcastStreamRecvError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.events.as_mut() {
            Some(events) => events.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // the receiver has to go before the count is checked
        drop(self.events.take());
        if self.hub.prune(&self.key) {
            tracing::debug!(channel = %self.key, "channel pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_keys_follow_role_and_account() {
        assert_eq!(ChannelKey::Account(Role::Employee, 7).to_string(), "employee-7");
        assert_eq!(ChannelKey::Role(Role::Admin).to_string(), "admin");
    }

    #[tokio::test]
    async fn subscribers_only_see_their_channel() {
        let hub = ChannelHub::default();
        let mut mine = hub.subscribe(ChannelKey::Account(Role::Client, 3));
        let mut other = hub.subscribe(ChannelKey::Account(Role::Client, 4));

        hub.publish(
            ChannelKey::Account(Role::Client, 3),
            "new-notification",
            json!({ "id": 1 }),
        )
        .await
        .unwrap();

        let event = mine.recv().await.unwrap();
        assert_eq!(event.channel, "client-3");
        assert_eq!(event.name, "new-notification");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_listeners_is_fine() {
        let hub = ChannelHub::default();
        let rx = hub.subscribe(ChannelKey::Role(Role::Admin));
        drop(rx);
        hub.publish(ChannelKey::Role(Role::Admin), "meeting-created", Value::Null)
            .await
            .unwrap();
        assert_eq!(hub.subscriber_count(ChannelKey::Role(Role::Admin)), 0);
        hub.publish(ChannelKey::Role(Role::Employee), "ping", Value::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_last_subscription_prunes_the_channel() {
        let hub = Arc::new(ChannelHub::default());
        let key = ChannelKey::Account(Role::Employee, 9);
        let mut first = hub.listen(key);
        let second = hub.listen(key);
        let _unrelated = hub.listen(ChannelKey::Role(Role::Employee));
        assert_eq!(hub.subscriber_count(key), 2);

        hub.publish(key, "ping", json!({ "n": 1 })).await.unwrap();
        assert_eq!(first.next().await.unwrap().unwrap().payload, json!({ "n": 1 }));

        drop(first);
        assert_eq!(hub.subscriber_count(key), 1);
        assert!(hub.read().contains_key("employee-9"));

        drop(second);
        assert!(!hub.read().contains_key("employee-9"));
        assert_eq!(hub.read().len(), 1);
    }
}
