// src/core/pubsub.rs

//! The publish-subscribe fan-out. Each database owns one hub; channels are
//! homed in the database the publisher selected, so the per-subscriber
//! delivery order equals the order publishes committed under that database's
//! lock.

use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// The capacity of each individual broadcast channel. Subscribers that fall
/// further behind than this observe a lag error and skip ahead.
const CHANNEL_CAPACITY: usize = 128;

/// A message delivered to a pattern subscriber: (original channel, payload).
pub type PatternMessage = (Bytes, Bytes);

/// The per-database channel and pattern maps. Lives inside the database's
/// lock, so subscription changes and publishes serialise with data commands.
#[derive(Debug, Default)]
pub struct PubSubHub {
    channels: HashMap<Bytes, Sender<Bytes>>,
    patterns: HashMap<Bytes, Sender<PatternMessage>>,
}

impl PubSubHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a channel, creating it on first use.
    pub fn subscribe(&mut self, channel: &Bytes) -> Receiver<Bytes> {
        self.channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribes to a glob-style pattern.
    pub fn subscribe_pattern(&mut self, pattern: &Bytes) -> Receiver<PatternMessage> {
        self.patterns
            .entry(pattern.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes a message, returning how many subscribers received it
    /// (direct and pattern subscribers combined). Dead channels encountered
    /// along the way are pruned.
    pub fn publish(&mut self, channel: &Bytes, payload: Bytes) -> usize {
        let mut receivers = 0;

        if let Some(sender) = self.channels.get(channel) {
            match sender.send(payload.clone()) {
                Ok(n) => receivers += n,
                Err(_) => {
                    self.channels.remove(channel);
                }
            }
        }

        let mut dead_patterns = Vec::new();
        for (pattern, sender) in &self.patterns {
            if crate::core::commands::helpers::glob_match(pattern, channel) {
                match sender.send((channel.clone(), payload.clone())) {
                    Ok(n) => receivers += n,
                    Err(_) => dead_patterns.push(pattern.clone()),
                }
            }
        }
        for pattern in dead_patterns {
            self.patterns.remove(&pattern);
        }

        receivers
    }

    /// Drops channels and patterns that no longer have any subscriber.
    /// Called by the background maintenance loop.
    pub fn purge_idle(&mut self) -> usize {
        let before = self.channels.len() + self.patterns.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        self.patterns.retain(|_, sender| sender.receiver_count() > 0);
        before - (self.channels.len() + self.patterns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn publish_reaches_direct_subscriber_in_order() {
        let mut hub = PubSubHub::new();
        let mut rx = hub.subscribe(&bytes("news"));
        assert_eq!(hub.publish(&bytes("news"), bytes("one")), 1);
        assert_eq!(hub.publish(&bytes("news"), bytes("two")), 1);
        assert_eq!(rx.recv().await.unwrap(), bytes("one"));
        assert_eq!(rx.recv().await.unwrap(), bytes("two"));
    }

    #[tokio::test]
    async fn publish_reaches_matching_patterns() {
        let mut hub = PubSubHub::new();
        let mut rx = hub.subscribe_pattern(&bytes("news.*"));
        assert_eq!(hub.publish(&bytes("news.sport"), bytes("goal")), 1);
        assert_eq!(hub.publish(&bytes("weather"), bytes("rain")), 0);
        let (channel, payload) = rx.recv().await.unwrap();
        assert_eq!(channel, bytes("news.sport"));
        assert_eq!(payload, bytes("goal"));
    }

    #[test]
    fn publish_without_subscribers_reports_zero() {
        let mut hub = PubSubHub::new();
        assert_eq!(hub.publish(&bytes("void"), bytes("m")), 0);
    }

    #[test]
    fn purge_drops_unsubscribed_channels() {
        let mut hub = PubSubHub::new();
        let rx = hub.subscribe(&bytes("a"));
        drop(rx);
        assert_eq!(hub.purge_idle(), 1);
    }
}
