use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use shared::protocol::{Envelope, Topic};
use tokio::sync::broadcast;
use tracing::debug;

/// One broadcast channel per topic, created on first subscribe.
pub struct TopicHub {
    capacity: usize,
    channels: Mutex<HashMap<Topic, broadcast::Sender<Envelope>>>,
}

impl TopicHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<Envelope> {
        let mut channels = self.lock();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns how many subscribers were reached. Topics nobody listens to
    /// are dropped on the way.
    pub fn publish(&self, topic: &Topic, envelope: Envelope) -> usize {
        let mut channels = self.lock();
        let Some(sender) = channels.get(topic) else {
            return 0;
        };
        match sender.send(envelope) {
            Ok(reached) => reached,
            Err(_) => {
                channels.remove(topic);
                debug!(%topic, "dropped topic without subscribers");
                0
            }
        }
    }

    /// Drops topics whose last subscriber has gone; returns how many went.
    pub fn prune(&self) -> usize {
        let mut channels = self.lock();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let pruned = before - channels.len();
        if pruned > 0 {
            debug!(pruned, "dropped idle topics");
        }
        pruned
    }

    pub fn topic_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, broadcast::Sender<Envelope>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/hub_tests.rs"]
mod tests;
