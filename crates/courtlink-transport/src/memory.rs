//! In-process pub/sub broker.
//!
//! [`MemoryHub`] fans every publish out to all subscribers of a topic
//! through per-subscriber unbounded channels, the same plumbing a real
//! relay would do over the network. It exists for tests and local play,
//! so it also carries fault hooks: injected connect failures (to exercise
//! reconnection) and forced channel drops (to simulate a lost
//! connection).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use courtlink_protocol::ClientId;
use tokio::sync::mpsc;

use crate::{Channel, ChannelMessage, Connector, TransportError};

type Topic = HashMap<ClientId, mpsc::UnboundedSender<ChannelMessage>>;

#[derive(Default)]
struct HubInner {
    topics: Mutex<HashMap<String, Topic>>,
    next_id: AtomicU64,
    fail_next: AtomicU32,
}

impl HubInner {
    /// Locks the topic table. A poisoned lock just yields the inner
    /// data — publishes don't panic while holding it.
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An in-process broker implementing [`Connector`].
///
/// Cheap to clone — clones share the same topic table, so several
/// "clients" in one test can talk to each other through one hub.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to `connect` fail.
    ///
    /// Drives reconnection tests: a supervisor retrying against a hub
    /// with `fail_next(3)` sees three consecutive failures.
    pub fn fail_next(&self, n: u32) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// Severs the given client's subscription on every topic.
    ///
    /// Its pending `recv` resolves to `None`, exactly what a dropped
    /// network connection looks like from the channel side.
    pub fn drop_client(&self, id: &ClientId) {
        let mut topics = self.inner.topics();
        for topic in topics.values_mut() {
            topic.remove(id);
        }
        tracing::debug!(client_id = %id, "memory hub dropped client");
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .topics()
            .get(channel)
            .map_or(0, |topic| topic.len())
    }
}

impl Connector for MemoryHub {
    type Channel = MemoryChannel;

    async fn connect(
        &self,
        channel: &str,
    ) -> Result<MemoryChannel, TransportError> {
        let injected = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(TransportError::ConnectFailed(
                "injected connect failure".into(),
            ));
        }

        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = ClientId::new(format!("mem-{n}"));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .topics()
            .entry(channel.to_string())
            .or_default()
            .insert(id.clone(), tx);

        tracing::debug!(client_id = %id, channel, "memory hub subscriber attached");

        Ok(MemoryChannel {
            id,
            topic: channel.to_string(),
            hub: Arc::clone(&self.inner),
            rx,
        })
    }
}

/// A live subscription handed out by [`MemoryHub`].
pub struct MemoryChannel {
    id: ClientId,
    topic: String,
    hub: Arc<HubInner>,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
}

impl Channel for MemoryChannel {
    async fn publish(
        &self,
        event: &str,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let topics = self.hub.topics();
        let Some(topic) = topics.get(&self.topic) else {
            return Err(TransportError::ChannelClosed);
        };
        // A severed subscriber can't publish either — its connection is gone.
        if !topic.contains_key(&self.id) {
            return Err(TransportError::ChannelClosed);
        }
        let msg = ChannelMessage {
            event: event.to_string(),
            data: data.to_vec(),
        };
        for sender in topic.values() {
            // Dropped receivers are fine; they're mid-teardown.
            let _ = sender.send(msg.clone());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }

    fn client_id(&self) -> &ClientId {
        &self.id
    }

    async fn close(&self) {
        if let Some(topic) = self.hub.topics().get_mut(&self.topic) {
            topic.remove(&self.id);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if let Some(topic) = self.hub.topics().get_mut(&self.topic) {
            topic.remove(&self.id);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
