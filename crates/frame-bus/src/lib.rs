//! Cross-context message channel shared by ad session controllers and the
//! render hosts running inside isolated frames.
//!
//! Every window is addressed by a topic. Posting to a topic hands the payload
//! to every listener currently attached there, whoever owns it, so consumers
//! must filter what they receive. Delivery is best-effort.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no listener attached to topic {0}")]
    NoListener(String),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait FrameBus: Send + Sync {
    /// Attaches a listener to `topic`. Dropping the receiver detaches it.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<FrameMessage>;
    fn post(&self, topic: &str, payload: Bytes) -> BusResult<()>;
    fn listener_count(&self, topic: &str) -> usize;
    /// Retires `topic`. Listeners still attached see the channel close once
    /// they drain what was already posted.
    fn release(&self, topic: &str);
}

/// In-memory bus connecting every context that lives in one process. Topics
/// exist only while someone listens on them.
#[derive(Debug, Default)]
pub struct LocalFrameBus {
    topics: RwLock<HashMap<String, broadcast::Sender<FrameMessage>>>,
}

impl LocalFrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of topics currently held open.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    fn prune_idle(topics: &mut HashMap<String, broadcast::Sender<FrameMessage>>) {
        topics.retain(|_, sender| sender.receiver_count() > 0);
    }
}

impl FrameBus for LocalFrameBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<FrameMessage> {
        let mut topics = self.topics.write();
        Self::prune_idle(&mut topics);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    fn post(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let sender = self.topics.read().get(topic).cloned();
        let delivered = sender.is_some_and(|sender| {
            sender
                .send(FrameMessage {
                    topic: topic.to_string(),
                    payload,
                })
                .is_ok()
        });
        if delivered {
            return Ok(());
        }
        let mut topics = self.topics.write();
        if topics
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(topic);
        }
        Err(BusError::NoListener(topic.to_string()))
    }

    fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn release(&self, topic: &str) {
        self.topics.write().remove(topic);
    }
}
