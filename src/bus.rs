use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

/// A single emitted item on a topic: the interaction name it belongs to, and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// The property or event name this emission is for.
    pub name: String,
    /// The emitted value.
    pub data: Value,
}

/// A token returned by [`Bus::subscribe`]. Dropping it, or passing it to [`Bus::dispose`], ends
/// the subscription; after either, no further items are delivered on the corresponding stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A multi-producer multi-subscriber topic-per-interaction bus.
///
/// Built on [`tokio::sync::broadcast`]: a subscriber that falls behind the configured buffer
/// size sees its oldest pending items dropped (the channel surfaces this as `Lagged`, which this
/// bus converts into a logged warning rather than terminating the stream), matching the
/// buffer-then-drop-oldest backpressure contract required of the bus. Emitters never block:
/// `send` on a `broadcast::Sender` is synchronous and only fails if there are zero receivers,
/// which this bus treats as a no-op.
pub struct Bus {
    buffer: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Emission>>>,
    live: Mutex<HashMap<SubscriptionId, Arc<AtomicBool>>>,
}

impl Bus {
    /// A new bus whose topics buffer up to `buffer` unread items per subscriber before dropping
    /// the oldest.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            topics: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
        }
    }

    async fn sender_for(&self, topic: &str) -> broadcast::Sender<Emission> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone()
    }

    /// Publish an emission to a topic. Non-blocking; if nobody is subscribed, the emission is
    /// simply dropped.
    pub async fn emit(&self, topic: &str, emission: Emission) {
        let sender = self.sender_for(topic).await;
        // Err(SendError) here only means zero receivers are attached; not an error condition.
        let _ = sender.send(emission);
    }

    /// Subscribe to a topic. Only emissions made after this call returns are observed — no
    /// replay of past items. Returns the subscription's disposal token and a stream of
    /// deliveries.
    pub async fn subscribe(
        &self,
        topic: &str,
    ) -> (SubscriptionId, impl Stream<Item = Emission> + Send + 'static) {
        let sender = self.sender_for(topic).await;
        let id = SubscriptionId::new();
        let disposed = Arc::new(AtomicBool::new(false));

        {
            let mut live = self.live.lock().await;
            live.insert(id, disposed.clone());
        }

        let topic_owned = topic.to_string();
        let stream = BroadcastStream::new(sender.subscribe())
            .take_while(move |_| !disposed.load(Ordering::Acquire))
            .filter_map(move |item| match item {
                Ok(emission) => Some(emission),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(topic = %topic_owned, skipped, "subscriber lagged, dropping oldest pending items");
                    None
                }
            });

        (id, stream)
    }

    /// Tear down a subscription. Idempotent: disposing an id twice, or an id that was never
    /// live, is a no-op. The corresponding stream stops yielding items before this call
    /// returns, even if the caller keeps polling it.
    pub async fn dispose(&self, id: SubscriptionId) {
        let mut live = self.live.lock().await;
        if let Some(disposed) = live.remove(&id) {
            disposed.store(true, Ordering::Release);
        }
    }

    /// Whether a subscription id is still tracked as live.
    pub async fn is_live(&self, id: SubscriptionId) -> bool {
        self.live.lock().await.contains_key(&id)
    }
}

/// A bus shared between an `ExposedThing` and every protocol binding that bridges its topics
/// onto the wire.
pub type SharedBus = Arc<Bus>;

#[cfg(test)]
mod tests {
    use super::*;

    fn emission(value: i64) -> Emission {
        Emission {
            name: "x".into(),
            data: Value::from(value),
        }
    }

    #[tokio::test]
    async fn subscriber_does_not_see_past_items() {
        let bus = Bus::new(8);
        bus.emit("x", emission(1)).await;

        let (_id, mut stream) = bus.subscribe("x").await;
        bus.emit("x", emission(2)).await;

        let received = stream.next().await.unwrap();
        assert_eq!(received.data, Value::from(2));
    }

    #[tokio::test]
    async fn fan_out_to_concurrent_subscribers() {
        let bus = Bus::new(8);
        let (_a, mut stream_a) = bus.subscribe("e").await;
        let (_b, mut stream_b) = bus.subscribe("e").await;

        bus.emit("e", emission(7)).await;

        assert_eq!(stream_a.next().await.unwrap().data, Value::from(7));
        assert_eq!(stream_b.next().await.unwrap().data, Value::from(7));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_terminal() {
        let bus = Bus::new(8);
        let (id, mut stream) = bus.subscribe("e").await;

        bus.emit("e", emission(1)).await;
        assert_eq!(stream.next().await.unwrap().data, Value::from(1));

        bus.dispose(id).await;
        bus.dispose(id).await;
        assert!(!bus.is_live(id).await);

        bus.emit("e", emission(2)).await;
        assert!(stream.next().await.is_none());
    }
}
