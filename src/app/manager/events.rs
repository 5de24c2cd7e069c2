//! Event fan-out to subscribers
//!
//! Each subscriber owns an unbounded channel. Publishing clones the event into
//! every live channel and prunes channels whose receiver was dropped. The bus
//! lock is held only while sending, never across an await, and is separate from
//! the manager's state lock.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::app::progress::TaskEvent;

type Subscribers = Vec<mpsc::UnboundedSender<TaskEvent>>;

/// Broadcasts task events to any number of subscribers
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new subscriber; it sees events published from now on
    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        EventSubscription { rx }
    }

    /// Deliver an event to every live subscriber
    ///
    /// Events published from one task arrive in publication order.
    pub fn publish(&self, event: TaskEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// Receiving end of an event subscription
///
/// Implements [`Stream`], so `StreamExt` combinators work on it.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl EventSubscription {
    /// Wait for the next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventSubscription {
    type Item = TaskEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::progress::{ProgressEvent, Stage};
    use crate::app::task::TaskId;
    use futures::StreamExt;

    fn event(id: u64, message: &str) -> TaskEvent {
        TaskEvent::Progress(ProgressEvent::stage(
            TaskId::new(id),
            Stage::Downloading,
            0.0,
            message,
        ))
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_in_order() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(event(1, "a"));
        bus.publish(event(1, "b"));

        for subscription in [&mut first, &mut second] {
            let messages: Vec<String> = vec![
                subscription.recv().await.unwrap(),
                subscription.recv().await.unwrap(),
            ]
            .into_iter()
            .map(|e| match e {
                TaskEvent::Progress(p) => p.message,
                TaskEvent::Result(_) => String::new(),
            })
            .collect();
            assert_eq!(messages, vec!["a", "b"]);
        }
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.publish(event(2, "x"));
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_subscription_is_a_stream() {
        let bus = EventBus::new();
        let subscription = bus.subscribe();
        bus.publish(event(3, "one"));
        bus.publish(event(4, "two"));
        drop(bus);

        let ids: Vec<TaskId> = subscription.map(|e| e.task_id()).collect().await;
        assert_eq!(ids, vec![TaskId::new(3), TaskId::new(4)]);
    }
}
