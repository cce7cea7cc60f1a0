//! # Delivery of fleet events to registered observers.
//!
//! The builder's event listener drains the [`Bus`] and hands every event to a
//! [`SubscriberSet`], which forwards it to each registered [`Subscribe`]
//! implementation over that observer's private bounded queue:
//!
//! ```text
//! bus listener ── emit ──┬──► [queue] ──► worker ──► alerts.on_event()
//!                        ├──► [queue] ──► worker ──► audit.on_event()
//!                        └──► [queue] ──► worker ──► log.on_event()
//! ```
//!
//! ## Rules
//! - Each observer receives its events in publish order, but two observers
//!   may be at different points of the stream at any moment; `Event::seq`
//!   restores a global order when one is needed.
//! - `emit` never waits. A full or closed queue costs that one observer the
//!   event and puts a `SubscriberOverflow` on the bus; everyone else still
//!   gets it.
//! - A panic inside `on_event` is caught (`catch_unwind` behind
//!   `AssertUnwindSafe`), reported as `SubscriberPanicked`, and the worker
//!   moves on to the next event. State the handler shares through a mutex may
//!   be left mid-update when that happens.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// Queue endpoint for one registered observer.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Owns the observer queues and their worker tasks.
///
/// Built once by the [`ClusterManagerBuilder`](crate::ClusterManagerBuilder)
/// and driven by its bus listener; embedders interact with it only through
/// the [`Subscribe`] implementations they register.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per observer. Queues are sized by each observer's
    /// [`Subscribe::queue_capacity`], clamped to at least 1, and the workers
    /// run until [`shutdown`](Self::shutdown) closes their queues.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = {
                            let any = &*panic_err;
                            if let Some(msg) = any.downcast_ref::<&'static str>() {
                                (*msg).to_string()
                            } else if let Some(msg) = any.downcast_ref::<String>() {
                                msg.clone()
                            } else {
                                "unknown panic".to_string()
                            }
                        };
                        bus_for_worker.publish(Event::subscriber_panicked(s.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Clones the event into an `Arc` and forwards it to every observer.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Forwards an already-shared event to every observer without waiting.
    ///
    /// When an observer's queue is full or its worker is gone, that observer
    /// misses this event and a `SubscriberOverflow` goes on the bus — unless
    /// the event being dropped is itself an overflow report, which would
    /// otherwise feed back on itself.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = event.is_subscriber_overflow();

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Closes every observer queue and waits for the workers to drain what
    /// they already hold.
    pub async fn shutdown(self) {
        drop(self.channels);

        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::events::EventKind;

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn test_events_reach_every_subscriber() {
        let bus = Bus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(
            vec![
                Arc::new(Counter(Arc::clone(&hits))),
                Arc::new(Counter(Arc::clone(&hits))),
            ],
            bus,
        );

        set.emit(&Event::now(EventKind::Debug));
        set.emit(&Event::now(EventKind::Debug));
        set.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let hits = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(
            vec![Arc::new(Panicker), Arc::new(Counter(Arc::clone(&hits)))],
            bus,
        );

        set.emit(&Event::now(EventKind::Debug));
        set.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let reported = rx.recv().await.unwrap();
        assert_eq!(reported.kind, EventKind::SubscriberPanicked);
        assert!(reported.reason.as_deref().unwrap().contains("boom"));
    }
}
