//! Simple stateless pub-sub event plumbing.
//!
//! Components subscribe to engine events (order ready, order annulled) and react to them without
//! any access to engine internals. Handlers are async and run on their own tasks, so a slow or
//! failing subscriber can never hold up an order write.

use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Run the dispatch loop. Returns once every producer has been dropped and the queue has
    /// drained.
    pub async fn start_handler(mut self) {
        debug!("📣️ Event handler started");
        // Drop the internal sender so the loop ends when the last producer goes away.
        drop(self.sender);
        while let Some(event) = self.listener.recv().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                (handler)(event).await;
                trace!("📣️ Event handled");
            });
        }
        debug!("📣️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📣️ Failed to publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber_exactly_once() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&total);
        let handler = Arc::new(move |v: u64| {
            let total = Arc::clone(&total);
            Box::pin(async move {
                total.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let producer = event_handler.subscribe();
        tokio::spawn(async move {
            for v in 1..=10u64 {
                producer.publish_event(v).await;
            }
        });
        event_handler.start_handler().await;
        // The loop has ended but spawned handlers may still be finishing.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 55);
    }
}
