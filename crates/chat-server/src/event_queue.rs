//! Central event loop.
//!
//! Every state-mutating operation of the service travels through one
//! unbounded FIFO and is executed by exactly one consumer, one event
//! at a time, in the order it was dispatched. Handlers therefore get
//! exclusive, sequential access to whatever state the consumer owns,
//! and no lock guards that state.
//!
//! Producers hold an [`EventDispatcher`]. Dispatching never blocks and
//! is allowed from inside a running handler. Once the consumer has
//! exited, dispatching is a no-op that reports `false`.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Something that applies events on the consumer.
pub trait EventHandler<E>: Send {
    /// Apply one event. The next event is not started until this returns.
    fn handle(&mut self, event: E) -> impl Future<Output = ()> + Send;

    /// Called once after the loop has stopped taking events.
    fn on_stop(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Cloneable producer side of an [`EventQueue`].
pub struct EventDispatcher<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        EventDispatcher {
            tx: self.tx.clone(),
        }
    }
}

impl<E> EventDispatcher<E> {
    /// Append `event` to the tail of the queue.
    ///
    /// Returns `false` if the consumer is gone and the event was dropped.
    pub fn dispatch(&self, event: E) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Unbounded FIFO with a single consumer.
pub struct EventQueue<E> {
    tx: mpsc::UnboundedSender<E>,
    rx: mpsc::UnboundedReceiver<E>,
    token: CancellationToken,
}

impl<E: Send + 'static> EventQueue<E> {
    /// Create a queue whose consumer stops when `token` is cancelled.
    pub fn new(token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        EventQueue { tx, rx, token }
    }

    pub fn dispatcher(&self) -> EventDispatcher<E> {
        EventDispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Run the consumer loop until the stop token is cancelled.
    ///
    /// A stop requested while a handler runs lets that handler finish;
    /// nothing after it is executed. Events still queued at that point
    /// are discarded.
    pub async fn run<H>(mut self, mut handler: H)
    where
        H: EventHandler<E>,
    {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            handler.handle(event).await;
        }

        handler.on_stop().await;

        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        debug!(discarded, "event loop stopped");
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}
