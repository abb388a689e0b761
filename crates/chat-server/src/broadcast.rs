//! One message, one recipient.
//!
//! A broadcast fans out as one [`BroadcastJob`] per registered client,
//! each spawned on its own so a slow or broken socket holds up nobody
//! else. Delivery is at-most-once: a failed write runs the failure
//! callback and the job ends, no retry.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::Client;

pub struct BroadcastJob {
    message: Arc<str>,
    recipient: Arc<Client>,
    on_failure: Box<dyn FnOnce(io::Error) + Send>,
}

impl BroadcastJob {
    pub fn new<F>(message: Arc<str>, recipient: Arc<Client>, on_failure: F) -> Self
    where
        F: FnOnce(io::Error) + Send + 'static,
    {
        BroadcastJob {
            message,
            recipient,
            on_failure: Box::new(on_failure),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Write the message; on failure, report once and give up.
    pub async fn run(self) {
        if let Err(e) = self.recipient.write_line(&self.message).await {
            debug!(client = %self.recipient.id(), error = %e, "broadcast write failed");
            (self.on_failure)(e);
        }
    }
}
