//! Notification and presentation seams.
//!
//! [`ServiceObserver`] is what the service tells the outside world;
//! [`Presenter`] is what a user-facing front end accepts. The
//! [`Mediator`](crate::mediator::Mediator) connects the two.

/// Notifications raised by the service.
///
/// All methods are called on the event consumer, in event order, and
/// default to doing nothing. Implementations must not block.
pub trait ServiceObserver: Send + Sync {
    /// A client was registered.
    fn on_new_connection(&self) {}

    /// A client was removed from the registry.
    fn on_connection_lost(&self) {}

    /// A client sent `text`.
    fn on_message_received(&self, _author: &str, _text: &str) {}

    /// Accepting or setting up a connection failed; the service keeps running.
    fn on_connection_initialization_error(&self, _message: &str) {}

    /// Closing a removed client failed; it is gone from the registry anyway.
    fn on_client_removal_error(&self, _author: &str) {}
}

/// Observer installed until a real one is registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ServiceObserver for NoopObserver {}

/// Commands a front end accepts.
pub trait Presenter: Send + Sync {
    fn set_title(&self, title: &str);

    fn print_line(&self, line: &str);

    fn enable_input(&self, enabled: bool);
}
