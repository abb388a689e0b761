//! Glue between the service and a front end.

use std::sync::Arc;

use chat_protocol::render_chat_line;
use tracing::info;

use crate::observer::{Presenter, ServiceObserver};
use crate::service::ServiceHandle;

/// Observes a service and keeps a [`Presenter`] in step with it.
pub struct Mediator {
    service: ServiceHandle,
    presenter: Arc<dyn Presenter>,
}

impl Mediator {
    /// Input stays disabled until [`Mediator::start`].
    pub fn new(service: ServiceHandle, presenter: Arc<dyn Presenter>) -> Self {
        presenter.enable_input(false);
        Mediator { service, presenter }
    }

    pub fn start(&self) {
        self.service.start_serving();
        self.refresh_title();
        self.presenter.enable_input(true);
    }

    pub fn stop(&self) {
        self.presenter.enable_input(false);
        self.service.stop_serving();
    }

    /// Broadcast operator text as is and echo it locally.
    pub fn submit(&self, text: &str) {
        if self.service.broadcast_message(text) {
            self.presenter.print_line(text);
        } else {
            info!("service stopped; operator message dropped");
        }
    }

    fn refresh_title(&self) {
        self.presenter.set_title(&self.service.describe());
    }
}

impl ServiceObserver for Mediator {
    fn on_new_connection(&self) {
        self.refresh_title();
    }

    fn on_connection_lost(&self) {
        self.refresh_title();
    }

    fn on_message_received(&self, author: &str, text: &str) {
        self.presenter.print_line(&render_chat_line(author, text));
    }

    fn on_connection_initialization_error(&self, message: &str) {
        self.refresh_title();
        self.presenter
            .print_line(&format!("Connection initialization error: {message}"));
    }

    fn on_client_removal_error(&self, author: &str) {
        self.presenter
            .print_line(&format!("Error while removing client {author}"));
    }
}
