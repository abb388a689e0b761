//! chat-server
//!
//! Multi-client TCP chat server. Every state change goes through one
//! event queue with a single consumer; connections, client readers and
//! broadcast writes run as their own tasks and only ever enqueue events.

pub mod config;
pub mod console;
pub mod error;
pub mod mediator;
pub mod observer;
pub mod service;
pub mod types;

// building blocks of the service, not part of the public surface
mod acceptor;
mod broadcast;
mod client;
mod event_queue;

pub use acceptor::UNRESOLVED_HOST;
pub use config::{Config, ConfigError};
pub use error::ServiceError;
pub use mediator::Mediator;
pub use observer::{NoopObserver, Presenter, ServiceObserver};
pub use service::{Service, ServiceHandle, ServicePhase};
