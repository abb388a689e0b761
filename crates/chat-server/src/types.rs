//! Shared types for the chat server.
//!
//! This module defines:
//! - `ClientId`: a lightweight handle for connected clients
//! - `Event`: every state transition the event queue applies

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

/// Identifier for a connected client.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A deferred state transition, applied on the event queue's consumer.
///
/// Producers (the acceptor, client readers, broadcast jobs, outside
/// callers) never touch the client registry themselves; they describe
/// what happened and the consumer decides what it means.
#[derive(Debug)]
pub enum Event {
    /// The acceptor produced a new connection.
    NewConnection { stream: TcpStream, peer: SocketAddr },

    /// Accepting or setting up a connection failed.
    InitializationError { message: String },

    /// A client sent one line.
    MessageReceived {
        client: ClientId,
        author: Arc<str>,
        text: String,
    },

    /// A client's reader ended, or a write to it failed.
    ConnectionLost { client: ClientId },

    /// Closing a removed client's transport failed.
    RemovalError { author: Arc<str> },

    /// Broadcast text verbatim to every registered client.
    Broadcast { text: String },
}
