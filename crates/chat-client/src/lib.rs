//! chat-client
//!
//! Console client for `chat-server`: one task receives lines and hands
//! them to the front end, one task drains an outbound queue.

pub mod config;
pub mod network;

pub use config::{ClientConfig, ClientError};
pub use network::{ChatConnection, NetworkEvent};
