//! chat-protocol
//!
//! Wire-level encoding/decoding for the chat server and client.
//!
//! The protocol is deliberately minimal: one message per line, no
//! length prefixes, no envelope. Bytes are ISO-8859-1 so that legacy
//! clients (and netcat) interoperate without any negotiation.
//!
//! - [`charset`]    : ISO-8859-1 <-> `String`
//! - [`line_codec`] : incremental line splitting and line encoding
//! - [`message`]    : canonical rendering of chat lines
//! - [`endpoint`]   : default port and port parsing

pub mod charset;
pub mod endpoint;
pub mod line_codec;
pub mod message;

pub use endpoint::{parse_port, InvalidPort, DEFAULT_PORT};
pub use line_codec::{encode_line, LineDecoder, LineEnding};
pub use message::render_chat_line;
