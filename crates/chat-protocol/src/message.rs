// crates/chat-protocol/src/message.rs

/// Separator between author and text in a rendered chat line.
pub const AUTHOR_SEPARATOR: &str = ": ";

/// Render a chat line the way it is broadcast and echoed: `"<author>: <text>"`.
///
/// Both the network broadcast and any local echo go through here so the
/// two can never drift apart.
pub fn render_chat_line(author: &str, text: &str) -> String {
    let mut line = String::with_capacity(author.len() + AUTHOR_SEPARATOR.len() + text.len());
    line.push_str(author);
    line.push_str(AUTHOR_SEPARATOR);
    line.push_str(text);
    line
}
